//! 引号规范化
//!
//! 把用作对白引号的单引号 `'` 换成双引号 `"`，缩写（don't, it's）不受影响。
//! 两条规则依次执行：
//! 1. 开引号：位于文本开头、空白、左括号或连字符之后，且紧跟大写字母或数字
//! 2. 闭引号：紧跟在字母、数字或句末标点之后，且后面不是单词字符

/// 规范化单引号，结果是幂等的
pub fn normalize_quotes(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();

    // 1. 开引号
    for i in 0..chars.len() {
        if chars[i] != '\'' {
            continue;
        }
        let opens = i == 0 || is_opening_context(chars[i - 1]);
        let before_word = chars
            .get(i + 1)
            .map_or(false, |c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if opens && before_word {
            chars[i] = '"';
        }
    }

    // 2. 闭引号
    for i in 1..chars.len() {
        if chars[i] != '\'' {
            continue;
        }
        let closes = is_closing_context(chars[i - 1]);
        let before_word = chars.get(i + 1).map_or(false, |c| is_word_char(*c));
        if closes && !before_word {
            chars[i] = '"';
        }
    }

    chars.into_iter().collect()
}

fn is_opening_context(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | '[' | '{' | '-')
}

fn is_closing_context(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '!' | '?')
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
