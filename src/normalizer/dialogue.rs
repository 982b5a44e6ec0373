//! 对话拆分
//!
//! 把连续多句对白挤在一起的长段落拆成每句对白一段

/// 触发拆分的最少引号数
pub const MIN_QUOTE_MARKS: usize = 2;
/// 触发拆分的最短段落长度（字符）
pub const MIN_DIALOGUE_CHARS: usize = 120;
/// 拆分后每段的最短长度，低于此值放弃拆分
pub const MIN_SEGMENT_CHARS: usize = 20;

/// 拆分对话段落
///
/// 拆分点：右引号之后的空白，且空白后是大写字母或新的引号。
/// 引号不足、段落过短、拆不出两段、或任一段过短时返回原段落。
///
/// # 返回
/// 去掉首尾空白的段落列表，空输入返回空列表
pub fn split_dialogue(paragraph: &str) -> Vec<String> {
    let trimmed = paragraph.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let quote_marks = trimmed.chars().filter(|c| matches!(c, '"' | '\u{201C}')).count();
    if quote_marks < MIN_QUOTE_MARKS || trimmed.chars().count() < MIN_DIALOGUE_CHARS {
        return vec![trimmed.to_string()];
    }

    let parts = split_after_closing_quotes(trimmed);
    if parts.len() < 2 || parts.iter().any(|p| p.chars().count() < MIN_SEGMENT_CHARS) {
        return vec![trimmed.to_string()];
    }

    parts
}

fn split_after_closing_quotes(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 1;

    while i < chars.len() {
        if chars[i].is_whitespace() && matches!(chars[i - 1], '"' | '\u{201D}') {
            let mut end = i;
            while end < chars.len() && chars[end].is_whitespace() {
                end += 1;
            }
            if chars.get(end).map_or(false, |c| opens_next_line(*c)) {
                push_part(&mut parts, &chars[start..i]);
                start = end;
            }
            i = end;
            continue;
        }
        i += 1;
    }
    push_part(&mut parts, &chars[start..]);

    parts
}

fn opens_next_line(c: char) -> bool {
    c.is_ascii_uppercase() || matches!(c, '\u{201C}' | '"' | '\'')
}

fn push_part(parts: &mut Vec<String>, chars: &[char]) {
    let part: String = chars.iter().collect();
    let part = part.trim();
    if !part.is_empty() {
        parts.push(part.to_string());
    }
}
