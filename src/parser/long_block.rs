//! 超长块拆分
//!
//! 超过 [`LONG_BLOCK_THRESHOLD`] 个字符的块按句子拆成不超过
//! [`MAX_CHUNK_CHARS`] 的片段，句子本身永远不会被截断。

use crate::normalizer::paragraphs::collapse_whitespace;

/// 触发拆分的长度（按空白折叠后的字符数）
pub const LONG_BLOCK_THRESHOLD: usize = 800;

/// 单个片段的目标上限
pub const MAX_CHUNK_CHARS: usize = 500;

/// 是否需要拆分
pub fn is_long_block(text: &str) -> bool {
    collapse_whitespace(text).chars().count() > LONG_BLOCK_THRESHOLD
}

/// 按句末标点分句
///
/// 分句点是句末标点（`.` `!` `?`，后面可跟一个右引号）之后的空白。
/// 返回去掉首尾空白后的非空句子。
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_whitespace() && ends_sentence(&chars[..i]) {
            let mut end = i;
            while end < chars.len() && chars[end].is_whitespace() {
                end += 1;
            }
            push_trimmed(&mut sentences, &chars[start..i]);
            start = end;
            i = end;
            continue;
        }
        i += 1;
    }
    push_trimmed(&mut sentences, &chars[start..]);

    sentences
}

fn ends_sentence(before: &[char]) -> bool {
    match before {
        [.., p] if is_terminal(*p) => true,
        [.., p, q] if is_closing_quote(*q) && is_terminal(*p) => true,
        _ => false,
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closing_quote(c: char) -> bool {
    matches!(c, '"' | '\u{201D}' | '\'')
}

fn push_trimmed(out: &mut Vec<String>, chars: &[char]) {
    let s: String = chars.iter().collect();
    let s = s.trim();
    if !s.is_empty() {
        out.push(s.to_string());
    }
}

/// 拆分超长块
///
/// 不足两句时原样返回；否则贪心累积句子，
/// 加入下一句会超过 [`MAX_CHUNK_CHARS`] 时开始新片段。
///
/// # 参数
/// - `block`: 块文本
///
/// # 返回
/// 片段列表（至少一个）
pub fn split_long_block(block: &str) -> Vec<String> {
    let sentences = split_sentences(block);
    if sentences.len() < 2 {
        return vec![block.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences {
        let sentence_len = sentence.chars().count();
        if !current.is_empty() && current_len + 1 + sentence_len > MAX_CHUNK_CHARS {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if current.is_empty() {
            current = sentence;
            current_len = sentence_len;
        } else {
            current.push(' ');
            current.push_str(&sentence);
            current_len += 1 + sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sentence(words: usize, tag: usize) -> String {
        let body = (0..words)
            .map(|w| format!("word{}", (w + tag) % 7))
            .collect::<Vec<_>>()
            .join(" ");
        format!("Sentence {} {}.", tag, body)
    }

    #[test]
    fn test_split_sentences_basic() {
        let parts = split_sentences("One. Two!  Three? Four");
        assert_eq!(parts, vec!["One.", "Two!", "Three?", "Four"]);
    }

    #[test]
    fn test_split_sentences_closing_quote() {
        let parts = split_sentences("He said \"Stop.\" Then he left. 'Go!' She ran.");
        assert_eq!(
            parts,
            vec!["He said \"Stop.\"", "Then he left.", "'Go!'", "She ran."]
        );
    }

    #[test]
    fn test_abbreviation_without_space_not_split() {
        assert_eq!(split_sentences("3.14 is pi"), vec!["3.14 is pi"]);
    }

    #[test]
    fn test_single_sentence_kept_intact() {
        let block = "word ".repeat(300);
        assert_eq!(split_long_block(&block), vec![block.clone()]);
    }

    #[test]
    fn test_chunks_respect_limit() {
        let block = (0..20).map(|i| sentence(12, i)).collect::<Vec<_>>().join(" ");
        assert!(is_long_block(&block));

        let chunks = split_long_block(&block);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert!(chunk.chars().count() <= MAX_CHUNK_CHARS);
        }
        assert_eq!(chunks.join(" "), block);
    }

    #[test]
    fn test_oversized_sentence_preserved_whole() {
        let giant = format!("{}.", "a".repeat(620));
        let block = format!("Short start. {} Short end.", giant);
        let chunks = split_long_block(&block);

        assert_eq!(chunks, vec!["Short start.".to_string(), giant, "Short end.".to_string()]);
    }

    #[test]
    fn test_short_block_is_not_long() {
        assert!(!is_long_block("A short paragraph."));
        assert!(is_long_block(&"x ".repeat(401)));
    }

    proptest! {
        #[test]
        fn prop_chunks_never_exceed_limit(count in 2usize..40, words in 1usize..60) {
            let block = (0..count).map(|i| sentence(words, i)).collect::<Vec<_>>().join(" ");
            let chunks = split_long_block(&block);
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= MAX_CHUNK_CHARS);
                prop_assert!(!chunk.trim().is_empty());
            }
            prop_assert_eq!(chunks.join(" "), block);
        }
    }
}
