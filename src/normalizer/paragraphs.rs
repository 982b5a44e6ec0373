//! 段落切分与空白处理

use once_cell::sync::Lazy;
use regex::Regex;

static RE_BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// 按空行切分段落
///
/// 每段去掉首尾空白，丢弃空段；段内的单个换行保留
pub fn split_paragraphs(text: &str) -> Vec<String> {
    RE_BLANK_LINE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// 段落补齐：重新切分后用一个空行连接
pub fn pad_paragraphs(text: &str) -> String {
    split_paragraphs(text).join("\n\n")
}

/// 把连续空白折叠为一个空格并去掉首尾空白
pub fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// 搜索用的规范形式：小写 + 空白折叠
pub fn normalize_text(text: &str) -> String {
    collapse_whitespace(&text.to_lowercase())
}
