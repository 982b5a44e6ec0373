//! 书签定位
//!
//! 把一段选中文本锚定到页码，重新分页后仍能找回

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ReaderError, Result};
use crate::normalizer::normalize_text;
use crate::pagination::PaginationResult;

/// 书签片段最多保留的单词数
pub const SNIPPET_WORDS: usize = 50;

/// 书签锚点
///
/// 每次用户操作生成一次，之后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkAnchor {
    pub snippet: String,
    pub normalized_snippet: String,
    /// 创建时所在的页码
    pub page: usize,
    pub created_at: DateTime<Utc>,
}

/// 截取书签片段：前 50 个单词，不足时取去掉首尾空白的原文
pub fn make_snippet(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > SNIPPET_WORDS {
        words[..SNIPPET_WORDS].join(" ")
    } else {
        text.trim().to_string()
    }
}

/// 查找第一个包含 `needle`（已规范化）的页
///
/// 空字符串永远找不到
pub fn find_page_for_normalized_substring(result: &PaginationResult, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    result
        .pages
        .iter()
        .find(|p| p.normalized_text.contains(needle))
        .map(|p| p.index)
}

/// 为选中文本创建锚点
///
/// 先用选中文本本身定位；如果定位到的不是当前页（例如选中内容在别处也出现过），
/// 改用当前页第一个段落再试一次。
///
/// # 参数
/// - `result`: 当前分页
/// - `selection`: 选中文本
/// - `viewed_page`: 用户正在看的页
///
/// # 返回
/// 指向 `viewed_page` 的锚点
pub fn create_anchor(
    result: &PaginationResult,
    selection: &str,
    viewed_page: usize,
) -> Result<BookmarkAnchor> {
    if selection.trim().is_empty() {
        return Err(ReaderError::EmptySelection);
    }

    let page = result
        .page(viewed_page)
        .ok_or(ReaderError::AnchorResolution { page: viewed_page })?;

    let attempt = |text: &str| {
        let snippet = make_snippet(text);
        let normalized = normalize_text(&snippet);
        let found = find_page_for_normalized_substring(result, &normalized);
        (snippet, normalized, found)
    };

    let (mut snippet, mut normalized, found) = attempt(selection);

    if found != Some(viewed_page) {
        debug!(?found, viewed_page, "选中文本未定位到当前页，改用首段");
        let fallback = page
            .first_paragraph()
            .map(attempt)
            .filter(|(_, _, found)| *found == Some(viewed_page));

        match fallback {
            Some((s, n, _)) => {
                snippet = s;
                normalized = n;
            }
            None => return Err(ReaderError::AnchorResolution { page: viewed_page }),
        }
    }

    Ok(BookmarkAnchor {
        snippet,
        normalized_snippet: normalized,
        page: viewed_page,
        created_at: Utc::now(),
    })
}

/// 在当前分页中找回锚点所在的页
///
/// 先查记录的页码，找不到再按页序扫描全部页
pub fn resolve_anchor(result: &PaginationResult, anchor: &BookmarkAnchor) -> Result<usize> {
    let needle = normalize_text(&anchor.snippet);
    if needle.is_empty() {
        return Err(ReaderError::SnippetNotFound);
    }

    if let Some(page) = result.page(anchor.page) {
        if page.normalized_text.contains(&needle) {
            return Ok(page.index);
        }
    }

    match find_page_for_normalized_substring(result, &needle) {
        Some(page) => {
            info!(recorded = anchor.page, page, "书签位置已变化");
            Ok(page)
        }
        None => Err(ReaderError::SnippetNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{paginate, ViewportMetrics};
    use crate::parser::ContentBlock;

    /// 每页一个块
    fn one_block_per_page(texts: &[&str]) -> PaginationResult {
        let blocks: Vec<ContentBlock> = texts.iter().map(|t| ContentBlock::paragraph(*t)).collect();
        let single = |page: &[ContentBlock], _: &ViewportMetrics| page.len() <= 1;
        paginate(&blocks, &ViewportMetrics::default(), &single, 1)
    }

    fn storm_book() -> PaginationResult {
        one_block_per_page(&[
            "Chapter one begins.",
            "The house stood alone.",
            "It was a dark and stormy night; the rain fell in torrents.",
            "Morning came slowly.",
            "The end.",
        ])
    }

    #[test]
    fn test_make_snippet() {
        assert_eq!(make_snippet("  short text  "), "short text");
        let long = (0..60).map(|i| format!("w{}", i)).collect::<Vec<_>>().join("  ");
        let snippet = make_snippet(&long);
        assert_eq!(snippet.split(' ').count(), 50);
        assert!(snippet.starts_with("w0 w1"));
        assert!(snippet.ends_with("w49"));
    }

    #[test]
    fn test_empty_snippet_finds_nothing() {
        let result = storm_book();
        assert_eq!(find_page_for_normalized_substring(&result, ""), None);
    }

    #[test]
    fn test_find_page() {
        let result = storm_book();
        assert_eq!(find_page_for_normalized_substring(&result, "morning came"), Some(4));
        assert_eq!(find_page_for_normalized_substring(&result, "nowhere"), None);
    }

    #[test]
    fn test_bookmark_round_trip() {
        let result = storm_book();
        assert_eq!(result.total, 5);

        let anchor = create_anchor(&result, "It was a dark and stormy night", 3).unwrap();
        assert_eq!(anchor.page, 3);
        assert_eq!(anchor.normalized_snippet, "it was a dark and stormy night");

        // 翻到别处后再回来
        assert_eq!(resolve_anchor(&result, &anchor).unwrap(), 3);
    }

    #[test]
    fn test_resolve_after_repagination() {
        let result = storm_book();
        let anchor = create_anchor(&result, "dark and  STORMY", 3).unwrap();

        // 重新分页：每页两块
        let blocks: Vec<ContentBlock> = result.blocks().cloned().collect();
        let two = |page: &[ContentBlock], _: &ViewportMetrics| page.len() <= 2;
        let reflowed = paginate(&blocks, &ViewportMetrics::default(), &two, 1);

        assert_eq!(reflowed.total, 3);
        assert_eq!(resolve_anchor(&reflowed, &anchor).unwrap(), 2);
    }

    #[test]
    fn test_fallback_to_first_paragraph() {
        let result = one_block_per_page(&["Repeated phrase here.", "Repeated phrase here. Again."]);

        // 选中文本最早出现在第 1 页，改用第 2 页首段
        let anchor = create_anchor(&result, "Repeated phrase", 2).unwrap();
        assert_eq!(anchor.page, 2);
        assert_eq!(anchor.snippet, "Repeated phrase here. Again.");
    }

    #[test]
    fn test_anchor_resolution_error() {
        let result = one_block_per_page(&["Same text.", "Same text."]);
        let err = create_anchor(&result, "Same text.", 2).unwrap_err();
        assert!(matches!(err, ReaderError::AnchorResolution { page: 2 }));
    }

    #[test]
    fn test_empty_selection() {
        let result = storm_book();
        assert!(matches!(
            create_anchor(&result, "  \n", 1),
            Err(ReaderError::EmptySelection)
        ));
    }

    #[test]
    fn test_viewed_page_out_of_range() {
        let result = storm_book();
        assert!(matches!(
            create_anchor(&result, "The end.", 9),
            Err(ReaderError::AnchorResolution { page: 9 })
        ));
    }

    #[test]
    fn test_snippet_not_found() {
        let result = storm_book();
        let anchor = BookmarkAnchor {
            snippet: "a sentence from another book".to_string(),
            normalized_snippet: "a sentence from another book".to_string(),
            page: 2,
            created_at: Utc::now(),
        };
        assert!(matches!(
            resolve_anchor(&result, &anchor),
            Err(ReaderError::SnippetNotFound)
        ));
    }

    #[test]
    fn test_anchor_serialization() {
        let anchor = BookmarkAnchor {
            snippet: "Snippet".to_string(),
            normalized_snippet: "snippet".to_string(),
            page: 4,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&anchor).unwrap();
        assert_eq!(json["normalizedSnippet"], "snippet");
        assert!(json.get("createdAt").is_some());

        let back: BookmarkAnchor = serde_json::from_value(json).unwrap();
        assert_eq!(back, anchor);
    }
}
