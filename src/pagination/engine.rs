use tracing::debug;

use super::measurer::Measurer;
use super::types::{Page, PaginationResult, ViewportMetrics};
use crate::parser::ContentBlock;

/// 分页
///
/// 贪心填充加一步溢出回退：逐块追加到当前页并询问 `measurer`，
/// 如果追加前页内已有内容而追加后溢出，就把这个块移到新的一页。
/// 块永远不会被拆开，单独一块就溢出时独占一页。
///
/// # 参数
/// - `blocks`: 规范化后的内容块
/// - `viewport`: 视口参数
/// - `measurer`: 溢出判定
/// - `target_page`: 分页后要停留的页码（会被钳制到 `[1, total]`）
///
/// # 返回
/// 分页结果，空输入得到一个占位页
pub fn paginate<M>(
    blocks: &[ContentBlock],
    viewport: &ViewportMetrics,
    measurer: &M,
    target_page: usize,
) -> PaginationResult
where
    M: Measurer + ?Sized,
{
    let mut pages: Vec<Vec<ContentBlock>> = Vec::new();
    let mut current: Vec<ContentBlock> = Vec::new();

    for block in blocks {
        current.push(block.clone());

        if current.len() > 1 && !measurer.fits(&current, viewport) {
            // 回退：把刚追加的块移到新页
            if let Some(overflow) = current.pop() {
                pages.push(std::mem::take(&mut current));
                current.push(overflow);
            }
        }
    }

    if !current.is_empty() {
        pages.push(current);
    }

    let pages: Vec<Page> = if pages.is_empty() {
        vec![Page::placeholder()]
    } else {
        pages
            .into_iter()
            .enumerate()
            .map(|(i, blocks)| Page::new(i + 1, blocks))
            .collect()
    };

    let total = pages.len();
    let current = target_page.clamp(1, total);
    debug!(blocks = blocks.len(), total, current, "分页完成");

    PaginationResult {
        pages,
        total,
        current,
    }
}
