use serde::{Deserialize, Serialize};

use crate::normalizer::normalize_text;
use crate::parser::{BlockKind, ContentBlock};

/// 没有任何内容时占位页显示的文字
pub const PLACEHOLDER_TEXT: &str = "暂无可显示的内容";

/// 视口排版参数
///
/// 任何一项变化都会触发整本书重新分页
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportMetrics {
    pub width: f32,
    pub height: f32,
    /// 字号（px）
    pub font_size: f32,
    /// 行高倍数
    pub line_height: f32,
    /// 四周内边距（px）
    pub padding: f32,
    /// 栏间距（px）
    pub column_gap: f32,
}

impl Default for ViewportMetrics {
    fn default() -> Self {
        Self {
            width: 640.0,
            height: 860.0,
            font_size: 18.0,
            line_height: 1.6,
            padding: 24.0,
            column_gap: 0.0,
        }
    }
}

impl ViewportMetrics {
    /// 可用于排版的宽度
    pub fn content_width(&self) -> f32 {
        (self.width - 2.0 * self.padding - self.column_gap).max(1.0)
    }

    /// 可用于排版的高度
    pub fn content_height(&self) -> f32 {
        (self.height - 2.0 * self.padding).max(0.0)
    }

    /// 单行高度（px）
    pub fn line_px(&self) -> f32 {
        self.font_size * self.line_height
    }
}

/// 一页
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// 页码，从 1 开始
    pub index: usize,
    pub blocks: Vec<ContentBlock>,
    /// 各块文本用空行连接
    pub text: String,
    /// 小写、折叠空白后的 `text`，仅用于搜索
    pub normalized_text: String,
    /// 空文档的占位页
    #[serde(default)]
    pub is_placeholder: bool,
}

impl Page {
    pub fn new(index: usize, blocks: Vec<ContentBlock>) -> Self {
        let text = blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let normalized_text = normalize_text(&text);

        Self {
            index,
            blocks,
            text,
            normalized_text,
            is_placeholder: false,
        }
    }

    /// 占位页：没有内容块，文本为空
    pub fn placeholder() -> Self {
        Self {
            is_placeholder: true,
            ..Self::new(1, Vec::new())
        }
    }

    /// 页内第一个段落的文本
    pub fn first_paragraph(&self) -> Option<&str> {
        self.blocks
            .iter()
            .map(|b| b.text.as_str())
            .find(|t| !t.trim().is_empty())
    }

    /// 渲染为 HTML 片段
    ///
    /// 预格式块输出 `<pre>`，其余块输出 `<p>`，文本全部转义
    pub fn to_html(&self) -> String {
        if self.is_placeholder {
            return format!(
                "<p class=\"placeholder\">{}</p>",
                html_escape::encode_text(PLACEHOLDER_TEXT)
            );
        }

        self.blocks
            .iter()
            .map(|block| {
                let text = html_escape::encode_text(&block.text);
                match block.kind {
                    BlockKind::Preformatted => format!("<pre>{}</pre>", text),
                    _ => format!("<p>{}</p>", text),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult {
    pub pages: Vec<Page>,
    /// 总页数，恒等于 `pages.len()`
    pub total: usize,
    /// 当前页（已钳制到 `[1, total]`）
    pub current: usize,
}

impl PaginationResult {
    /// 按页码取页
    pub fn page(&self, index: usize) -> Option<&Page> {
        index.checked_sub(1).and_then(|i| self.pages.get(i))
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.page(self.current)
    }

    /// 把页码钳制到 `[1, total]`
    pub fn clamp_page(&self, index: usize) -> usize {
        index.clamp(1, self.total.max(1))
    }

    /// 只有一个占位页
    pub fn is_placeholder(&self) -> bool {
        self.pages.len() == 1 && self.pages[0].is_placeholder
    }

    /// 按顺序拼接所有页的内容块
    pub fn blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        self.pages.iter().flat_map(|p| p.blocks.iter())
    }
}
