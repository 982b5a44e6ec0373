use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{ReaderError, Result};

// 子模块声明
pub mod epub_parser;
pub mod html_extractor;
pub mod long_block;
pub mod txt_parser;

/// 解析质量等级
///
/// 用于标识不同格式的解析质量和可靠性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseQuality {
    /// 原生结构（如 HTML/EPUB）- 最高质量
    Native,
    /// 纯文本，只能按空行推断段落
    Light,
}

/// 内容块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    Paragraph,
    ListItem,
    Quote,
    Preformatted,
    /// 显式换行标记，作为段落分隔符，分页前会被丢弃
    Break,
}

/// 内容块
///
/// 文档的最小排版单元，分页时不会被拆开
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub kind: BlockKind,
    pub text: String,
    /// 在整本书中的源顺序（从 0 开始）
    pub order: usize,
}

impl ContentBlock {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            order: 0,
        }
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph, text)
    }

    pub fn line_break() -> Self {
        Self::new(BlockKind::Break, "")
    }

    /// 空白块（换行标记或只有空白字符）
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// 按当前位置重新编号
pub fn renumber(blocks: &mut [ContentBlock]) {
    for (i, block) in blocks.iter_mut().enumerate() {
        block.order = i;
    }
}

/// 解析结果
///
/// 包含书名和按阅读顺序排列的内容块（尚未经过文本规范化）
#[derive(Debug, Clone)]
pub struct ExtractedBook {
    pub title: String,
    pub blocks: Vec<ContentBlock>,
    pub quality: ParseQuality,
}

/// 解析缓存的键：文件内容的 SHA-256
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Parser trait
///
/// 所有格式解析器必须实现此 trait
pub trait Parser: Send + Sync {
    /// 解析原始字节
    ///
    /// # 参数
    /// - `bytes`: 文件内容
    /// - `file_name`: 文件名（用作默认书名）
    ///
    /// # 返回
    /// 书名和内容块
    fn parse(&self, bytes: &[u8], file_name: &str) -> Result<ExtractedBook>;

    /// 获取解析质量等级
    fn get_quality(&self) -> ParseQuality;

    /// 获取支持的文件扩展名列表（空字符串表示无扩展名）
    fn supported_extensions(&self) -> Vec<&str>;
}

/// Parser 路由器
///
/// 根据文件扩展名路由到对应的解析器
pub struct ParserRouter {
    /// 扩展名到解析器的映射
    parsers: HashMap<String, Box<dyn Parser>>,
}

impl ParserRouter {
    /// 创建新的路由器实例
    ///
    /// 注册所有可用的解析器
    pub fn new() -> Self {
        let mut parsers: HashMap<String, Box<dyn Parser>> = HashMap::new();

        // 注册 EPUB 解析器
        let epub = Box::new(epub_parser::EpubParser::new());
        for ext in epub.supported_extensions() {
            parsers.insert(ext.to_string(), epub.clone());
        }

        // 注册纯文本解析器（TXT / Markdown / 无扩展名）
        let txt = Box::new(txt_parser::TxtParser::new());
        for ext in txt.supported_extensions() {
            parsers.insert(ext.to_string(), txt.clone());
        }

        Self { parsers }
    }

    /// 根据文件名路由到对应的解析器
    ///
    /// # 参数
    /// - `file_name`: 文件名或路径
    ///
    /// # 返回
    /// 对应的解析器引用，如果不支持该格式则返回 `UnsupportedFormat`
    pub fn route(&self, file_name: &str) -> Result<&dyn Parser> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        self.parsers
            .get(&ext)
            .map(|p| p.as_ref())
            .ok_or_else(|| ReaderError::UnsupportedFormat(file_name.to_string()))
    }

    /// 获取所有支持的文件扩展名
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self
            .parsers
            .keys()
            .filter(|k| !k.is_empty())
            .cloned()
            .collect();
        exts.sort();
        exts
    }

    /// 检查是否支持指定的文件扩展名
    pub fn supports(&self, extension: &str) -> bool {
        self.parsers.contains_key(&extension.to_lowercase())
    }
}

impl Default for ParserRouter {
    fn default() -> Self {
        Self::new()
    }
}
