use super::*;
use crate::normalizer::paragraphs::split_paragraphs;
use encoding_rs::*;
use tracing::warn;

/// 纯文本解析器
///
/// 支持 TXT / Markdown 文件，Markdown 按纯文本处理，
/// 自动检测编码（UTF-8, GBK 等）
#[derive(Clone)]
pub struct TxtParser;

impl TxtParser {
    /// 创建新的纯文本解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 把文本按空行分割为段落块
    ///
    /// 段落内部的单个换行保留
    pub fn blocks_from_text(&self, content: &str) -> Vec<ContentBlock> {
        let mut blocks: Vec<ContentBlock> = split_paragraphs(content)
            .into_iter()
            .map(ContentBlock::paragraph)
            .collect();
        renumber(&mut blocks);
        blocks
    }
}

/// 检测字节序列的编码
///
/// 检查顺序：BOM、UTF-8、GBK 特征，都不满足时按 UTF-8 处理
pub(crate) fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    // 1. 检查 BOM (Byte Order Mark)
    if let Some((encoding, _bom_length)) = Encoding::for_bom(bytes) {
        return encoding;
    }

    // 2. 尝试 UTF-8 解码
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }

    // 3. 检测是否为 GBK
    if looks_like_gbk(bytes) {
        return GBK;
    }

    UTF_8
}

/// 检测字节序列是否像 GBK 编码
///
/// GBK 编码特征：
/// - 第一字节范围：0x81-0xFE
/// - 第二字节范围：0x40-0xFE
fn looks_like_gbk(bytes: &[u8]) -> bool {
    let mut gbk_pairs = 0;
    let mut total_pairs = 0;

    let mut i = 0;
    while i < bytes.len().saturating_sub(1) {
        let b1 = bytes[i];
        let b2 = bytes[i + 1];

        if b1 < 0x80 {
            i += 1;
            continue;
        }

        total_pairs += 1;

        if (0x81..=0xFE).contains(&b1) && (0x40..=0xFE).contains(&b2) {
            gbk_pairs += 1;
            i += 2;
        } else {
            i += 1;
        }
    }

    // 超过 50% 的非 ASCII 字节对符合 GBK 规则，则认为是 GBK
    total_pairs > 0 && (gbk_pairs as f32 / total_pairs as f32) > 0.5
}

/// 检测编码并解码为字符串（去掉 BOM）
pub(crate) fn decode_text(bytes: &[u8], source: &str) -> String {
    let encoding = detect_encoding(bytes);
    let (content, _encoding_used, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(source, encoding = encoding.name(), "解码时出现错误，可能存在乱码");
    }
    content.into_owned()
}

/// 取路径中的文件名部分
pub(crate) fn display_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string()
}

impl Parser for TxtParser {
    fn parse(&self, bytes: &[u8], file_name: &str) -> Result<ExtractedBook> {
        let content = decode_text(bytes, file_name);
        let blocks = self.blocks_from_text(&content);

        Ok(ExtractedBook {
            title: display_name(file_name),
            blocks,
            quality: ParseQuality::Light,
        })
    }

    fn get_quality(&self) -> ParseQuality {
        ParseQuality::Light
    }

    fn supported_extensions(&self) -> Vec<&str> {
        vec!["txt", "md", "markdown", ""]
    }
}

impl Default for TxtParser {
    fn default() -> Self {
        Self::new()
    }
}
