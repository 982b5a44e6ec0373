//! 文本规范化
//!
//! 在分页之前对内容块做引号规范化、对话拆分和段落补齐，
//! 结果只依赖输入块和 [`ReaderSettings`]，重复执行结果不变。

pub mod dialogue;
pub mod paragraphs;
pub mod quotes;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ReaderSettings;
use crate::parser::{renumber, BlockKind, ContentBlock};

pub use dialogue::split_dialogue;
pub use paragraphs::{collapse_whitespace, normalize_text, pad_paragraphs, split_paragraphs};
pub use quotes::normalize_quotes;

/// 规范化后的文档
///
/// 已去掉空白块，`order` 重新从 0 编号
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub blocks: Vec<ContentBlock>,
}

impl NormalizedDocument {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// 文本规范化器
#[derive(Debug, Clone, Copy, Default)]
pub struct TextNormalizer {
    settings: ReaderSettings,
}

impl TextNormalizer {
    pub fn new(settings: ReaderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> ReaderSettings {
        self.settings
    }

    /// 规范化整组内容块
    ///
    /// 处理顺序（逐段）：
    /// 1. 按空行切成段落
    /// 2. 引号规范化（`quote_normalize` 开启时，预格式块除外）
    /// 3. 对话拆分（`dialogue_mode` 开启时，仅普通段落）
    /// 4. 段落补齐，丢弃空段
    ///
    /// 拆出来的段落沿用原块的类型
    pub fn normalize(&self, blocks: &[ContentBlock]) -> NormalizedDocument {
        let mut out = Vec::with_capacity(blocks.len());

        for block in blocks.iter().filter(|b| !b.is_blank()) {
            for paragraph in split_paragraphs(&block.text) {
                let paragraph = if self.settings.quote_normalize
                    && block.kind != BlockKind::Preformatted
                {
                    normalize_quotes(&paragraph)
                } else {
                    paragraph
                };

                let segments = if self.settings.dialogue_mode && block.kind == BlockKind::Paragraph
                {
                    split_dialogue(&paragraph)
                } else {
                    vec![paragraph]
                };

                let padded = pad_paragraphs(&segments.join("\n\n"));
                out.extend(
                    padded
                        .split("\n\n")
                        .filter(|p| !p.is_empty())
                        .map(|text| ContentBlock::new(block.kind, text)),
                );
            }
        }

        renumber(&mut out);
        debug!(input = blocks.len(), output = out.len(), "文本规范化完成");

        NormalizedDocument { blocks: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DIALOGUE: &str = "'Where have you been all night, you foolish boy?' \
'Down at the harbour, watching the ships come in.' \
'You should have told somebody before you left.'";

    fn texts(doc: &NormalizedDocument) -> Vec<&str> {
        doc.blocks.iter().map(|b| b.text.as_str()).collect()
    }

    #[test]
    fn test_quotes_then_dialogue() {
        let normalizer = TextNormalizer::new(ReaderSettings::default());
        let doc = normalizer.normalize(&[ContentBlock::paragraph(DIALOGUE)]);

        assert_eq!(doc.len(), 3);
        assert!(doc.blocks.iter().all(|b| b.text.starts_with('"') && b.text.ends_with('"')));
        assert_eq!(
            doc.blocks.iter().map(|b| b.order).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_dialogue_requires_double_quotes() {
        let settings = ReaderSettings {
            dialogue_mode: true,
            quote_normalize: false,
        };
        let doc = TextNormalizer::new(settings).normalize(&[ContentBlock::paragraph(DIALOGUE)]);
        assert_eq!(texts(&doc), vec![DIALOGUE]);
    }

    #[test]
    fn test_both_passes_disabled() {
        let settings = ReaderSettings {
            dialogue_mode: false,
            quote_normalize: false,
        };
        let doc = TextNormalizer::new(settings).normalize(&[ContentBlock::paragraph("'Hi there.'")]);
        assert_eq!(texts(&doc), vec!["'Hi there.'"]);
    }

    #[test]
    fn test_blank_blocks_dropped() {
        let blocks = vec![
            ContentBlock::paragraph("One."),
            ContentBlock::line_break(),
            ContentBlock::paragraph("   "),
            ContentBlock::paragraph("Two.\n\n\nThree."),
        ];
        let doc = TextNormalizer::default().normalize(&blocks);
        assert_eq!(texts(&doc), vec!["One.", "Two.", "Three."]);
    }

    #[test]
    fn test_kind_preserved_and_preformatted_untouched() {
        let blocks = vec![
            ContentBlock::new(BlockKind::Preformatted, "let s = 'A';\nprint(s)"),
            ContentBlock::new(BlockKind::Quote, "_He said, 'Never again.' And left._"),
        ];
        let doc = TextNormalizer::default().normalize(&blocks);
        assert_eq!(doc.blocks[0].kind, BlockKind::Preformatted);
        assert_eq!(doc.blocks[0].text, "let s = 'A';\nprint(s)");
        assert_eq!(doc.blocks[1].kind, BlockKind::Quote);
        assert_eq!(doc.blocks[1].text, "_He said, \"Never again.\" And left._");
    }

    #[test]
    fn test_empty_document() {
        let doc = TextNormalizer::default().normalize(&[]);
        assert!(doc.is_empty());
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(
            paragraphs in prop::collection::vec("[A-Za-z '\".!?,]{0,80}", 0..6),
            dialogue_mode in any::<bool>(),
            quote_normalize in any::<bool>(),
        ) {
            let settings = ReaderSettings { dialogue_mode, quote_normalize };
            let normalizer = TextNormalizer::new(settings);
            let blocks: Vec<ContentBlock> = paragraphs.into_iter().map(ContentBlock::paragraph).collect();

            let once = normalizer.normalize(&blocks);
            let twice = normalizer.normalize(&once.blocks);
            prop_assert_eq!(once, twice);
        }
    }
}
