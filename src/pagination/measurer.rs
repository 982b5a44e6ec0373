//! 溢出判定
//!
//! 分页引擎唯一依赖渲染表面的地方。真实的渲染端实现 [`Measurer`]，
//! 没有渲染端时（命令行、测试）使用 [`HeuristicMeasurer`] 按字形宽度估算。

use super::types::ViewportMetrics;
use crate::parser::ContentBlock;

/// 判断候选页是否能放进视口
pub trait Measurer {
    fn fits(&self, page: &[ContentBlock], viewport: &ViewportMetrics) -> bool;
}

impl<F> Measurer for F
where
    F: Fn(&[ContentBlock], &ViewportMetrics) -> bool,
{
    fn fits(&self, page: &[ContentBlock], viewport: &ViewportMetrics) -> bool {
        self(page, viewport)
    }
}

/// 基于字形宽度模型的高度估算
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicMeasurer {
    /// 段间距（以字号为单位）
    pub paragraph_spacing: f32,
}

impl Default for HeuristicMeasurer {
    fn default() -> Self {
        Self {
            paragraph_spacing: 1.0,
        }
    }
}

impl HeuristicMeasurer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 估算一页内容的渲染高度（px）
    pub fn estimate_height(&self, page: &[ContentBlock], viewport: &ViewportMetrics) -> f32 {
        if page.is_empty() {
            return 0.0;
        }

        let width = viewport.content_width();
        let lines: usize = page
            .iter()
            .map(|block| block_lines(&block.text, width, viewport.font_size))
            .sum();
        let gaps = (page.len() - 1) as f32 * viewport.font_size * self.paragraph_spacing;

        lines as f32 * viewport.line_px() + gaps
    }
}

impl Measurer for HeuristicMeasurer {
    fn fits(&self, page: &[ContentBlock], viewport: &ViewportMetrics) -> bool {
        self.estimate_height(page, viewport) <= viewport.content_height()
    }
}

/// 一个块折行后的行数（至少一行）
fn block_lines(text: &str, width: f32, font_size: f32) -> usize {
    text.split('\n')
        .map(|line| wrapped_lines(line, width, font_size))
        .sum::<usize>()
        .max(1)
}

/// 按单词贪心折行
fn wrapped_lines(line: &str, width: f32, font_size: f32) -> usize {
    let space = glyph_em_width(' ') * font_size;
    let mut lines = 1;
    let mut used = 0.0f32;

    for word in line.split_whitespace() {
        let word_px = text_em_width(word) * font_size;

        if word_px > width {
            // 超宽单词独占若干行
            if used > 0.0 {
                lines += 1;
            }
            let extra = (word_px / width).ceil() as usize;
            lines += extra.saturating_sub(1);
            used = word_px - (extra.saturating_sub(1)) as f32 * width;
            continue;
        }

        let needed = if used > 0.0 { space + word_px } else { word_px };
        if used + needed > width {
            lines += 1;
            used = word_px;
        } else {
            used += needed;
        }
    }

    lines
}

fn text_em_width(text: &str) -> f32 {
    text.chars().map(glyph_em_width).sum()
}

/// 比例字体下单个字形的宽度（em）
fn glyph_em_width(ch: char) -> f32 {
    match ch {
        ' ' | '\u{00A0}' => 0.32,
        '\t' => 1.28,
        'i' | 'l' | 'I' | '|' | '!' => 0.24,
        '.' | ',' | ':' | ';' | '\'' | '"' | '`' => 0.23,
        '-' | '\u{2010}'..='\u{2014}' => 0.34,
        '(' | ')' | '[' | ']' | '{' | '}' => 0.30,
        'f' | 't' | 'j' | 'r' => 0.34,
        'm' | 'w' | 'M' | 'W' | '@' | '%' | '&' | '#' => 0.74,
        c if c.is_ascii_digit() => 0.52,
        c if c.is_ascii_uppercase() => 0.64,
        c if c.is_ascii_lowercase() => 0.52,
        c if c.is_whitespace() => 0.32,
        c if c.is_ascii_punctuation() => 0.42,
        // CJK 等全角字符
        c if c as u32 >= 0x2E80 => 1.0,
        _ => 0.56,
    }
}
