//! HTML 内容块提取
//!
//! 对文档树做一次深度优先遍历，只在"叶子"块级元素（没有块级后代）处产出内容块，
//! 容器和它内部的块不会被重复计入。

use scraper::{ElementRef, Html, Selector};

use super::long_block::{is_long_block, split_long_block};
use super::{renumber, BlockKind, ContentBlock};
use crate::normalizer::paragraphs::collapse_whitespace;

/// 块级标签
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "aside", "main", "nav", "h1", "h2",
    "h3", "h4", "h5", "h6", "blockquote", "ul", "ol", "li", "pre", "br",
];

/// 内容完全忽略的标签
const SKIPPED_TAGS: &[&str] = &["script", "style", "head", "title", "noscript", "template"];

fn is_block(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

fn is_skipped(tag: &str) -> bool {
    SKIPPED_TAGS.contains(&tag)
}

/// 从 HTML/XHTML 文档中提取内容块
///
/// - `<br>` 产出空的换行块
/// - `<blockquote>` 整体作为一个引用块，文本包在 `_…_` 中
/// - `<ul>` / `<ol>` 每个直接子 `<li>` 一个列表项块，前缀 `•` 或 `N.`
/// - `<pre>` 保留行结构：逐行去空白、丢弃空行、用 `\n` 连接
/// - 块级元素之间的散落文本合并成匿名段落
/// - 超长块交给 [`split_long_block`]
///
/// # 返回
/// 按源顺序排列的内容块，`order` 从 0 开始
pub fn extract_blocks(html: &str) -> Vec<ContentBlock> {
    let document = Html::parse_document(html);
    let mut blocks = Vec::new();

    let body_selector = Selector::parse("body").unwrap();
    let root = document
        .select(&body_selector)
        .next()
        .unwrap_or_else(|| document.root_element());

    visit_container(root, &mut blocks);

    renumber(&mut blocks);
    blocks
}

/// 遍历容器的子节点
fn visit_container(element: ElementRef, blocks: &mut Vec<ContentBlock>) {
    let mut loose = String::new();

    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            loose.push_str(text);
            continue;
        }

        let Some(child_element) = ElementRef::wrap(child) else {
            continue;
        };
        let tag = child_element.value().name();

        if is_skipped(tag) {
            continue;
        }

        if is_block(tag) {
            push_block(blocks, BlockKind::Paragraph, &collapse_whitespace(&loose));
            loose.clear();
            visit_block(child_element, blocks);
        } else if has_block_descendant(child_element) {
            // 行内元素里包着块级元素（如 <span><p>…</p></span>），按容器处理
            push_block(blocks, BlockKind::Paragraph, &collapse_whitespace(&loose));
            loose.clear();
            visit_container(child_element, blocks);
        } else {
            loose.push_str(&flatten_text(child_element));
        }
    }

    push_block(blocks, BlockKind::Paragraph, &collapse_whitespace(&loose));
}

/// 处理一个块级元素
fn visit_block(element: ElementRef, blocks: &mut Vec<ContentBlock>) {
    match element.value().name() {
        "br" => blocks.push(ContentBlock::line_break()),
        "blockquote" => {
            let text = collapse_whitespace(&flatten_text(element));
            if !text.is_empty() {
                push_block(blocks, BlockKind::Quote, &format!("_{}_", text));
            }
        }
        tag @ ("ul" | "ol") => visit_list(element, tag == "ol", blocks),
        "li" => push_list_item(blocks, "•", element),
        "pre" => {
            let text = flatten_text(element);
            let lines: Vec<&str> = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            if !lines.is_empty() {
                push_block(blocks, BlockKind::Preformatted, &lines.join("\n"));
            }
        }
        _ => {
            if has_block_descendant(element) {
                visit_container(element, blocks);
            } else {
                push_block(
                    blocks,
                    BlockKind::Paragraph,
                    &collapse_whitespace(&flatten_text(element)),
                );
            }
        }
    }
}

/// 列表容器
///
/// 直接子 `<li>` 按出现顺序编号；其余子元素照常遍历，散落文本合并成段落
fn visit_list(element: ElementRef, ordered: bool, blocks: &mut Vec<ContentBlock>) {
    let mut ordinal = 0;
    let mut loose = String::new();

    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            loose.push_str(text);
            continue;
        }

        let Some(child_element) = ElementRef::wrap(child) else {
            continue;
        };
        let tag = child_element.value().name();

        if is_skipped(tag) {
            continue;
        }

        if tag == "li" {
            push_block(blocks, BlockKind::Paragraph, &collapse_whitespace(&loose));
            loose.clear();
            ordinal += 1;
            let bullet = if ordered {
                format!("{}.", ordinal)
            } else {
                "•".to_string()
            };
            push_list_item(blocks, &bullet, child_element);
        } else if is_block(tag) || has_block_descendant(child_element) {
            push_block(blocks, BlockKind::Paragraph, &collapse_whitespace(&loose));
            loose.clear();
            if is_block(tag) {
                visit_block(child_element, blocks);
            } else {
                visit_container(child_element, blocks);
            }
        } else {
            loose.push_str(&flatten_text(child_element));
        }
    }

    push_block(blocks, BlockKind::Paragraph, &collapse_whitespace(&loose));
}

fn push_list_item(blocks: &mut Vec<ContentBlock>, bullet: &str, item: ElementRef) {
    let text = collapse_whitespace(&flatten_text(item));
    if !text.is_empty() {
        push_block(
            blocks,
            BlockKind::ListItem,
            &format!("_{} {}_", bullet, text),
        );
    }
}

/// 追加一个块，空文本忽略，超长文本按句拆分
fn push_block(blocks: &mut Vec<ContentBlock>, kind: BlockKind, text: &str) {
    if text.trim().is_empty() {
        return;
    }

    if is_long_block(text) {
        blocks.extend(
            split_long_block(text)
                .into_iter()
                .map(|chunk| ContentBlock::new(kind, chunk)),
        );
    } else {
        blocks.push(ContentBlock::new(kind, text));
    }
}

/// 是否含有块级后代
fn has_block_descendant(element: ElementRef) -> bool {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|e| is_block(e.value().name()))
}

/// 拼接所有后代文本节点（跳过脚本、样式等）
fn flatten_text(element: ElementRef) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if is_skipped(child_element.value().name()) {
                continue;
            }
            if child_element.value().name() == "br" {
                out.push('\n');
            } else {
                collect_text(child_element, out);
            }
        }
    }
}
