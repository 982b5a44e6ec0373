/// 检查 EPUB 容器结构
///
/// 打印 OPF 路径、阅读顺序中的内容文档、跳过的条目，以及每个文档提取出的内容块数量
///
/// 用法：cargo run --bin inspect_epub -- <book.epub>

use paged_reader_lib::parser::epub_parser::EpubParser;
use paged_reader_lib::parser::html_extractor::extract_blocks;

fn main() {
    let Some(epub_path) = std::env::args().nth(1) else {
        eprintln!("用法: inspect_epub <book.epub>");
        return;
    };

    let bytes = match std::fs::read(&epub_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("错误: 无法读取 {}: {}", epub_path, e);
            return;
        }
    };

    println!("正在解析 EPUB 文件: {}", epub_path);

    match EpubParser::new().read_documents(&bytes) {
        Ok(contents) => {
            println!("✓ EPUB 文件打开成功");
            println!("  标题: {}", contents.title.as_deref().unwrap_or("(无)"));
            println!("  OPF: {}", contents.package_path);
            println!("  内容文档: {}", contents.documents.len());

            let mut total = 0;
            for (i, doc) in contents.documents.iter().enumerate() {
                let blocks = extract_blocks(&doc.html);
                total += blocks.len();
                let preview = blocks
                    .first()
                    .map(|b| b.text.chars().take(60).collect::<String>())
                    .unwrap_or_default();
                println!("\n  [{}] {} ({}) {} 个内容块", i, doc.path, doc.media_type, blocks.len());
                if !preview.is_empty() {
                    println!("  预览: {}...", preview.replace('\n', " "));
                }
            }

            if !contents.skipped.is_empty() {
                println!("\n  跳过的条目: {}", contents.skipped.join(", "));
            }
            println!("\n共 {} 个内容块", total);

            if total == 0 {
                println!("\n⚠ 警告: 没有提取到任何文本！");
            }
        }
        Err(e) => {
            eprintln!("✗ EPUB 解析失败: {}", e);
        }
    }
}
