//! paged-reader - 分页阅读命令行

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paged_reader_lib::async_import::run_import;
use paged_reader_lib::db::{self, SqliteStore};
use paged_reader_lib::locator;
use paged_reader_lib::normalizer::normalize_text;
use paged_reader_lib::{ReaderSettings, ReadingSession, Result, ViewportMetrics};

#[derive(Parser)]
#[command(name = "paged-reader")]
#[command(version, about = "EPUB / 文本分页阅读", long_about = None)]
#[command(after_help = "EXAMPLES:
    paged-reader book.epub info                       显示书名和页数
    paged-reader book.epub page 3 --html              以 HTML 输出第 3 页
    paged-reader book.epub find \"stormy night\"        查找文本所在页
    paged-reader book.epub bookmark \"It was\" --page 3 在第 3 页添加书签")]
struct Cli {
    /// 输入文件（EPUB、TXT 或 Markdown）
    #[arg(value_name = "FILE")]
    file: PathBuf,

    #[command(subcommand)]
    command: Command,

    /// 书签和阅读位置数据库
    #[arg(long, value_name = "PATH", default_value = "paged-reader.db", global = true)]
    db: PathBuf,

    /// 视口宽度（px）
    #[arg(long, global = true)]
    width: Option<f32>,

    /// 视口高度（px）
    #[arg(long, global = true)]
    height: Option<f32>,

    /// 字号（px）
    #[arg(long, global = true)]
    font_size: Option<f32>,

    /// 行高（字号的倍数）
    #[arg(long, global = true)]
    line_height: Option<f32>,

    /// 内边距（px）
    #[arg(long, global = true)]
    padding: Option<f32>,

    /// 分栏间距（px）
    #[arg(long, global = true)]
    column_gap: Option<f32>,

    /// 关闭对话拆分
    #[arg(long, global = true)]
    no_dialogue: bool,

    /// 关闭引号规范化
    #[arg(long, global = true)]
    no_quotes: bool,
}

#[derive(Subcommand)]
enum Command {
    /// 显示书名、页数和当前页
    Info,
    /// 输出指定页
    Page {
        index: usize,
        /// 输出 HTML 而不是纯文本
        #[arg(long)]
        html: bool,
    },
    /// 查找文本所在的页
    Find { text: String },
    /// 为某页上的文本添加书签
    Bookmark {
        text: String,
        #[arg(long)]
        page: usize,
    },
    /// 列出书签及其当前所在页
    Bookmarks,
}

impl Cli {
    fn viewport(&self) -> ViewportMetrics {
        let defaults = ViewportMetrics::default();
        ViewportMetrics {
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            font_size: self.font_size.unwrap_or(defaults.font_size),
            line_height: self.line_height.unwrap_or(defaults.line_height),
            padding: self.padding.unwrap_or(defaults.padding),
            column_gap: self.column_gap.unwrap_or(defaults.column_gap),
        }
    }

    /// 已保存的设置为基础，环境变量和命令行开关依次覆盖
    fn settings(&self, stored: ReaderSettings) -> ReaderSettings {
        let mut settings = stored.overlay_env();
        if self.no_dialogue {
            settings.dialogue_mode = false;
        }
        if self.no_quotes {
            settings.quote_normalize = false;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paged_reader=info,paged_reader_lib=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let store = SqliteStore::open(&cli.db)?;
    let mut prefs = db::load_preferences(&store);
    let settings = cli.settings(prefs.settings);
    let mut session = ReadingSession::with_heuristics(settings, cli.viewport());

    // 1. 后台导入
    let source = cli.file.to_string_lossy().into_owned();
    let ticket = session.begin_import(&source)?;
    let (ticket, outcome) = run_import(session.tracker(), session.router(), ticket, cli.file.clone()).await;
    session.complete_import(&ticket, outcome, None)?;

    let book_id = session.book_id().unwrap_or_default().to_string();

    // 2. 回到上次阅读的位置
    if let Some(&page) = prefs.pages.get(&book_id) {
        session.go_to_page(page);
    }

    // 3. 执行命令
    match &cli.command {
        Command::Info => {
            println!("Title: {}", session.title().unwrap_or_default());
            println!("Pages: {}", session.total_pages());
            println!("Current page: {}", session.current_page());
            println!("Book id: {}", book_id);
            if let Some(book) = session.book() {
                println!("Blocks: {}", book.document.len());
                println!("Quality: {:?}", book.quality);
            }
        }
        Command::Page { index, html } => {
            let current = session.go_to_page(*index);
            if let Some(page) = session.page(current) {
                if *html {
                    println!("{}", page.to_html());
                } else {
                    println!("{}", page.text);
                }
            }
            eprintln!("[{}/{}]", current, session.total_pages());
        }
        Command::Find { text } => match session.find_page_for_normalized_substring(&normalize_text(text)) {
            Some(page) => println!("{}", page),
            None => println!("{}", paged_reader_lib::ReaderError::SnippetNotFound),
        },
        Command::Bookmark { text, page } => {
            session.go_to_page(*page);
            let anchor = session.add_bookmark(text)?;
            let saved = db::save_bookmark(&store, &book_id, anchor)?;
            println!("{} -> page {}", saved.id, saved.anchor.page);
        }
        Command::Bookmarks => {
            for bookmark in db::list_bookmarks(&store, &book_id) {
                let page = locator::resolve_anchor(session.pagination(), &bookmark.anchor)
                    .map(|p| p.to_string())
                    .unwrap_or_else(|_| "?".to_string());
                println!(
                    "{}\tpage {}\t{}\t{}",
                    bookmark.id,
                    page,
                    bookmark.anchor.created_at.format("%Y-%m-%d %H:%M"),
                    bookmark.anchor.snippet
                );
            }
        }
    }

    if let Some(status) = session.status() {
        tracing::info!(status, "完成");
    }

    // 4. 保存阅读位置和设置
    prefs.settings = settings;
    prefs.pages.insert(book_id, session.current_page());
    db::save_preferences(&store, &prefs)?;

    Ok(())
}
