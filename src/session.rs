//! 阅读会话
//!
//! 持有当前书籍、分页结果和阅读位置。所有写入都经过会话方法，
//! 解析失败或过期的异步结果不会改动当前状态。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::async_import::ImportedBook;
use crate::config::ReaderSettings;
use crate::error::{ReaderError, Result};
use crate::import_tracker::{ImportStatus, ImportTicket, ImportTracker};
use crate::locator::{self, BookmarkAnchor};
use crate::normalizer::{NormalizedDocument, TextNormalizer};
use crate::pagination::{paginate, HeuristicMeasurer, Measurer, Page, PaginationResult, ViewportMetrics};
use crate::parser::txt_parser::{display_name, TxtParser};
use crate::parser::{content_digest, ContentBlock, ExtractedBook, ParseQuality, ParserRouter};

/// 解析缓存最多保留的书数
pub const PARSE_CACHE_CAPACITY: usize = 8;

/// 解析缓存的键：文件名加内容摘要
///
/// 文件名决定解析器和默认书名，同样的内容换了名字要重新解析
fn cache_key(file_name: &str, digest: &str) -> String {
    format!("{}:{}", display_name(file_name), digest)
}

/// 已加载的书
#[derive(Debug, Clone)]
pub struct LoadedBook {
    /// 书的标识（文件内容摘要或调用方指定）
    pub id: String,
    pub title: String,
    pub quality: ParseQuality,
    /// 规范化之前的内容块，设置变化时从这里重新规范化
    pub source: ExtractedBook,
    pub document: NormalizedDocument,
}

/// 阅读会话
pub struct ReadingSession<M: Measurer = HeuristicMeasurer> {
    measurer: M,
    settings: ReaderSettings,
    viewport: ViewportMetrics,
    router: Arc<ParserRouter>,
    tracker: Arc<ImportTracker>,
    book: Option<LoadedBook>,
    pagination: PaginationResult,
    /// 文件名 + 内容摘要 -> 解析结果
    parse_cache: HashMap<String, ExtractedBook>,
    /// 缓存键的插入顺序，超出容量时淘汰最早的
    cache_order: VecDeque<String>,
    /// 尚未应用的视口变化（只保留最后一次）
    pending_viewport: Option<ViewportMetrics>,
    status: Option<String>,
}

impl ReadingSession<HeuristicMeasurer> {
    /// 使用启发式测量的会话
    pub fn with_heuristics(settings: ReaderSettings, viewport: ViewportMetrics) -> Self {
        Self::new(HeuristicMeasurer::new(), settings, viewport)
    }
}

impl<M: Measurer> ReadingSession<M> {
    pub fn new(measurer: M, settings: ReaderSettings, viewport: ViewportMetrics) -> Self {
        let pagination = paginate(&[], &viewport, &measurer, 1);
        Self {
            measurer,
            settings,
            viewport,
            router: Arc::new(ParserRouter::new()),
            tracker: Arc::new(ImportTracker::new()),
            book: None,
            pagination,
            parse_cache: HashMap::new(),
            cache_order: VecDeque::new(),
            pending_viewport: None,
            status: None,
        }
    }

    pub fn settings(&self) -> ReaderSettings {
        self.settings
    }

    pub fn viewport(&self) -> ViewportMetrics {
        self.viewport
    }

    pub fn pagination(&self) -> &PaginationResult {
        &self.pagination
    }

    pub fn book(&self) -> Option<&LoadedBook> {
        self.book.as_ref()
    }

    pub fn book_id(&self) -> Option<&str> {
        self.book.as_ref().map(|b| b.id.as_str())
    }

    pub fn title(&self) -> Option<&str> {
        self.book.as_ref().map(|b| b.title.as_str())
    }

    /// 最近一条状态信息
    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn router(&self) -> Arc<ParserRouter> {
        self.router.clone()
    }

    pub fn tracker(&self) -> Arc<ImportTracker> {
        self.tracker.clone()
    }

    pub fn current_page(&self) -> usize {
        self.pagination.current
    }

    pub fn total_pages(&self) -> usize {
        self.pagination.total
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pagination.page(index)
    }

    fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(status = %message, "状态更新");
        self.status = Some(message);
    }

    /// 加载纯文本
    ///
    /// # 参数
    /// - `book_id`: 书的标识
    /// - `title`: 书名
    /// - `text`: 原文
    /// - `landing`: 加载后停留的页码，`None` 为第 1 页
    pub fn load_text(&mut self, book_id: &str, title: &str, text: &str, landing: Option<usize>) {
        let book = ExtractedBook {
            title: title.to_string(),
            blocks: TxtParser::new().blocks_from_text(text),
            quality: ParseQuality::Light,
        };
        self.supersede_imports();
        self.commit(book_id.to_string(), book, landing);
    }

    /// 同步解析文件并加载
    ///
    /// 相同内容的文件直接使用缓存的解析结果。
    /// 失败时记录状态并返回错误，当前书籍保持不变。
    ///
    /// # 返回
    /// 书的标识（内容摘要）
    pub fn ingest(&mut self, file_name: &str, bytes: &[u8], landing: Option<usize>) -> Result<String> {
        let digest = content_digest(bytes);
        let key = cache_key(file_name, &digest);

        let book = match self.parse_cache.get(&key).cloned() {
            Some(cached) => {
                debug!(file_name, "命中解析缓存");
                cached
            }
            None => {
                let parsed = self
                    .router
                    .route(file_name)
                    .and_then(|parser| parser.parse(bytes, file_name));
                match parsed {
                    Ok(book) => {
                        self.cache_insert(key, book.clone());
                        book
                    }
                    Err(e) => {
                        warn!(file_name, error = %e, "导入失败");
                        self.set_status(e.to_string());
                        return Err(e);
                    }
                }
            }
        };

        self.supersede_imports();
        self.commit(digest.clone(), book, landing);
        Ok(digest)
    }

    /// 同步加载成功后，尚未完成的异步导入全部过期
    fn supersede_imports(&self) {
        if let Err(e) = self.tracker.cancel_all() {
            warn!(error = %e, "取消进行中的导入失败");
        }
    }

    /// 解析缓存中是否已有该文件
    pub fn is_cached(&self, file_name: &str, bytes: &[u8]) -> bool {
        self.parse_cache
            .contains_key(&cache_key(file_name, &content_digest(bytes)))
    }

    fn cache_insert(&mut self, key: String, book: ExtractedBook) {
        if self.parse_cache.insert(key.clone(), book).is_none() {
            self.cache_order.push_back(key);
        }
        while self.cache_order.len() > PARSE_CACHE_CAPACITY {
            if let Some(oldest) = self.cache_order.pop_front() {
                self.parse_cache.remove(&oldest);
            }
        }
    }

    /// 开始一次异步导入
    ///
    /// 之前尚未完成的导入都会过期
    pub fn begin_import(&mut self, source: &str) -> Result<ImportTicket> {
        let ticket = self.tracker.begin(source)?;
        self.set_status(format!("正在打开 {}", source));
        Ok(ticket)
    }

    /// 异步导入完成
    ///
    /// # 返回
    /// - `Ok(true)`: 结果已成为当前内容
    /// - `Ok(false)`: 请求已过期，结果被丢弃
    /// - `Err(e)`: 导入失败，当前书籍保持不变
    pub fn complete_import(
        &mut self,
        ticket: &ImportTicket,
        outcome: Result<ImportedBook>,
        landing: Option<usize>,
    ) -> Result<bool> {
        let status = match &outcome {
            Ok(_) => ImportStatus::Completed,
            Err(e) => ImportStatus::Failed(e.to_string()),
        };

        if !self.tracker.finish(ticket.generation, status)? {
            return Ok(false);
        }

        match outcome {
            Ok(imported) => {
                let key = cache_key(&imported.source, &imported.digest);
                self.cache_insert(key, imported.book.clone());
                self.commit(imported.digest, imported.book, landing);
                Ok(true)
            }
            Err(e) => {
                warn!(source = %ticket.source, error = %e, "导入失败");
                self.set_status(e.to_string());
                Err(e)
            }
        }
    }

    /// 用新的解析结果替换当前书籍并分页
    fn commit(&mut self, id: String, source: ExtractedBook, landing: Option<usize>) {
        let document = TextNormalizer::new(self.settings).normalize(&source.blocks);
        self.pagination = paginate(
            &document.blocks,
            &self.viewport,
            &self.measurer,
            landing.unwrap_or(1),
        );

        info!(
            book_id = %id,
            title = %source.title,
            blocks = document.len(),
            pages = self.pagination.total,
            "书籍已加载"
        );
        let title = source.title.clone();
        self.book = Some(LoadedBook {
            id,
            title: title.clone(),
            quality: source.quality,
            source,
            document,
        });
        self.set_status(format!("已加载：{}", title));
    }

    fn document_blocks(&self) -> &[ContentBlock] {
        self.book
            .as_ref()
            .map(|b| b.document.blocks.as_slice())
            .unwrap_or(&[])
    }

    /// 按新的视口整本重新分页
    ///
    /// # 参数
    /// - `viewport`: 新视口
    /// - `landing_page`: 分页后停留的页码（会重新钳制）
    pub fn repaginate(&mut self, viewport: ViewportMetrics, landing_page: usize) -> &PaginationResult {
        self.viewport = viewport;
        self.pending_viewport = None;
        let pagination = paginate(self.document_blocks(), &viewport, &self.measurer, landing_page);
        self.pagination = pagination;
        &self.pagination
    }

    /// 记录一次视口变化，等 [`Self::flush_reflow`] 时统一应用
    pub fn request_reflow(&mut self, viewport: ViewportMetrics) {
        self.pending_viewport = Some(viewport);
    }

    /// 应用积压的视口变化
    ///
    /// # 返回
    /// 是否真的重新分页了
    pub fn flush_reflow(&mut self) -> bool {
        match self.pending_viewport.take() {
            Some(viewport) if viewport != self.viewport => {
                let landing = self.pagination.current;
                self.repaginate(viewport, landing);
                true
            }
            _ => false,
        }
    }

    /// 修改文本处理设置，重新规范化并回到当前页码
    pub fn set_settings(&mut self, settings: ReaderSettings) {
        if settings == self.settings {
            return;
        }
        self.settings = settings;

        if let Some(book) = self.book.as_mut() {
            book.document = TextNormalizer::new(settings).normalize(&book.source.blocks);
            let landing = self.pagination.current;
            let viewport = self.viewport;
            self.repaginate(viewport, landing);
        }
    }

    /// 跳到指定页（钳制到有效范围）
    pub fn go_to_page(&mut self, index: usize) -> usize {
        self.pagination.current = self.pagination.clamp_page(index);
        self.pagination.current
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to_page(self.pagination.current + 1)
    }

    pub fn previous_page(&mut self) -> usize {
        self.go_to_page(self.pagination.current.saturating_sub(1))
    }

    /// 查找第一个包含已规范化文本的页
    pub fn find_page_for_normalized_substring(&self, needle: &str) -> Option<usize> {
        locator::find_page_for_normalized_substring(&self.pagination, needle)
    }

    /// 为当前页上的选中文本创建书签
    ///
    /// 失败时记录状态，当前页不变
    pub fn add_bookmark(&mut self, selection: &str) -> Result<BookmarkAnchor> {
        let result = if self.book.is_none() {
            Err(ReaderError::AnchorResolution {
                page: self.pagination.current,
            })
        } else {
            locator::create_anchor(&self.pagination, selection, self.pagination.current)
        };

        match result {
            Ok(anchor) => {
                info!(page = anchor.page, snippet = %anchor.snippet, "书签已保存");
                self.set_status("书签已保存");
                Ok(anchor)
            }
            Err(e) => {
                self.set_status(e.to_string());
                Err(e)
            }
        }
    }

    /// 跳转到书签
    ///
    /// 找不到时记录状态，当前页不变
    pub fn navigate_to_bookmark(&mut self, anchor: &BookmarkAnchor) -> Result<usize> {
        match locator::resolve_anchor(&self.pagination, anchor) {
            Ok(page) => {
                self.go_to_page(page);
                self.set_status("已跳转到书签");
                Ok(page)
            }
            Err(e) => {
                warn!(snippet = %anchor.snippet, "当前分页中找不到书签");
                self.set_status(e.to_string());
                Err(e)
            }
        }
    }
}
