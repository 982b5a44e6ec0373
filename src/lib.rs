pub mod async_import;
pub mod config;
pub mod db;
pub mod error;
pub mod import_tracker;
pub mod locator;
pub mod normalizer;
pub mod pagination;
pub mod parser;
pub mod session;


// 重新导出主要类型
pub use config::ReaderSettings;
pub use error::{ArchiveFormatError, ReaderError, Result};
pub use locator::BookmarkAnchor;
pub use normalizer::{NormalizedDocument, TextNormalizer};
pub use pagination::{paginate, HeuristicMeasurer, Measurer, Page, PaginationResult, ViewportMetrics};
pub use parser::{BlockKind, ContentBlock, ExtractedBook, ParserRouter};
pub use session::ReadingSession;
