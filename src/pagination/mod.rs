// 分页模块
// 把规范化后的内容块按视口大小切分成页

pub mod engine;
pub mod measurer;
pub mod types;

// 重新导出主要类型
pub use engine::paginate;
pub use measurer::{HeuristicMeasurer, Measurer};
pub use types::{Page, PaginationResult, ViewportMetrics, PLACEHOLDER_TEXT};
