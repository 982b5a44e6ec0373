//! 异步导入模块
//!
//! 在阻塞线程池中完成读取和解析，调用方用 [`ImportTracker`] 的代数丢弃过期结果

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, warn};

use crate::error::{ReaderError, Result};
use crate::import_tracker::{ImportStatus, ImportTicket, ImportTracker};
use crate::parser::{content_digest, ExtractedBook, ParserRouter};

/// 后台解析的结果
#[derive(Debug, Clone)]
pub struct ImportedBook {
    /// 来源（文件名）
    pub source: String,
    /// 文件内容的 SHA-256，作为解析缓存的键
    pub digest: String,
    pub book: ExtractedBook,
}

/// 在阻塞线程池中解析
///
/// # 参数
/// - `router`: 解析器路由
/// - `source`: 文件名（决定使用哪个解析器）
/// - `bytes`: 文件内容
pub async fn extract_in_background(
    router: Arc<ParserRouter>,
    source: String,
    bytes: Vec<u8>,
) -> Result<ImportedBook> {
    tokio::task::spawn_blocking(move || -> Result<ImportedBook> {
        let digest = content_digest(&bytes);
        let parser = router.route(&source)?;
        let book = parser.parse(&bytes, &source)?;
        Ok(ImportedBook {
            source,
            digest,
            book,
        })
    })
    .await
    .map_err(|e| ReaderError::Task(e.to_string()))?
}

/// 读取文件并在后台解析
pub async fn import_file(router: Arc<ParserRouter>, path: impl AsRef<Path>) -> Result<ImportedBook> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await?;
    debug!(path = %path.display(), bytes = bytes.len(), "文件读取完成");

    extract_in_background(router, path.to_string_lossy().into_owned(), bytes).await
}

/// 按请求代数执行一次导入
///
/// 返回的结果带着 `ticket`，由会话在 [`crate::session::ReadingSession::complete_import`]
/// 中判断是否过期
pub async fn run_import(
    tracker: Arc<ImportTracker>,
    router: Arc<ParserRouter>,
    ticket: ImportTicket,
    path: PathBuf,
) -> (ImportTicket, Result<ImportedBook>) {
    if let Err(e) = tracker.update_status(ticket.generation, ImportStatus::Parsing) {
        warn!(error = %e, "更新导入状态失败");
    }
    let outcome = import_file(router, &path).await;
    (ticket, outcome)
}

/// 批量解析多个文件
///
/// 解析是纯计算，互不影响，最多 `max_concurrent` 个同时进行。
/// 结果按输入顺序返回。
pub async fn import_batch(
    router: Arc<ParserRouter>,
    paths: Vec<PathBuf>,
    max_concurrent: usize,
) -> Vec<Result<ImportedBook>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut set = JoinSet::new();
    let mut slots = HashMap::new();

    for (idx, path) in paths.into_iter().enumerate() {
        let router = router.clone();
        let semaphore = semaphore.clone();
        let handle = set.spawn(async move {
            match semaphore.acquire_owned().await {
                Ok(_permit) => import_file(router, &path).await,
                Err(e) => Err(ReaderError::Task(e.to_string())),
            }
        });
        slots.insert(handle.id(), idx);
    }

    join_in_order(set, slots).await
}

/// 按输入顺序收集结果，每个输入恰好对应一个结果
///
/// 异常退出的任务在自己的位置上得到 `ReaderError::Task`
async fn join_in_order<T: 'static>(
    mut set: JoinSet<Result<T>>,
    slots: HashMap<task::Id, usize>,
) -> Vec<Result<T>> {
    let mut results: Vec<Option<Result<T>>> = (0..slots.len()).map(|_| None).collect();

    while let Some(joined) = set.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => {
                warn!(error = %e, "批量导入任务异常退出");
                (e.id(), Err(ReaderError::Task(e.to_string())))
            }
        };
        if let Some(slot) = slots.get(&id).and_then(|&idx| results.get_mut(idx)) {
            *slot = Some(result);
        }
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(ReaderError::Task("任务没有返回结果".to_string()))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn text_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_extract_in_background() {
        let router = Arc::new(ParserRouter::new());
        let imported = extract_in_background(router, "notes.txt".to_string(), b"One.\n\nTwo.".to_vec())
            .await
            .unwrap();

        assert_eq!(imported.book.title, "notes.txt");
        assert_eq!(imported.book.blocks.len(), 2);
        assert_eq!(imported.digest, content_digest(b"One.\n\nTwo."));
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let router = Arc::new(ParserRouter::new());
        let err = extract_in_background(router, "scan.pdf".to_string(), vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_import_missing_file() {
        let router = Arc::new(ParserRouter::new());
        let err = import_file(router, "/nonexistent/dir/book.txt").await.unwrap_err();
        assert!(err.is_io());
    }

    #[tokio::test]
    async fn test_stale_import_detected() {
        let tracker = Arc::new(ImportTracker::new());
        let router = Arc::new(ParserRouter::new());
        let first_file = text_file("First book.");
        let second_file = text_file("Second book.");

        let first = tracker.begin("first").unwrap();
        let second = tracker.begin("second").unwrap();

        let (t2, r2) = run_import(tracker.clone(), router.clone(), second, second_file.path().to_path_buf()).await;
        let (t1, r1) = run_import(tracker.clone(), router.clone(), first, first_file.path().to_path_buf()).await;

        assert!(r1.is_ok() && r2.is_ok());
        assert!(tracker.finish(t2.generation, ImportStatus::Completed).unwrap());
        assert!(!tracker.finish(t1.generation, ImportStatus::Completed).unwrap());
    }

    #[tokio::test]
    async fn test_import_batch_keeps_order() {
        let router = Arc::new(ParserRouter::new());
        let files: Vec<NamedTempFile> = (0..5).map(|i| text_file(&format!("Book {}.", i))).collect();
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path().to_path_buf()).collect();

        let results = import_batch(router, paths, 2).await;
        assert_eq!(results.len(), 5);
        for (i, result) in results.iter().enumerate() {
            let imported = result.as_ref().unwrap();
            assert_eq!(imported.book.blocks[0].text, format!("Book {}.", i));
        }
    }

    #[tokio::test]
    async fn test_import_batch_error_keeps_slot() {
        let router = Arc::new(ParserRouter::new());
        let first = text_file("First.");
        let last = text_file("Last.");
        let paths = vec![
            first.path().to_path_buf(),
            PathBuf::from("/nonexistent/dir/missing.txt"),
            last.path().to_path_buf(),
        ];

        let results = import_batch(router, paths, 3).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().book.blocks[0].text, "First.");
        assert!(results[1].as_ref().unwrap_err().is_io());
        assert_eq!(results[2].as_ref().unwrap().book.blocks[0].text, "Last.");
    }

    #[tokio::test]
    async fn test_panicked_task_becomes_task_error() {
        let mut set = JoinSet::new();
        let mut slots = HashMap::new();
        for idx in 0..3usize {
            let handle = set.spawn(async move {
                if idx == 1 {
                    panic!("boom");
                }
                Ok(idx)
            });
            slots.insert(handle.id(), idx);
        }

        let results = join_in_order(set, slots).await;
        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].as_ref().unwrap(), 0);
        assert!(matches!(results[1], Err(ReaderError::Task(_))));
        assert_eq!(*results[2].as_ref().unwrap(), 2);
    }
}
