use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;

use crate::error::{ReaderError, Result};

/// 导入状态枚举
///
/// 表示导入请求的各个阶段
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ImportStatus {
    /// 等待处理
    Pending,
    /// 正在解析文件
    Parsing,
    /// 完成并已成为当前内容
    Completed,
    /// 失败（包含错误信息）
    Failed(String),
    /// 被更新的请求取代，结果会被丢弃
    Superseded,
}

impl ImportStatus {
    /// 是否仍在进行中
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ImportStatus::Pending | ImportStatus::Parsing)
    }
}

/// 导入请求
///
/// 每次打开文件生成一个，`generation` 单调递增
#[derive(Clone, Debug)]
pub struct ImportTicket {
    /// 请求代数
    pub generation: u64,
    /// 来源（文件名）
    pub source: String,
    /// 当前状态
    pub status: ImportStatus,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 导入请求跟踪器
///
/// 只有最新一代请求的结果可以写入当前阅读状态，
/// 更早的请求完成时直接丢弃
pub struct ImportTracker {
    /// 最新的请求代数
    latest: AtomicU64,
    /// 所有请求（generation -> ticket）
    tickets: Mutex<HashMap<u64, ImportTicket>>,
}

impl ImportTracker {
    /// 创建新的跟踪器
    pub fn new() -> Self {
        Self {
            latest: AtomicU64::new(0),
            tickets: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<u64, ImportTicket>>> {
        self.tickets
            .lock()
            .map_err(|e| ReaderError::Task(format!("锁定导入记录失败: {}", e)))
    }

    /// 开始一个新的导入请求
    ///
    /// 之前仍在进行中的请求全部标记为 `Superseded`
    ///
    /// # 参数
    /// - `source`: 来源（文件名）
    ///
    /// # 返回
    /// 新请求
    pub fn begin(&self, source: &str) -> Result<ImportTicket> {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let ticket = ImportTicket {
            generation,
            source: source.to_string(),
            status: ImportStatus::Pending,
            created_at: Utc::now(),
        };

        let mut tickets = self.lock()?;
        for older in tickets.values_mut().filter(|t| t.status.is_in_flight()) {
            older.status = ImportStatus::Superseded;
        }
        tickets.insert(generation, ticket.clone());

        Ok(ticket)
    }

    /// 最新的请求代数
    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// 该代请求是否仍是最新的
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.latest_generation()
    }

    /// 取消所有进行中的请求
    ///
    /// 推进代数，之后完成的结果都会被丢弃
    pub fn cancel_all(&self) -> Result<()> {
        self.latest.fetch_add(1, Ordering::SeqCst);
        let mut tickets = self.lock()?;
        for ticket in tickets.values_mut().filter(|t| t.status.is_in_flight()) {
            ticket.status = ImportStatus::Superseded;
        }
        Ok(())
    }

    /// 更新请求状态
    pub fn update_status(&self, generation: u64, status: ImportStatus) -> Result<()> {
        let mut tickets = self.lock()?;
        if let Some(ticket) = tickets.get_mut(&generation) {
            ticket.status = status;
        }
        Ok(())
    }

    /// 请求完成
    ///
    /// # 返回
    /// - `true`: 仍是最新请求，结果可以使用，状态记为 `status`
    /// - `false`: 已过期，状态记为 `Superseded`，结果应丢弃
    pub fn finish(&self, generation: u64, status: ImportStatus) -> Result<bool> {
        let current = self.is_current(generation);
        let final_status = if current {
            status
        } else {
            info!(generation, latest = self.latest_generation(), "丢弃过期的导入结果");
            ImportStatus::Superseded
        };
        self.update_status(generation, final_status)?;
        Ok(current)
    }

    /// 获取请求状态
    pub fn get_status(&self, generation: u64) -> Option<ImportTicket> {
        let tickets = self.tickets.lock().ok()?;
        tickets.get(&generation).cloned()
    }

    /// 进行中的请求数量
    pub fn in_flight_count(&self) -> usize {
        self.tickets
            .lock()
            .map(|t| t.values().filter(|t| t.status.is_in_flight()).count())
            .unwrap_or(0)
    }
}

impl Default for ImportTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_creation() {
        let tracker = ImportTracker::new();
        assert_eq!(tracker.latest_generation(), 0);
        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[test]
    fn test_generations_increase() {
        let tracker = ImportTracker::new();
        let first = tracker.begin("a.epub").unwrap();
        let second = tracker.begin("b.txt").unwrap();

        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert!(!tracker.is_current(first.generation));
        assert!(tracker.is_current(second.generation));
    }

    #[test]
    fn test_newer_request_supersedes_older() {
        let tracker = ImportTracker::new();
        let first = tracker.begin("a.epub").unwrap();
        tracker.update_status(first.generation, ImportStatus::Parsing).unwrap();
        let second = tracker.begin("b.epub").unwrap();

        assert_eq!(
            tracker.get_status(first.generation).unwrap().status,
            ImportStatus::Superseded
        );
        assert_eq!(tracker.in_flight_count(), 1);

        // 旧请求晚到，结果丢弃
        assert!(!tracker.finish(first.generation, ImportStatus::Completed).unwrap());
        assert!(tracker.finish(second.generation, ImportStatus::Completed).unwrap());
        assert_eq!(
            tracker.get_status(second.generation).unwrap().status,
            ImportStatus::Completed
        );
    }

    #[test]
    fn test_cancel_all() {
        let tracker = ImportTracker::new();
        let ticket = tracker.begin("a.epub").unwrap();
        tracker.cancel_all().unwrap();

        assert!(!tracker.is_current(ticket.generation));
        assert!(!tracker.finish(ticket.generation, ImportStatus::Completed).unwrap());
        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[test]
    fn test_failed_status_recorded() {
        let tracker = ImportTracker::new();
        let ticket = tracker.begin("bad.epub").unwrap();
        assert!(tracker
            .finish(ticket.generation, ImportStatus::Failed("坏文件".to_string()))
            .unwrap());
        assert_eq!(
            tracker.get_status(ticket.generation).unwrap().status,
            ImportStatus::Failed("坏文件".to_string())
        );
    }

    #[test]
    fn test_unknown_generation() {
        let tracker = ImportTracker::new();
        assert!(tracker.get_status(42).is_none());
        assert!(tracker.update_status(42, ImportStatus::Parsing).is_ok());
    }
}
