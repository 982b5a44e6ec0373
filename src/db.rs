use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

use crate::config::ReaderSettings;
use crate::error::{ReaderError, Result};
use crate::locator::BookmarkAnchor;

/// 书签记录的键
pub const BOOKMARKS_KEY: &str = "bookmarks-v1";
/// 阅读偏好的键
pub const PREFS_KEY: &str = "reader-prefs";

/// 键值存储
///
/// 值一律是 JSON 字符串
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// 打开（或创建）数据库并建表
pub fn init_db<P: AsRef<Path>>(path: P) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA encoding = 'UTF-8'", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    Ok(())
}

/// SQLite 键值存储
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// 打开数据库文件
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            conn: init_db(path)?,
        })
    }

    /// 内存数据库
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            params![key, value],
        )?;
        Ok(())
    }
}

/// 内存键值存储
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|e| ReaderError::Task(format!("锁定存储失败: {}", e)))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| ReaderError::Task(format!("锁定存储失败: {}", e)))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// 已保存的书签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBookmark {
    /// 创建时间的毫秒时间戳，同一本书内唯一
    pub id: String,
    #[serde(flatten)]
    pub anchor: BookmarkAnchor,
}

/// 阅读偏好
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Preferences {
    pub settings: ReaderSettings,
    /// 书 -> 上次阅读的页码
    pub pages: HashMap<String, usize>,
}

type BookmarkMap = HashMap<String, Vec<StoredBookmark>>;

/// 读取 JSON 值，读取失败或内容损坏时返回默认值
fn load_json<T, S>(store: &S, key: &str) -> T
where
    T: for<'de> Deserialize<'de> + Default,
    S: KeyValueStore + ?Sized,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(e) => {
            warn!(key, error = %e, "读取存储失败，使用默认值");
            return T::default();
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(key, error = %e, "存储内容已损坏，使用默认值");
        T::default()
    })
}

/// 读取即将被改写的 JSON 值
///
/// 内容损坏时返回错误，避免改写后丢掉原有数据
fn load_json_for_update<T, S>(store: &S, key: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
    S: KeyValueStore + ?Sized,
{
    let Some(raw) = store.get(key)? else {
        return Ok(T::default());
    };

    serde_json::from_str(&raw).map_err(|e| {
        warn!(key, error = %e, "存储内容已损坏，拒绝覆盖");
        ReaderError::from(e)
    })
}

fn save_json<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize,
    S: KeyValueStore + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}

/// 某本书的书签，最新的在前
pub fn list_bookmarks<S: KeyValueStore + ?Sized>(store: &S, book_id: &str) -> Vec<StoredBookmark> {
    let mut all: BookmarkMap = load_json(store, BOOKMARKS_KEY);
    let mut list = all.remove(book_id).unwrap_or_default();
    list.sort_by(|a, b| {
        b.anchor
            .created_at
            .cmp(&a.anchor.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    list
}

/// 保存书签
///
/// # 返回
/// 带 id 的书签记录；已保存的书签数据损坏时返回错误，原内容保持不变
pub fn save_bookmark<S: KeyValueStore + ?Sized>(
    store: &S,
    book_id: &str,
    anchor: BookmarkAnchor,
) -> Result<StoredBookmark> {
    let mut all: BookmarkMap = load_json_for_update(store, BOOKMARKS_KEY)?;
    let list = all.entry(book_id.to_string()).or_default();

    let mut millis = anchor.created_at.timestamp_millis();
    while list.iter().any(|b| b.id == millis.to_string()) {
        millis += 1;
    }

    let bookmark = StoredBookmark {
        id: millis.to_string(),
        anchor,
    };
    list.push(bookmark.clone());
    save_json(store, BOOKMARKS_KEY, &all)?;

    Ok(bookmark)
}

/// 按 id 查找书签
pub fn find_bookmark<S: KeyValueStore + ?Sized>(
    store: &S,
    book_id: &str,
    id: &str,
) -> Option<StoredBookmark> {
    list_bookmarks(store, book_id).into_iter().find(|b| b.id == id)
}

pub fn load_preferences<S: KeyValueStore + ?Sized>(store: &S) -> Preferences {
    load_json(store, PREFS_KEY)
}

pub fn save_preferences<S: KeyValueStore + ?Sized>(store: &S, prefs: &Preferences) -> Result<()> {
    save_json(store, PREFS_KEY, prefs)
}

/// 记录某本书的阅读位置
pub fn remember_page<S: KeyValueStore + ?Sized>(store: &S, book_id: &str, page: usize) -> Result<()> {
    let mut prefs: Preferences = load_json_for_update(store, PREFS_KEY)?;
    prefs.pages.insert(book_id.to_string(), page);
    save_preferences(store, &prefs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn anchor(snippet: &str, page: usize) -> BookmarkAnchor {
        BookmarkAnchor {
            snippet: snippet.to_string(),
            normalized_snippet: snippet.to_lowercase(),
            page,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sqlite_store_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reader.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("k", "v1").unwrap();
            store.set("k", "v2").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v2".to_string()));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_bookmarks_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let mut older = anchor("Older", 1);
        older.created_at = Utc::now() - Duration::minutes(5);

        save_bookmark(&store, "book", older).unwrap();
        save_bookmark(&store, "book", anchor("Newer", 2)).unwrap();
        save_bookmark(&store, "other", anchor("Elsewhere", 3)).unwrap();

        let list = list_bookmarks(&store, "book");
        let snippets: Vec<&str> = list.iter().map(|b| b.anchor.snippet.as_str()).collect();
        assert_eq!(snippets, vec!["Newer", "Older"]);
        assert_eq!(list_bookmarks(&store, "other").len(), 1);
        assert!(list_bookmarks(&store, "unknown").is_empty());
    }

    #[test]
    fn test_bookmark_ids_unique() {
        let store = MemoryStore::new();
        let a = anchor("Same moment", 1);
        let first = save_bookmark(&store, "book", a.clone()).unwrap();
        let second = save_bookmark(&store, "book", a).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(find_bookmark(&store, "book", &second.id), Some(second));
    }

    #[test]
    fn test_stored_bookmark_json_shape() {
        let bookmark = StoredBookmark {
            id: "1700000000000".to_string(),
            anchor: anchor("Text", 3),
        };
        let json = serde_json::to_value(&bookmark).unwrap();
        assert_eq!(json["id"], "1700000000000");
        assert_eq!(json["snippet"], "Text");
        assert_eq!(json["normalizedSnippet"], "text");
        assert_eq!(json["page"], 3);
    }

    #[test]
    fn test_preferences_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(load_preferences(&store), Preferences::default());

        remember_page(&store, "book-a", 7).unwrap();
        remember_page(&store, "book-b", 2).unwrap();
        let prefs = load_preferences(&store);
        assert_eq!(prefs.pages.get("book-a"), Some(&7));
        assert_eq!(prefs.pages.get("book-b"), Some(&2));
        assert!(prefs.settings.dialogue_mode);
    }

    #[test]
    fn test_corrupt_json_falls_back_to_default() {
        let store = MemoryStore::new();
        store.set(PREFS_KEY, "{not json").unwrap();
        store.set(BOOKMARKS_KEY, "[1, 2").unwrap();

        assert_eq!(load_preferences(&store), Preferences::default());
        assert!(list_bookmarks(&store, "book").is_empty());
    }

    #[test]
    fn test_corrupt_bookmarks_not_overwritten() {
        let store = MemoryStore::new();
        store.set(BOOKMARKS_KEY, "[1, 2").unwrap();
        store.set(PREFS_KEY, "{not json").unwrap();

        let err = save_bookmark(&store, "book", anchor("Fresh", 1)).unwrap_err();
        assert!(matches!(err, ReaderError::Serialization(_)));
        assert_eq!(store.get(BOOKMARKS_KEY).unwrap(), Some("[1, 2".to_string()));

        assert!(remember_page(&store, "book", 3).is_err());
        assert_eq!(store.get(PREFS_KEY).unwrap(), Some("{not json".to_string()));
    }

    #[test]
    fn test_unknown_preference_fields_ignored() {
        let store = MemoryStore::new();
        store
            .set(PREFS_KEY, r#"{"theme":"lamp","pages":{"b":4}}"#)
            .unwrap();
        let prefs = load_preferences(&store);
        assert_eq!(prefs.pages.get("b"), Some(&4));
        assert_eq!(prefs.settings, ReaderSettings::default());
    }
}
