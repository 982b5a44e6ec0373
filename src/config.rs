//! 阅读设置
//!
//! 只影响文本规范化阶段（引号规范化、对话拆分）

use serde::{Deserialize, Serialize};
use std::env;

/// 文本处理开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReaderSettings {
    /// 对话拆分：把长段落中连续的对白拆成独立段落
    pub dialogue_mode: bool,
    /// 引号规范化：把用作对白的单引号替换为双引号
    pub quote_normalize: bool,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            dialogue_mode: true,
            quote_normalize: true,
        }
    }
}

impl ReaderSettings {
    /// 从环境变量读取设置，未设置或无法识别的值使用默认值
    ///
    /// - `READER_DIALOGUE_MODE`
    /// - `READER_QUOTE_NORMALIZE`
    pub fn from_env() -> Self {
        Self::default().overlay_env()
    }

    /// 以当前设置为基础，用环境变量覆盖
    pub fn overlay_env(self) -> Self {
        self.overlay(|name| env::var(name).ok())
    }

    fn overlay<F>(self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| lookup(name).and_then(|v| parse_flag(&v));
        Self {
            dialogue_mode: flag("READER_DIALOGUE_MODE").unwrap_or(self.dialogue_mode),
            quote_normalize: flag("READER_QUOTE_NORMALIZE").unwrap_or(self.quote_normalize),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_both_passes() {
        let settings = ReaderSettings::default();
        assert!(settings.dialogue_mode);
        assert!(settings.quote_normalize);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag(" OFF "), Some(false));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn test_overlay_keeps_base_for_unset_vars() {
        let stored = ReaderSettings {
            dialogue_mode: false,
            quote_normalize: true,
        };

        assert_eq!(stored.overlay(|_| None), stored);

        let overridden = stored.overlay(|name| match name {
            "READER_QUOTE_NORMALIZE" => Some("off".to_string()),
            "READER_DIALOGUE_MODE" => Some("garbage".to_string()),
            _ => None,
        });
        assert!(!overridden.dialogue_mode);
        assert!(!overridden.quote_normalize);
    }

    #[test]
    fn test_deserialize_missing_fields_uses_defaults() {
        let settings: ReaderSettings = serde_json::from_str(r#"{"dialogueMode": false}"#).unwrap();
        assert!(!settings.dialogue_mode);
        assert!(settings.quote_normalize);
    }
}
