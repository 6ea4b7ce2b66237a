//! 定义日志控制台的所有配置结构体。

use crate::core::entry::LogLevel;
use crate::error::{LogConsoleError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// --- 辅助函数，用于提供配置项的默认值 ---
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_capture_level() -> String {
    "DEBUG".to_string()
}
fn default_persistence_path() -> PathBuf {
    PathBuf::from("log_console.log")
}
fn default_persistence_format() -> PersistenceFormat {
    PersistenceFormat::Text
}

/// 持久化文件格式。
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceFormat {
    /// 每条记录为渲染后的文本块（首行加调用栈行）
    #[default]
    Text,
    /// 每行一个 JSON 对象
    JsonLines,
}

/// 日志控制台的顶层配置结构体。
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct LogConsoleConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    pub persistence: Option<PersistenceConfig>,
    #[serde(default)]
    pub view: ViewConfig,
}

/// 捕获相关的配置。
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 捕获 tracing 事件的最低级别
    #[serde(default = "default_capture_level")]
    pub min_level: String,
    /// 是否同时把事件输出到控制台
    #[serde(default = "default_true")]
    pub echo_to_console: bool,
    #[serde(default = "default_true")]
    pub capture_panics: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            min_level: default_capture_level(),
            echo_to_console: default_true(),
            capture_panics: default_true(),
        }
    }
}

/// 持久化文件的配置。
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    #[serde(default = "default_false")]
    pub enabled: bool,
    #[serde(default = "default_persistence_path")]
    pub path: PathBuf,
    #[serde(default = "default_persistence_format")]
    pub format: PersistenceFormat,
    /// 启动时是否从文件读回之前的条目
    #[serde(default = "default_true")]
    pub seed_on_startup: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_false(),
            path: default_persistence_path(),
            format: default_persistence_format(),
            seed_on_startup: default_true(),
        }
    }
}

/// 展示层的配置。
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    /// 初始过滤文本，逗号分隔
    #[serde(default)]
    pub filter: String,
    #[serde(default = "default_false")]
    pub colored: bool,
}

impl LogConsoleConfig {
    /// 启用且配置了持久化时返回其配置
    pub fn active_persistence(&self) -> Option<&PersistenceConfig> {
        self.persistence.as_ref().filter(|p| p.enabled)
    }
}

/// 用于从 TOML 文件加载 `LogConsoleConfig` 的辅助函数。
pub fn load_config_from_file(path: &Path) -> Result<LogConsoleConfig> {
    if !path.exists() {
        return Err(LogConsoleError::ConfigFileMissing(
            path.to_string_lossy().into_owned(),
        ));
    }

    let config_str = std::fs::read_to_string(path)?;
    load_config_from_str(&config_str)
}

/// 用于从 TOML 字符串加载 `LogConsoleConfig` 的辅助函数。
pub fn load_config_from_str(config_str: &str) -> Result<LogConsoleConfig> {
    let config: LogConsoleConfig = toml::from_str(config_str)?;
    validate_config(&config)?;
    Ok(config)
}

/// 验证配置的有效性。
pub fn validate_config(config: &LogConsoleConfig) -> Result<()> {
    // 验证捕获级别
    config.capture.min_level.parse::<LogLevel>()?;

    if let Some(ref persistence) = config.persistence {
        if persistence.path.as_os_str().is_empty() {
            return Err(LogConsoleError::InvalidPath(
                "持久化文件路径不能为空".to_string(),
            ));
        }
        if persistence.path.file_name().is_none() {
            return Err(LogConsoleError::InvalidPath(format!(
                "持久化路径必须指向文件: {:?}",
                persistence.path
            )));
        }
    }

    Ok(())
}
