//! 日志条目定义
//!
//! 此模块定义了日志控制台中使用的核心记录结构 `LogEntry` 以及日志级别 `LogLevel`。
//! 条目一经构建即不可变，克隆只增加引用计数。

use crate::error::LogConsoleError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// 日志级别
///
/// 级别只影响展示时的强调方式，不影响存储和分发顺序。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Normal,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    /// 所有级别，按从低到高排列
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Normal,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    /// 级别的小写名称
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Normal => "normal",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }

    /// 将 tracing 级别映射为控制台级别
    pub fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE | tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LogConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" | "trace" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "normal" => Ok(LogLevel::Normal),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            _ => Err(LogConsoleError::InvalidLogLevel(s.to_string())),
        }
    }
}

/// 日志消息
///
/// 任意可显示的值都可以作为消息，第一次需要文本时才进行字符串化并缓存结果。
enum Message {
    /// 已经是文本的消息（例如从持久化文件中读回的条目）
    Text(String),
    /// 延迟字符串化的值
    Value {
        value: Box<dyn fmt::Display + Send + Sync>,
        type_name: &'static str,
        rendered: OnceLock<String>,
    },
}

impl Message {
    fn text(&self) -> &str {
        match self {
            Message::Text(text) => text,
            Message::Value {
                value,
                type_name,
                rendered,
            } => rendered.get_or_init(|| display_text(value.as_ref(), type_name)),
        }
    }
}

/// 字符串化一个值，失败时返回确定性的占位符
pub(crate) fn display_text<T>(value: &T, type_name: &str) -> String
where
    T: fmt::Display + ?Sized,
{
    let attempt = crate::intercept::quietly(|| {
        panic::catch_unwind(AssertUnwindSafe(|| {
            let mut out = String::new();
            write!(out, "{}", value).map(|_| out)
        }))
    });

    match attempt {
        Ok(Ok(text)) => text,
        _ => unprintable(type_name),
    }
}

/// 无法字符串化的消息的占位符
pub(crate) fn unprintable(type_name: &str) -> String {
    format!("<unprintable {}>", type_name)
}

struct EntryInner {
    message: Message,
    level: LogLevel,
    timestamp: DateTime<Utc>,
    stack_trace: Option<String>,
}

/// 日志条目
///
/// 一条不可变的日志记录：消息、级别、时间戳以及可选的调用栈。
#[derive(Clone)]
pub struct LogEntry {
    inner: Arc<EntryInner>,
}

impl LogEntry {
    /// 以默认级别 `normal` 和当前时间创建条目
    pub fn new<M>(message: M) -> Self
    where
        M: fmt::Display + Send + Sync + 'static,
    {
        Self::builder(message).build()
    }

    /// 以指定级别和当前时间创建条目
    pub fn with_level<M>(message: M, level: LogLevel) -> Self
    where
        M: fmt::Display + Send + Sync + 'static,
    {
        Self::builder(message).level(level).build()
    }

    /// 创建条目构建器
    pub fn builder<M>(message: M) -> LogEntryBuilder
    where
        M: fmt::Display + Send + Sync + 'static,
    {
        LogEntryBuilder {
            message: Message::Value {
                value: Box::new(message),
                type_name: std::any::type_name::<M>(),
                rendered: OnceLock::new(),
            },
            level: LogLevel::default(),
            timestamp: None,
            stack_trace: None,
        }
    }

    /// 从已有文本创建条目，所有字段均由调用者提供
    pub fn from_parts(
        level: LogLevel,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
        stack_trace: Option<String>,
    ) -> Self {
        LogEntryBuilder {
            message: Message::Text(message.into()),
            level,
            timestamp: Some(timestamp),
            stack_trace,
        }
        .build()
    }

    /// 日志级别
    pub fn level(&self) -> LogLevel {
        self.inner.level
    }

    /// 时间戳
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.inner.timestamp
    }

    /// 调用栈（如果有）
    pub fn stack_trace(&self) -> Option<&str> {
        self.inner.stack_trace.as_deref()
    }

    /// 消息文本，首次调用时完成字符串化
    pub fn message_text(&self) -> &str {
        self.inner.message.text()
    }

    /// 格式化的时间戳（RFC 3339，UTC，微秒精度）
    pub fn formatted_timestamp(&self) -> String {
        self.inner
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// 条目的首行：`[<level>] <timestamp>: <message>`
    pub fn header(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.inner.level,
            self.formatted_timestamp(),
            self.message_text()
        )
    }

    /// 完整文本表示，调用栈（如果有）跟在后续行中
    pub fn render(&self) -> String {
        let mut out = self.header();
        if let Some(stack) = self.stack_trace() {
            out.push('\n');
            out.push_str(stack);
        }
        out
    }

    /// 转换为可序列化的记录
    pub fn to_record(&self) -> LogRecord {
        LogRecord {
            timestamp: self.inner.timestamp,
            level: self.inner.level,
            message: self.message_text().to_string(),
            stack_trace: self.inner.stack_trace.clone(),
        }
    }

    /// 获取条目的 JSON 表示
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_record())
    }

    /// 两个句柄是否指向同一条目
    pub fn ptr_eq(&self, other: &LogEntry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEntry")
            .field("level", &self.inner.level)
            .field("timestamp", &self.inner.timestamp)
            .field("message", &self.message_text())
            .field("stack_trace", &self.inner.stack_trace.is_some())
            .finish()
    }
}

impl From<LogRecord> for LogEntry {
    fn from(record: LogRecord) -> Self {
        LogEntry::from_parts(
            record.level,
            record.timestamp,
            record.message,
            record.stack_trace,
        )
    }
}

/// 条目构建器
pub struct LogEntryBuilder {
    message: Message,
    level: LogLevel,
    timestamp: Option<DateTime<Utc>>,
    stack_trace: Option<String>,
}

impl LogEntryBuilder {
    /// 设置日志级别
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// 设置时间戳，不设置时使用构建时的当前时间
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// 附加调用栈
    pub fn stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// 构建不可变条目
    pub fn build(self) -> LogEntry {
        let stack_trace = self.stack_trace.as_deref().and_then(normalize_stack_trace);

        LogEntry {
            inner: Arc::new(EntryInner {
                message: self.message,
                level: self.level,
                timestamp: self.timestamp.unwrap_or_else(Utc::now),
                stack_trace,
            }),
        }
    }
}

/// 去除调用栈尾部的空白行
///
/// 持久化文本中尾部空白行无法与条目之间的分隔区分，因此构建时统一去除。
/// 全部为空白时返回 `None`。
fn normalize_stack_trace(stack: &str) -> Option<String> {
    let mut lines: Vec<&str> = stack.lines().collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// 可序列化的日志记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// 时间戳
    pub timestamp: DateTime<Utc>,
    /// 日志级别
    pub level: LogLevel,
    /// 消息文本
    pub message: String,
    /// 调用栈
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}
