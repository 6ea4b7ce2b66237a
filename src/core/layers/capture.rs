//! 捕获层
//!
//! 把 tracing 事件转换为日志条目，写入当前捕获作用域的存储；不在作用域中时
//! 写入可选的后备存储。此 crate 自身发出的事件会被忽略，避免在持久化失败等
//! 场景中形成回路。

use crate::core::entry::{LogEntry, LogLevel};
use crate::core::store::LogStore;
use crate::intercept;
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::Event;
use tracing_subscriber::layer::{Context, Layer};

/// 此 crate 自身事件使用的 target 前缀
const INTERNAL_TARGET: &str = "log_console";

/// 捕获层
#[derive(Clone, Debug)]
pub struct CaptureLayer {
    /// 没有捕获作用域时使用的存储
    fallback: Option<LogStore>,
    /// 最低捕获级别
    min_level: LogLevel,
}

impl CaptureLayer {
    /// 只在捕获作用域内记录的捕获层
    pub fn new() -> Self {
        Self {
            fallback: None,
            min_level: LogLevel::Debug,
        }
    }

    /// 不在捕获作用域内时写入 `store` 的捕获层
    pub fn with_fallback(store: LogStore) -> Self {
        Self {
            fallback: Some(store),
            min_level: LogLevel::Debug,
        }
    }

    /// 设置最低捕获级别
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    fn target_store(&self) -> Option<LogStore> {
        intercept::current_target().or_else(|| self.fallback.clone())
    }
}

impl Default for CaptureLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// target 是否属于此 crate
pub(crate) fn is_internal_target(target: &str) -> bool {
    target == INTERNAL_TARGET
        || target
            .strip_prefix(INTERNAL_TARGET)
            .is_some_and(|rest| rest.starts_with("::"))
}

impl<S> Layer<S> for CaptureLayer
where
    S: tracing::Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal_target(metadata.target()) {
            return;
        }

        let level = LogLevel::from_tracing(metadata.level());
        if level < self.min_level {
            return;
        }

        let Some(store) = self.target_store() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        store.append(LogEntry::with_level(visitor.finish(), level));
    }
}

/// 提取消息字段，其余字段以 `key=value` 形式附加在消息之后
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.message.is_empty() {
            self.fields
        } else if self.fields.is_empty() {
            self.message
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }
}
