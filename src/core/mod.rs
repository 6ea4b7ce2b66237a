//! 日志控制台核心模块
//!
//! 本模块包含条目定义、存储、快照广播器、订阅器和 tracing 处理层。

pub mod broadcaster;
pub mod entry;
pub mod layers;
pub mod store;
pub mod subscriber;

// 重新导出核心类型
pub use broadcaster::{Broadcaster, LogObserver, LogSnapshot, Subscription};
pub use entry::{LogEntry, LogEntryBuilder, LogLevel, LogRecord};
pub use store::LogStore;
pub use subscriber::{LogConsole, LogConsoleBuilder};

// 重新导出层类型
pub use layers::capture::CaptureLayer;
