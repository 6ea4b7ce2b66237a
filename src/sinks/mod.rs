//! 持久化 Sinks 模块
//!
//! 提供把日志存储写入单一文件的 sink，以及持久化文件的读写与解析。

pub mod file;
pub mod file_common;

// 重新导出主要类型
pub use file::FileSink;
pub use file_common::{read_entries, write_entries, ReadOutcome};
