//! 处理层模块
//!
//! 此模块包含把 tracing 事件接入日志控制台的处理层。

pub mod capture;

pub use capture::CaptureLayer;
