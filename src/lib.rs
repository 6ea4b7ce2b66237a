//! log_console - 应用内日志控制台核心
//!
//! 在应用内部收集日志：print 输出、panic、返回的错误以及 tracing 事件都会
//! 成为 [`LogEntry`]，按追加顺序保存在可观察的 [`LogStore`] 中。观察者以
//! 完整快照的形式接收每次变更，可以独立地暂停、恢复和取消。可选的持久化
//! 把最新状态写入单一文件，并在下次启动时读回。
//!
//! # 快速开始
//!
//! ```rust
//! use log_console::{console_println, intercept, LogLevel, LogStore, LogViewModel};
//!
//! let store = LogStore::new();
//! let view = LogViewModel::attach(&store, "");
//!
//! store.log("hello", LogLevel::Info);
//! intercept::capture(&store, || console_println!("from a print"));
//!
//! let lines = view.render_lines();
//! assert_eq!(lines.len(), 2);
//! assert!(lines[0].ends_with(": from a print"));
//! ```
//!
//! # 接入 tracing
//!
//! ```rust
//! use log_console::{LogConsoleConfig, init_with_config, shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = LogConsoleConfig::default();
//!     config.capture.echo_to_console = false;
//!
//!     let store = init_with_config(config).await?;
//!     tracing::warn!(target: "app", "disk almost full");
//!     assert_eq!(store.len(), 1);
//!
//!     shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod diagnostics;
pub mod error;
pub mod intercept;
pub mod sinks;
pub mod utils;
pub mod view;

// 重新导出主要类型
pub use config::{
    load_config_from_file, load_config_from_str, CaptureConfig, LogConsoleConfig,
    PersistenceConfig, PersistenceFormat, ViewConfig,
};
pub use diagnostics::{get_diagnostics, DiagnosticsSnapshot};
pub use error::{LogConsoleError, Result};

// 重新导出核心功能
pub use crate::core::broadcaster::{Broadcaster, LogObserver, LogSnapshot, Subscription};
pub use crate::core::entry::{LogEntry, LogEntryBuilder, LogLevel, LogRecord};
pub use crate::core::layers::CaptureLayer;
pub use crate::core::store::LogStore;
pub use crate::core::subscriber::{LogConsole, LogConsoleBuilder};
pub use sinks::FileSink;
pub use view::{display_order, render_colored, LogFilter, LogViewModel};

use once_cell::sync::{Lazy, OnceCell};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 进程级默认存储
static DEFAULT_STORE: OnceCell<LogStore> = OnceCell::new();

/// 全局控制台实例
static GLOBAL_CONSOLE: Lazy<Mutex<Option<LogConsole>>> = Lazy::new(|| Mutex::new(None));

/// 初始化标记，确保全局控制台只初始化一次
static IS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// 进程级默认存储
///
/// 第一次访问时创建空存储。需要从持久化文件播种时，应在任何访问之前调用
/// [`init_default_store`]。
pub fn default_store() -> &'static LogStore {
    DEFAULT_STORE.get_or_init(LogStore::new)
}

/// 按配置创建进程级默认存储
///
/// 持久化启用且 `seed_on_startup` 为真时从文件播种。默认存储已经存在时
/// 返回错误。
pub fn init_default_store(config: &LogConsoleConfig) -> Result<&'static LogStore> {
    config::validate_config(config)?;
    let mut created = false;
    let store = DEFAULT_STORE.get_or_init(|| {
        created = true;
        crate::core::subscriber::store_for(config)
    });
    if created {
        Ok(store)
    } else {
        Err(LogConsoleError::InitializationError(
            "default log store already initialized".to_string(),
        ))
    }
}

/// 使用默认配置初始化全局控制台
///
/// 返回进程级默认存储。
pub async fn init() -> Result<&'static LogStore> {
    init_with_config(LogConsoleConfig::default()).await
}

/// 使用指定配置初始化全局控制台
///
/// 创建（或复用）进程级默认存储，启动持久化，并安装全局 tracing 订阅器。
/// 只能成功调用一次。
///
/// 已经存在全局 tracing 订阅器时，在创建默认存储之前返回错误。其他安装
/// 失败发生在默认存储创建之后：存储会保留（包括播种的条目），持久化 sink
/// 会被关闭。
pub async fn init_with_config(config: LogConsoleConfig) -> Result<&'static LogStore> {
    if IS_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(LogConsoleError::InitializationError(
            "log console already initialized".to_string(),
        ));
    }

    match install(config).await {
        Ok(store) => Ok(store),
        Err(e) => {
            IS_INITIALIZED.store(false, Ordering::SeqCst);
            Err(e)
        }
    }
}

async fn install(config: LogConsoleConfig) -> Result<&'static LogStore> {
    config::validate_config(&config)?;
    if tracing::dispatcher::has_been_set() {
        return Err(LogConsoleError::tracing(
            "a global tracing subscriber is already installed",
        ));
    }
    let store = DEFAULT_STORE.get_or_init(|| crate::core::subscriber::store_for(&config));

    let mut console = LogConsole::builder()
        .config(config)
        .store(store.clone())
        .build()?;
    console.initialize().await?;
    if let Err(e) = console.install_global() {
        let _ = console.shutdown().await;
        return Err(e);
    }

    if let Ok(mut global) = GLOBAL_CONSOLE.lock() {
        *global = Some(console);
    }
    Ok(store)
}

/// 优雅关闭全局控制台
///
/// 等待持久化写出最新状态。全局 tracing 订阅器无法卸载，捕获会继续进行。
pub async fn shutdown() -> Result<()> {
    let console = match GLOBAL_CONSOLE.lock() {
        Ok(mut global) => global.take(),
        Err(_) => None,
    };

    if let Some(console) = console {
        console.shutdown().await?;
    }
    Ok(())
}

/// 全局控制台是否已初始化
pub fn is_initialized() -> bool {
    IS_INITIALIZED.load(Ordering::SeqCst)
}

/// 全局控制台使用的配置
pub fn get_config() -> Option<LogConsoleConfig> {
    GLOBAL_CONSOLE
        .lock()
        .ok()
        .and_then(|global| global.as_ref().map(|console| console.config().clone()))
}
