//! 日志控制台订阅器
//!
//! `LogConsole` 把配置、存储、持久化 sink 与 tracing 处理层组合在一起：
//! - 按配置从持久化文件播种存储
//! - 启动跟随存储变更的文件 sink
//! - 安装 panic 钩子
//! - 安装包含捕获层（以及可选控制台回显层）的全局订阅器

use crate::config::{validate_config, LogConsoleConfig};
use crate::core::entry::LogLevel;
use crate::core::layers::capture::CaptureLayer;
use crate::core::store::LogStore;
use crate::error::{LogConsoleError, Result};
use crate::intercept;
use crate::sinks::file::FileSink;
use crate::view::LogViewModel;
use std::sync::Arc;
use tracing_subscriber::{
    filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry,
};

/// 日志控制台
pub struct LogConsole {
    /// 配置
    config: Arc<LogConsoleConfig>,
    /// 日志存储
    store: LogStore,
    /// 最低捕获级别
    capture_level: LogLevel,
    /// 持久化 sink
    file_sink: Option<FileSink>,
    /// 是否已初始化
    initialized: bool,
}

/// 日志控制台构建器
pub struct LogConsoleBuilder {
    config: LogConsoleConfig,
    store: Option<LogStore>,
}

impl LogConsole {
    /// 创建新的构建器
    pub fn builder() -> LogConsoleBuilder {
        LogConsoleBuilder {
            config: LogConsoleConfig::default(),
            store: None,
        }
    }

    /// 使用默认配置创建
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// 使用指定配置创建
    pub fn with_config(config: LogConsoleConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// 初始化
    ///
    /// 安装 panic 钩子（如果配置启用），并在持久化启用时启动文件 sink。
    /// 持久化需要 tokio 运行时。重复调用无副作用。
    pub async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        if self.config.capture.capture_panics {
            intercept::install_panic_hook();
        }

        if let Some(persistence) = self.config.active_persistence() {
            let mut sink = FileSink::new(persistence.clone());
            sink.start(&self.store).await?;
            self.file_sink = Some(sink);
        }

        self.initialized = true;
        tracing::debug!(
            persistence = self.file_sink.is_some(),
            entries = self.store.len(),
            "log console initialized"
        );
        Ok(())
    }

    /// 把 tracing 事件写入此控制台存储的捕获层
    pub fn capture_layer(&self) -> CaptureLayer {
        CaptureLayer::with_fallback(self.store.clone()).min_level(self.capture_level)
    }

    /// 安装为全局默认订阅器
    ///
    /// 捕获启用时安装捕获层；回显启用时额外安装一个按 `RUST_LOG`
    /// （默认 `info`）过滤的控制台输出层。
    pub fn install_global(&self) -> Result<()> {
        let capture = self
            .config
            .capture
            .enabled
            .then(|| self.capture_layer());

        let echo = self.config.capture.echo_to_console.then(|| {
            let filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(filter)
        });

        Registry::default()
            .with(capture)
            .with(echo)
            .try_init()
            .map_err(|e| LogConsoleError::tracing(format!("全局订阅器安装失败: {}", e)))
    }

    /// 附加一个按视图配置过滤和着色的视图模型
    pub fn view(&self) -> LogViewModel {
        LogViewModel::from_config(&self.store, &self.config.view)
    }

    /// 日志存储
    pub fn store(&self) -> &LogStore {
        &self.store
    }

    /// 获取配置的引用
    pub fn config(&self) -> &LogConsoleConfig {
        &self.config
    }

    /// 检查是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 持久化是否正在运行
    pub fn is_persisting(&self) -> bool {
        self.file_sink.as_ref().is_some_and(FileSink::is_running)
    }

    /// 关闭
    ///
    /// 等待文件 sink 写出最新快照后退出。
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(sink) = self.file_sink.take() {
            sink.shutdown().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LogConsole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogConsole")
            .field("store", &self.store)
            .field("capture_level", &self.capture_level)
            .field("persisting", &self.is_persisting())
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl LogConsoleBuilder {
    /// 设置配置
    pub fn config(mut self, config: LogConsoleConfig) -> Self {
        self.config = config;
        self
    }

    /// 使用指定存储，而不是按配置新建
    pub fn store(mut self, store: LogStore) -> Self {
        self.store = Some(store);
        self
    }

    /// 构建
    ///
    /// 未指定存储时，如果持久化启用且要求播种，从持久化文件播种；
    /// 否则创建空存储。
    pub fn build(self) -> Result<LogConsole> {
        validate_config(&self.config)?;
        let capture_level = self.config.capture.min_level.parse::<LogLevel>()?;

        let store = match self.store {
            Some(store) => store,
            None => store_for(&self.config),
        };

        Ok(LogConsole {
            config: Arc::new(self.config),
            store,
            capture_level,
            file_sink: None,
            initialized: false,
        })
    }
}

/// 按配置创建存储
pub(crate) fn store_for(config: &LogConsoleConfig) -> LogStore {
    match config.active_persistence() {
        Some(persistence) if persistence.seed_on_startup => {
            LogStore::seeded_from(&persistence.path, persistence.format)
        }
        _ => LogStore::new(),
    }
}
