//! 持久化文件 Sink
//!
//! 此模块实现把存储的快照写入单一文件的 sink。写入在后台任务中进行，
//! 追加日志的调用永远不会等待 I/O；连续的多次变更会被合并为一次写入。

use crate::config::PersistenceConfig;
use crate::core::broadcaster::LogSnapshot;
use crate::core::store::LogStore;
use crate::diagnostics::diagnostics;
use crate::error::{LogConsoleError, Result};
use crate::sinks::file_common::write_entries;
use std::path::Path;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// 持久化文件 Sink
pub struct FileSink {
    /// 配置
    config: PersistenceConfig,
    /// 关闭信号发送器
    shutdown_tx: Option<oneshot::Sender<oneshot::Sender<Result<()>>>>,
    /// 处理器句柄
    processor_handle: Option<JoinHandle<()>>,
}

/// 后台写入处理器
struct FileSinkProcessor {
    /// 配置
    config: PersistenceConfig,
    /// 快照接收器
    receiver: watch::Receiver<LogSnapshot>,
    /// 关闭信号接收器
    shutdown_rx: oneshot::Receiver<oneshot::Sender<Result<()>>>,
}

impl FileSink {
    /// 创建新的文件 sink
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            processor_handle: None,
        }
    }

    /// 启动 sink，开始跟随存储的变更
    ///
    /// 必须在 tokio 运行时中调用。
    pub async fn start(&mut self, store: &LogStore) -> Result<()> {
        if self.shutdown_tx.is_some() {
            return Err(LogConsoleError::sink("file sink already started"));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            LogConsoleError::InitializationError(format!("FileSink requires a tokio runtime: {}", e))
        })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let processor = FileSinkProcessor {
            config: self.config.clone(),
            receiver: store.watch(),
            shutdown_rx,
        };
        let handle = runtime.spawn(processor.run());

        tracing::debug!(path = %self.config.path.display(), "file sink started");
        self.shutdown_tx = Some(shutdown_tx);
        self.processor_handle = Some(handle);
        Ok(())
    }

    /// 关闭 sink
    ///
    /// 尚未写入的最新快照会在退出前写入。
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(sender) = self.shutdown_tx.take() {
            let (tx, rx) = oneshot::channel();

            if sender.send(tx).is_err() {
                return Err(LogConsoleError::sink("Failed to send shutdown signal"));
            }

            match rx.await {
                Ok(result) => result?,
                Err(_) => return Err(LogConsoleError::sink("Shutdown signal lost")),
            }
        }

        // 等待处理器完成
        if let Some(handle) = self.processor_handle.take() {
            if let Err(e) = handle.await {
                return Err(LogConsoleError::shutdown(format!(
                    "FileSink processor failed: {}",
                    e
                )));
            }
        }

        Ok(())
    }

    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// 获取配置
    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// 持久化文件路径
    pub fn path(&self) -> &Path {
        &self.config.path
    }
}

impl FileSinkProcessor {
    /// 运行处理器
    async fn run(mut self) {
        loop {
            tokio::select! {
                changed = self.receiver.changed() => {
                    if changed.is_err() {
                        // 存储已销毁
                        break;
                    }
                    let snapshot = self.receiver.borrow_and_update().clone();
                    self.persist(&snapshot).await;
                }
                reply = &mut self.shutdown_rx => {
                    if self.receiver.has_changed().unwrap_or(false) {
                        let snapshot = self.receiver.borrow_and_update().clone();
                        self.persist(&snapshot).await;
                    }
                    if let Ok(reply) = reply {
                        let _ = reply.send(Ok(()));
                    }
                    break;
                }
            }
        }
    }

    /// 写入一个快照
    ///
    /// 失败只记录诊断信息，不会中断捕获路径。此 crate 自身的事件不会被
    /// `CaptureLayer` 捕获，因此这里的告警不会回流到存储中。
    async fn persist(&self, snapshot: &LogSnapshot) {
        if let Err(e) = write_entries(&self.config.path, snapshot, self.config.format).await {
            diagnostics().increment_persistence_failures();
            tracing::warn!(
                path = %self.config.path.display(),
                error = %e,
                category = e.category(),
                recoverable = e.is_recoverable(),
                "failed to persist log snapshot"
            );
        }
    }
}
