//! 日志存储
//!
//! `LogStore` 按追加顺序持有日志条目，并在每次变更之后通过广播器发布一次
//! 完整快照。存储可以廉价克隆，所有克隆共享同一份状态。

use crate::config::PersistenceFormat;
use crate::core::broadcaster::{Broadcaster, LogObserver, LogSnapshot, Subscription};
use crate::core::entry::{LogEntry, LogLevel};
use crate::diagnostics::diagnostics;
use crate::sinks::file_common::read_entries;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

struct StoreState {
    entries: Vec<LogEntry>,
    version: u64,
}

struct StoreInner {
    state: Mutex<StoreState>,
    broadcaster: Broadcaster,
}

/// 日志存储
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<StoreInner>,
}

impl LogStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::from_entries(Vec::new())
    }

    /// 使用已有条目创建存储，条目按给定顺序视为追加顺序
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        let version = u64::from(!entries.is_empty());
        let broadcaster = Broadcaster::new();
        if version > 0 {
            // 此时还没有观察者，只更新最新快照
            broadcaster.publish(LogSnapshot::new(entries.clone(), version));
        }

        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState { entries, version }),
                broadcaster,
            }),
        }
    }

    /// 从持久化文件播种
    ///
    /// 任何读取或解析失败都不会向外传播：存储将以空状态启动，
    /// 无法解析的行会被跳过。
    pub fn seeded_from(path: impl AsRef<Path>, format: PersistenceFormat) -> Self {
        let path = path.as_ref();
        match read_entries(path, format) {
            Ok(outcome) => {
                if outcome.skipped() > 0 {
                    tracing::warn!(
                        path = %path.display(),
                        skipped = outcome.skipped(),
                        "skipped malformed lines while seeding log store"
                    );
                }
                tracing::debug!(
                    path = %path.display(),
                    entries = outcome.entries.len(),
                    "seeded log store"
                );
                Self::from_entries(outcome.entries)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    category = e.category(),
                    "failed to seed log store"
                );
                Self::new()
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 追加条目
    ///
    /// 变更完成并释放锁之后，发布一次包含完整序列的快照。
    pub fn append(&self, entry: LogEntry) {
        let snapshot = {
            let mut state = self.state();
            state.entries.push(entry);
            state.version += 1;
            LogSnapshot::new(state.entries.clone(), state.version)
        };
        diagnostics().increment_entries_appended();
        self.inner.broadcaster.publish(snapshot);
    }

    /// 以当前时间记录一条消息
    pub fn log<M>(&self, message: M, level: LogLevel)
    where
        M: fmt::Display + Send + Sync + 'static,
    {
        self.append(LogEntry::with_level(message, level));
    }

    /// 清空所有条目，并发布一个空快照
    pub fn clear(&self) {
        let snapshot = {
            let mut state = self.state();
            state.entries.clear();
            state.version += 1;
            LogSnapshot::new(Vec::new(), state.version)
        };
        diagnostics().increment_stores_cleared();
        self.inner.broadcaster.publish(snapshot);
    }

    /// 当前条目的副本，按追加顺序排列
    pub fn entries(&self) -> Vec<LogEntry> {
        self.state().entries.clone()
    }

    /// 当前状态的不可变快照
    pub fn snapshot(&self) -> LogSnapshot {
        let state = self.state();
        LogSnapshot::new(state.entries.clone(), state.version)
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// 注册观察者，从下一次变更开始接收快照
    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where
        O: LogObserver,
    {
        self.inner.broadcaster.subscribe(observer)
    }

    /// 合并式异步订阅
    pub fn watch(&self) -> watch::Receiver<LogSnapshot> {
        self.inner.broadcaster.watch()
    }

    /// 与该存储一一对应的广播器
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.inner.broadcaster
    }

    /// 两个句柄是否指向同一存储
    pub fn ptr_eq(&self, other: &LogStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("LogStore")
            .field("len", &state.entries.len())
            .field("version", &state.version)
            .finish()
    }
}
