//! 快照广播器
//!
//! 将存储的每一次变更以完整快照的形式扇出给任意数量的观察者。每个观察者
//! 都可以独立地暂停、恢复和取消；暂停期间的变更不会缓存重放，恢复时只投递
//! 当时最新的快照。

use crate::core::entry::LogEntry;
use crate::diagnostics::diagnostics;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::watch;

/// 日志集合在某一时刻的不可变视图
///
/// 克隆只增加引用计数。`version` 随存储的每次变更单调递增。
#[derive(Clone)]
pub struct LogSnapshot {
    entries: Arc<[LogEntry]>,
    version: u64,
}

impl LogSnapshot {
    /// 空快照（版本 0）
    pub fn empty() -> Self {
        Self {
            entries: Arc::from(Vec::new()),
            version: 0,
        }
    }

    pub(crate) fn new(entries: Vec<LogEntry>, version: u64) -> Self {
        Self {
            entries: Arc::from(entries),
            version,
        }
    }

    /// 快照版本
    pub fn version(&self) -> u64 {
        self.version
    }

    /// 以追加顺序排列的条目
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// 复制出一份独立的条目列表
    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.to_vec()
    }
}

impl Deref for LogSnapshot {
    type Target = [LogEntry];

    fn deref(&self) -> &Self::Target {
        &self.entries
    }
}

impl fmt::Debug for LogSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSnapshot")
            .field("version", &self.version)
            .field("len", &self.entries.len())
            .finish()
    }
}

/// 快照观察者
///
/// 回调在执行变更的线程上同步调用，调用时不持有存储的任何锁，
/// 因此观察者内部可以再次访问存储。
pub trait LogObserver: Send + Sync + 'static {
    /// 接收一个新的快照
    fn on_snapshot(&self, snapshot: &LogSnapshot);
}

impl<F> LogObserver for F
where
    F: Fn(&LogSnapshot) + Send + Sync + 'static,
{
    fn on_snapshot(&self, snapshot: &LogSnapshot) {
        self(snapshot)
    }
}

/// 已注册的观察者及其状态
struct ObserverSlot {
    id: u64,
    observer: Box<dyn LogObserver>,
    paused: AtomicBool,
    /// 暂停期间是否错过了变更
    missed: AtomicBool,
    cancelled: AtomicBool,
    /// 已投递的最高版本
    delivered: AtomicU64,
}

impl ObserverSlot {
    fn offer(&self, snapshot: &LogSnapshot) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        if self.paused.load(Ordering::SeqCst) {
            self.missed.store(true, Ordering::SeqCst);
            // resume 可能在两次读取之间发生
            if self.paused.load(Ordering::SeqCst) {
                diagnostics().increment_notifications_coalesced();
                return;
            }
            self.missed.store(false, Ordering::SeqCst);
        }
        self.deliver(snapshot);
    }

    fn deliver(&self, snapshot: &LogSnapshot) {
        // 观察者永远不会在看到较新的快照之后再收到较旧的快照
        if self.delivered.fetch_max(snapshot.version, Ordering::SeqCst) >= snapshot.version {
            return;
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        self.observer.on_snapshot(snapshot);
        diagnostics().increment_notifications_delivered();
    }
}

struct BroadcasterInner {
    observers: Mutex<Vec<Arc<ObserverSlot>>>,
    latest: Mutex<LogSnapshot>,
    watch_tx: watch::Sender<LogSnapshot>,
    next_id: AtomicU64,
}

impl BroadcasterInner {
    fn latest(&self) -> LogSnapshot {
        match self.latest.lock() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn remove(&self, id: u64) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|slot| slot.id != id);
        }
    }
}

/// 广播器
///
/// 与一个 `LogStore` 一一对应，克隆后共享同一组观察者。
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Broadcaster {
    /// 创建新的广播器，初始快照为空
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(LogSnapshot::empty());
        Self {
            inner: Arc::new(BroadcasterInner {
                observers: Mutex::new(Vec::new()),
                latest: Mutex::new(LogSnapshot::empty()),
                watch_tx,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// 注册观察者
    ///
    /// 观察者从下一次变更开始接收快照。
    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where
        O: LogObserver,
    {
        let slot = Arc::new(ObserverSlot {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            observer: Box::new(observer),
            paused: AtomicBool::new(false),
            missed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            delivered: AtomicU64::new(self.inner.latest().version),
        });

        if let Ok(mut observers) = self.inner.observers.lock() {
            observers.push(slot.clone());
        }
        tracing::trace!(observer = slot.id, "observer subscribed");

        Subscription {
            slot,
            broadcaster: Arc::downgrade(&self.inner),
        }
    }

    /// 订阅一个合并式的异步通道，始终持有最新快照
    pub fn watch(&self) -> watch::Receiver<LogSnapshot> {
        self.inner.watch_tx.subscribe()
    }

    /// 当前已注册的观察者数量
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .lock()
            .map(|observers| observers.len())
            .unwrap_or(0)
    }

    /// 最近一次发布的快照
    pub fn latest(&self) -> LogSnapshot {
        self.inner.latest()
    }

    /// 发布新快照
    ///
    /// 调用方必须已经释放了产生该快照的锁。
    pub(crate) fn publish(&self, snapshot: LogSnapshot) {
        {
            let mut latest = match self.inner.latest.lock() {
                Ok(latest) => latest,
                Err(poisoned) => poisoned.into_inner(),
            };
            if snapshot.version > latest.version {
                *latest = snapshot.clone();
            }
        }

        self.inner.watch_tx.send_if_modified(|current| {
            if snapshot.version > current.version {
                *current = snapshot.clone();
                true
            } else {
                false
            }
        });

        let observers: Vec<Arc<ObserverSlot>> = match self.inner.observers.lock() {
            Ok(observers) => observers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for slot in observers {
            slot.offer(&snapshot);
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("observers", &self.observer_count())
            .field("version", &self.inner.latest().version)
            .finish()
    }
}

/// 订阅句柄
///
/// 丢弃句柄等同于取消订阅。
pub struct Subscription {
    slot: Arc<ObserverSlot>,
    broadcaster: Weak<BroadcasterInner>,
}

impl Subscription {
    /// 暂停投递，存储继续接受写入
    pub fn pause(&self) {
        self.slot.paused.store(true, Ordering::SeqCst);
    }

    /// 恢复投递
    ///
    /// 如果暂停期间发生过变更，立即投递恢复时刻的最新快照，且只投递一次。
    pub fn resume(&self) {
        if !self.slot.paused.swap(false, Ordering::SeqCst) {
            return;
        }
        if !self.slot.missed.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.broadcaster.upgrade() {
            let latest = inner.latest();
            self.slot.deliver(&latest);
        }
    }

    /// 是否处于暂停状态
    pub fn is_paused(&self) -> bool {
        self.slot.paused.load(Ordering::SeqCst)
    }

    /// 永久取消订阅，重复调用无副作用
    pub fn cancel(&self) {
        if self.slot.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.broadcaster.upgrade() {
            inner.remove(self.slot.id);
        }
        tracing::trace!(observer = self.slot.id, "observer cancelled");
    }

    /// 是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.slot.cancelled.load(Ordering::SeqCst)
    }

    /// 广播器当前持有的最新快照，广播器已销毁时返回 `None`
    pub fn current(&self) -> Option<LogSnapshot> {
        self.broadcaster.upgrade().map(|inner| inner.latest())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.slot.id)
            .field("paused", &self.is_paused())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
