//! 定义日志控制台的内部诊断与指标。
//!
//! 此模块提供了对捕获、分发和持久化路径的可观测性。计数器只增不减，
//! 采集失败从不影响日志路径本身。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// 内部诊断与指标数据结构。
///
/// 使用原子操作确保线程安全。
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// 创建时间
    start_time: Option<Instant>,

    /// 追加到任意存储中的条目数
    entries_appended: AtomicU64,

    /// 清空存储的次数
    stores_cleared: AtomicU64,

    /// 实际送达观察者的快照数
    notifications_delivered: AtomicU64,

    /// 观察者暂停期间被合并的快照数
    notifications_coalesced: AtomicU64,

    /// 捕获到的 print 行数
    prints_captured: AtomicU64,

    /// 捕获到的 panic 数
    panics_captured: AtomicU64,

    /// 持久化文件写入次数（包括删除空文件）
    persistence_writes: AtomicU64,

    /// 持久化失败次数
    persistence_failures: AtomicU64,

    /// 读取持久化文件时跳过的行数
    seed_lines_skipped: AtomicU64,
}

/// 诊断数据的快照，用于外部查询。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagnosticsSnapshot {
    /// 运行时间
    pub uptime: Option<Duration>,
    pub entries_appended: u64,
    pub stores_cleared: u64,
    pub notifications_delivered: u64,
    pub notifications_coalesced: u64,
    pub prints_captured: u64,
    pub panics_captured: u64,
    pub persistence_writes: u64,
    pub persistence_failures: u64,
    pub seed_lines_skipped: u64,
}

impl Diagnostics {
    /// 创建新的诊断实例。
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn increment_entries_appended(&self) {
        self.entries_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stores_cleared(&self) {
        self.stores_cleared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_notifications_delivered(&self) {
        self.notifications_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_notifications_coalesced(&self) {
        self.notifications_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_prints_captured(&self) {
        self.prints_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_panics_captured(&self) {
        self.panics_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_persistence_writes(&self) {
        self.persistence_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_persistence_failures(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 批量增加跳过的行数。
    pub fn add_seed_lines_skipped(&self, count: u64) {
        self.seed_lines_skipped.fetch_add(count, Ordering::Relaxed);
    }

    /// 获取诊断数据的快照。
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            uptime: self.start_time.map(|start| start.elapsed()),
            entries_appended: self.entries_appended.load(Ordering::Relaxed),
            stores_cleared: self.stores_cleared.load(Ordering::Relaxed),
            notifications_delivered: self.notifications_delivered.load(Ordering::Relaxed),
            notifications_coalesced: self.notifications_coalesced.load(Ordering::Relaxed),
            prints_captured: self.prints_captured.load(Ordering::Relaxed),
            panics_captured: self.panics_captured.load(Ordering::Relaxed),
            persistence_writes: self.persistence_writes.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            seed_lines_skipped: self.seed_lines_skipped.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器（主要用于测试）。
    pub fn reset(&self) {
        for counter in [
            &self.entries_appended,
            &self.stores_cleared,
            &self.notifications_delivered,
            &self.notifications_coalesced,
            &self.prints_captured,
            &self.panics_captured,
            &self.persistence_writes,
            &self.persistence_failures,
            &self.seed_lines_skipped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 全局诊断实例。
static GLOBAL_DIAGNOSTICS: OnceLock<Diagnostics> = OnceLock::new();

/// 获取全局诊断实例，首次调用时创建。
pub fn diagnostics() -> &'static Diagnostics {
    GLOBAL_DIAGNOSTICS.get_or_init(Diagnostics::new)
}

/// 获取诊断数据快照
///
/// # 示例
///
/// ```rust
/// use log_console::{get_diagnostics, LogStore};
///
/// let store = LogStore::new();
/// store.log("hello", Default::default());
///
/// let diagnostics = get_diagnostics();
/// assert!(diagnostics.entries_appended >= 1);
/// ```
pub fn get_diagnostics() -> DiagnosticsSnapshot {
    diagnostics().snapshot()
}
