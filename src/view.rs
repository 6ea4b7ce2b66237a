//! 展示层
//!
//! 过滤、排序与着色都只作用于展示，不会修改存储。`LogViewModel` 把这些
//! 组合起来：跟随存储的快照，保持一个最新优先且经过过滤的可见列表。

use crate::config::ViewConfig;
use crate::core::broadcaster::{LogSnapshot, Subscription};
use crate::core::entry::{LogEntry, LogLevel};
use crate::core::store::LogStore;
use colored::{ColoredString, Colorize};
use std::sync::{Arc, Mutex, MutexGuard};

/// 按展示顺序（最新在前）排列条目
///
/// 时间戳相同的条目中，后追加的排在前面。
pub fn display_order(entries: &[LogEntry]) -> Vec<LogEntry> {
    let mut ordered = entries.to_vec();
    ordered.sort_by_key(|entry| entry.timestamp());
    ordered.reverse();
    ordered
}

/// 展示过滤器
///
/// 过滤文本按逗号拆分为若干关键字（去除首尾空白、转为小写、忽略空关键字），
/// 条目的小写消息包含任意一个关键字即可见。没有关键字时全部可见。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    tokens: Vec<String>,
}

impl LogFilter {
    /// 解析过滤文本
    pub fn parse(text: &str) -> Self {
        let tokens = text
            .split(',')
            .map(|token| token.trim().to_lowercase())
            .filter(|token| !token.is_empty())
            .collect();
        Self { tokens }
    }

    /// 过滤关键字
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// 是否没有任何关键字
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 条目是否可见
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.tokens.is_empty() {
            return true;
        }
        let message = entry.message_text().to_lowercase();
        self.tokens.iter().any(|token| message.contains(token.as_str()))
    }

    /// 保留可见条目，顺序不变
    pub fn apply(&self, entries: &[LogEntry]) -> Vec<LogEntry> {
        entries
            .iter()
            .filter(|entry| self.matches(entry))
            .cloned()
            .collect()
    }
}

fn paint_level(text: String, level: LogLevel) -> ColoredString {
    match level {
        LogLevel::Debug => text.dimmed(),
        LogLevel::Info => text.blue(),
        LogLevel::Normal => text.normal(),
        LogLevel::Warning => text.yellow(),
        LogLevel::Error => text.red(),
        LogLevel::Fatal => text.red().bold(),
    }
}

/// 带终端颜色的条目文本
///
/// 首行按级别着色，调用栈行变暗。
pub fn render_colored(entry: &LogEntry) -> String {
    let mut out = paint_level(entry.header(), entry.level()).to_string();
    if let Some(stack) = entry.stack_trace() {
        for line in stack.lines() {
            out.push('\n');
            out.push_str(&line.dimmed().to_string());
        }
    }
    out
}

#[derive(Debug)]
struct ViewState {
    filter: LogFilter,
    latest: LogSnapshot,
    visible: Vec<LogEntry>,
}

impl ViewState {
    fn refresh(&mut self) {
        self.visible = self.filter.apply(&display_order(&self.latest));
    }
}

fn lock(state: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 日志视图模型
///
/// 订阅一个存储并维护过滤后的可见列表。暂停期间可见列表保持不变，
/// 恢复时一次性追上最新快照。丢弃视图模型即取消订阅。
pub struct LogViewModel {
    store: LogStore,
    state: Arc<Mutex<ViewState>>,
    subscription: Subscription,
    colored: bool,
}

impl LogViewModel {
    /// 附加到存储，输出不着色
    pub fn attach(store: &LogStore, filter: &str) -> Self {
        let mut initial = ViewState {
            filter: LogFilter::parse(filter),
            latest: store.snapshot(),
            visible: Vec::new(),
        };
        initial.refresh();

        let state = Arc::new(Mutex::new(initial));
        let observer_state = Arc::clone(&state);
        let subscription = store.subscribe(move |snapshot: &LogSnapshot| {
            let mut state = lock(&observer_state);
            // 只接受更新的快照
            if snapshot.version() >= state.latest.version() {
                state.latest = snapshot.clone();
                state.refresh();
            }
        });

        Self {
            store: store.clone(),
            state,
            subscription,
            colored: false,
        }
    }

    /// 按视图配置附加到存储
    pub fn from_config(store: &LogStore, config: &ViewConfig) -> Self {
        Self::attach(store, &config.filter).colored(config.colored)
    }

    /// 设置 [`render_lines`](Self::render_lines) 是否着色
    pub fn colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// 是否着色输出
    pub fn is_colored(&self) -> bool {
        self.colored
    }

    /// 替换过滤文本
    pub fn set_filter(&self, filter: &str) {
        let mut state = lock(&self.state);
        state.filter = LogFilter::parse(filter);
        state.refresh();
    }

    /// 当前过滤器
    pub fn filter(&self) -> LogFilter {
        lock(&self.state).filter.clone()
    }

    /// 暂停跟随存储
    pub fn pause(&self) {
        self.subscription.pause();
    }

    /// 恢复跟随存储
    pub fn resume(&self) {
        self.subscription.resume();
    }

    /// 是否已暂停
    pub fn is_paused(&self) -> bool {
        self.subscription.is_paused()
    }

    /// 清空底层存储
    pub fn clear(&self) {
        self.store.clear();
    }

    /// 可见条目，最新在前
    pub fn visible(&self) -> Vec<LogEntry> {
        lock(&self.state).visible.clone()
    }

    /// 可见条目的文本行，按视图的着色设置渲染
    pub fn render_lines(&self) -> Vec<String> {
        lock(&self.state)
            .visible
            .iter()
            .map(|entry| {
                if self.colored {
                    render_colored(entry)
                } else {
                    entry.render()
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for LogViewModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("LogViewModel")
            .field("filter", &state.filter)
            .field("visible", &state.visible.len())
            .field("paused", &self.subscription.is_paused())
            .field("colored", &self.colored)
            .finish()
    }
}
