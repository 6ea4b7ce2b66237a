//! 日志控制台端到端测试
//!
//! 覆盖存储、订阅、拦截、持久化与展示层的组合行为。

use log_console::{
    config::{PersistenceConfig, PersistenceFormat},
    console_println, intercept, LogConsole, LogConsoleConfig, LogEntry, LogFilter, LogLevel,
    LogSnapshot, LogStore, LogViewModel,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn messages(entries: &[LogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.message_text().to_string())
        .collect()
}

fn persistent_config(dir: &TempDir) -> LogConsoleConfig {
    LogConsoleConfig {
        persistence: Some(PersistenceConfig {
            enabled: true,
            path: dir.path().join("logs").join("console.log"),
            format: PersistenceFormat::Text,
            seed_on_startup: true,
        }),
        ..Default::default()
    }
}

#[test]
fn test_observers_see_every_change_in_order() {
    let store = LogStore::new();
    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let _subscription = store.subscribe(move |snapshot: &LogSnapshot| {
        sink.lock().unwrap().push(messages(snapshot));
    });

    store.log("hello", LogLevel::Info);
    store.append(
        LogEntry::builder("boom")
            .level(LogLevel::Error)
            .stack_trace("S1\nS2")
            .build(),
    );
    store.clear();

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            vec!["hello".to_string()],
            vec!["hello".to_string(), "boom".to_string()],
            Vec::<String>::new(),
        ]
    );
}

#[test]
fn test_pause_resume_and_cancel() {
    let store = LogStore::new();
    let deliveries = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&deliveries);
    let subscription = store.subscribe(move |snapshot: &LogSnapshot| {
        sink.lock().unwrap().push(snapshot.len());
    });

    subscription.pause();
    store.log("a", LogLevel::Normal);
    store.log("b", LogLevel::Normal);
    assert!(deliveries.lock().unwrap().is_empty());

    // 恢复时只投递一次最新状态
    subscription.resume();
    assert_eq!(*deliveries.lock().unwrap(), vec![2]);

    // 没有错过任何变更时恢复不会投递
    subscription.pause();
    subscription.resume();
    assert_eq!(*deliveries.lock().unwrap(), vec![2]);

    subscription.cancel();
    subscription.cancel();
    store.log("c", LogLevel::Normal);
    assert_eq!(*deliveries.lock().unwrap(), vec![2]);
    assert_eq!(store.len(), 3);
}

#[test]
fn test_dropping_subscription_cancels_it() {
    let store = LogStore::new();
    let count = Arc::new(Mutex::new(0_usize));

    let sink = Arc::clone(&count);
    let subscription = store.subscribe(move |_: &LogSnapshot| {
        *sink.lock().unwrap() += 1;
    });
    store.log("one", LogLevel::Info);
    drop(subscription);
    store.log("two", LogLevel::Info);

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(store.broadcaster().observer_count(), 0);
}

#[test]
fn test_observer_may_read_store_during_delivery() {
    let store = LogStore::new();
    let lengths = Arc::new(Mutex::new(Vec::new()));

    let reader = store.clone();
    let sink = Arc::clone(&lengths);
    let _subscription = store.subscribe(move |snapshot: &LogSnapshot| {
        sink.lock().unwrap().push((snapshot.len(), reader.len()));
    });

    store.log("re-entrant", LogLevel::Info);
    assert_eq!(*lengths.lock().unwrap(), vec![(1, 1)]);
}

#[test]
fn test_capture_print_then_panic() {
    let store = LogStore::new();
    let view = LogViewModel::attach(&store, "");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        intercept::capture(&store, || {
            console_println!("x");
            panic!("failure after print");
        })
    }));
    assert!(result.is_err());

    let entries = store.entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].level(), LogLevel::Normal);
    assert_eq!(entries[0].message_text(), "x");
    assert_eq!(entries[1].level(), LogLevel::Error);
    assert_eq!(entries[1].message_text(), "failure after print");
    assert!(entries[1].stack_trace().is_some());

    // 展示顺序最新在前
    assert_eq!(
        messages(&view.visible()),
        vec!["failure after print", "x"]
    );
}

#[test]
fn test_unprintable_message_is_recorded() {
    struct Broken;

    impl std::fmt::Display for Broken {
        fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            Err(std::fmt::Error)
        }
    }

    let store = LogStore::new();
    store.log(Broken, LogLevel::Warning);

    let entries = store.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].message_text().starts_with("<unprintable "));
}

#[test]
fn test_filter_error_gamma() {
    let store = LogStore::new();
    store.log("alpha", LogLevel::Info);
    store.log("Beta ERROR", LogLevel::Error);
    store.log("gamma ray", LogLevel::Normal);

    let view = LogViewModel::attach(&store, "error, gamma");
    assert_eq!(messages(&view.visible()), vec!["gamma ray", "Beta ERROR"]);

    let filter = LogFilter::parse(" , ");
    assert_eq!(filter.apply(&store.entries()).len(), 3);
}

#[tokio::test]
async fn test_persistence_round_trip_and_delete() {
    let dir = TempDir::new().unwrap();
    let config = persistent_config(&dir);
    let path = dir.path().join("logs").join("console.log");

    let mut console = LogConsole::with_config(config.clone()).unwrap();
    console.initialize().await.unwrap();
    console.store().log("hello", LogLevel::Info);
    console.store().append(
        LogEntry::builder("boom")
            .level(LogLevel::Error)
            .stack_trace("S1\nS2")
            .build(),
    );
    console.shutdown().await.unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("[error] "));
    assert!(lines[0].ends_with(": boom"));
    assert_eq!(&lines[1..3], &["S1", "S2"]);
    assert!(lines[3].starts_with("[info] "));
    assert!(lines[3].ends_with(": hello"));

    // 重新打开时按原顺序读回
    let mut reopened = LogConsole::with_config(config).unwrap();
    let entries = reopened.store().entries();
    assert_eq!(messages(&entries), vec!["hello", "boom"]);
    assert_eq!(entries[1].stack_trace(), Some("S1\nS2"));

    // 清空后文件被删除
    reopened.initialize().await.unwrap();
    reopened.store().clear();
    reopened.shutdown().await.unwrap();
    assert!(!path.exists());
}

#[test]
fn test_seeding_tolerates_malformed_lines() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("console.log");
    std::fs::write(
        &path,
        "not a log line\n\
         [info] 2024-05-01T10:00:01.000000Z: second\n\
         [bogus] 2024-05-01T10:00:00.500000Z: kept as stack\n\
         [info] 2024-05-01T10:00:00.000000Z: first\n",
    )
    .unwrap();

    let store = LogStore::seeded_from(&path, PersistenceFormat::Text);
    let entries = store.entries();
    assert_eq!(messages(&entries), vec!["first", "second"]);
    assert_eq!(
        entries[1].stack_trace(),
        Some("[bogus] 2024-05-01T10:00:00.500000Z: kept as stack")
    );
}

#[test]
fn test_seeding_from_unreadable_path_starts_empty() {
    let dir = TempDir::new().unwrap();
    // 目录不能作为文件读取
    let store = LogStore::seeded_from(dir.path(), PersistenceFormat::Text);
    assert!(store.is_empty());
}
