//! 输出拦截
//!
//! 在一个工作单元周围建立捕获作用域：作用域内的 print 行、panic、返回的错误
//! 以及 tracing 事件都会被记录到目标存储中，同时照常交给默认处理（打印到
//! 标准输出、继续 panic、原样返回错误）。捕获只做加法，从不吞掉任何东西。
//!
//! 作用域是线程局部的并且可以嵌套：最内层的作用域决定目标存储，作用域结束
//! （包括展开期间）时恢复外层目标。
//!
//! ```rust
//! use log_console::{console_println, intercept, LogStore};
//!
//! let store = LogStore::new();
//! intercept::capture(&store, || {
//!     console_println!("loaded {} items", 3);
//! });
//! assert_eq!(store.entries()[0].message_text(), "loaded 3 items");
//! ```

use crate::core::entry::{self, LogEntry, LogLevel};
use crate::core::store::LogStore;
use crate::diagnostics::diagnostics;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::fmt::{self, Write as _};
use std::future::Future;
use std::io::Write as _;
use std::marker::PhantomData;
use std::panic;
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

thread_local! {
    /// 当前线程的捕获目标栈，最后一个为最内层
    static SCOPES: RefCell<Vec<LogStore>> = const { RefCell::new(Vec::new()) };
    /// 大于 0 时暂停捕获
    static SUPPRESSED: Cell<usize> = const { Cell::new(0) };
    /// 大于 0 时 panic 钩子完全静默
    static QUIET: Cell<usize> = const { Cell::new(0) };
}

static PANIC_HOOK: Once = Once::new();

/// 捕获作用域守卫
///
/// 丢弃时恢复进入前的捕获目标。守卫绑定在创建它的线程上。
#[must_use = "the capture scope ends when the guard is dropped"]
pub struct CaptureGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        let _ = SCOPES.try_with(|scopes| {
            if let Ok(mut scopes) = scopes.try_borrow_mut() {
                scopes.truncate(self.depth - 1);
            }
        });
    }
}

/// 进入一个以 `store` 为目标的捕获作用域
pub fn enter(store: LogStore) -> CaptureGuard {
    let depth = SCOPES.with(|scopes| {
        let mut scopes = scopes.borrow_mut();
        scopes.push(store);
        scopes.len()
    });
    CaptureGuard {
        depth,
        _not_send: PhantomData,
    }
}

/// 当前线程最内层的捕获目标
pub fn current_target() -> Option<LogStore> {
    if SUPPRESSED.try_with(|s| s.get() > 0).unwrap_or(true) {
        return None;
    }
    SCOPES
        .try_with(|scopes| {
            scopes
                .try_borrow()
                .ok()
                .and_then(|scopes| scopes.last().cloned())
        })
        .ok()
        .flatten()
}

/// 当前线程是否处于捕获作用域中
pub fn is_capturing() -> bool {
    current_target().is_some()
}

struct SuppressGuard;

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        let _ = SUPPRESSED.try_with(|s| s.set(s.get().saturating_sub(1)));
    }
}

/// 在暂停捕获的情况下执行 `f`
pub fn without_capture<R>(f: impl FnOnce() -> R) -> R {
    let _ = SUPPRESSED.try_with(|s| s.set(s.get() + 1));
    let _guard = SuppressGuard;
    f()
}

struct QuietGuard;

impl Drop for QuietGuard {
    fn drop(&mut self) {
        let _ = QUIET.try_with(|q| q.set(q.get().saturating_sub(1)));
    }
}

fn is_quiet() -> bool {
    QUIET.try_with(|q| q.get() > 0).unwrap_or(false)
}

/// 暂停捕获并静默执行 `f`
///
/// `f` 中的 panic 既不记录，也不交给原有钩子，因此不会输出到标准错误。
/// 调用方需要自行 `catch_unwind`。之后才安装的钩子不受影响。
pub(crate) fn quietly<R>(f: impl FnOnce() -> R) -> R {
    install_panic_hook();
    let _ = QUIET.try_with(|q| q.set(q.get() + 1));
    let _guard = QuietGuard;
    without_capture(f)
}

/// 在以 `store` 为目标的捕获作用域中执行 `f`
///
/// `f` 中的 panic 会被记录为 `error` 条目，然后继续向外传播。
pub fn capture<R>(store: &LogStore, f: impl FnOnce() -> R) -> R {
    install_panic_hook();
    let _guard = enter(store.clone());
    f()
}

/// 与 [`capture`] 相同，另外把 `f` 返回的错误记录为 `error` 条目
///
/// 错误会原样返回给调用方。
pub fn capture_result<T, E>(store: &LogStore, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
where
    E: fmt::Display,
{
    let result = capture(store, f);
    if let Err(ref e) = result {
        let message = entry::display_text(e, std::any::type_name::<E>());
        let entry = LogEntry::builder(message)
            .level(LogLevel::Error)
            .stack_trace(Backtrace::force_capture().to_string())
            .build();
        without_capture(|| store.append(entry));
    }
    result
}

/// 把 `future` 的每一次 poll 都放进以 `store` 为目标的捕获作用域中
pub fn capture_async<F>(store: &LogStore, future: F) -> Captured<F>
where
    F: Future,
{
    install_panic_hook();
    Captured {
        store: store.clone(),
        future: Box::pin(future),
    }
}

/// [`capture_async`] 返回的 future
pub struct Captured<F> {
    store: LogStore,
    future: Pin<Box<F>>,
}

impl<F: Future> Future for Captured<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _guard = enter(this.store.clone());
        this.future.as_mut().poll(cx)
    }
}

/// 输出一段文本
///
/// 文本总是写到标准输出；处于捕获作用域中时，每一行还会作为 `normal`
/// 条目追加到目标存储。通常通过 [`console_print!`](crate::console_print) 和
/// [`console_println!`](crate::console_println) 调用。
pub fn print(args: fmt::Arguments<'_>) {
    let mut text = String::new();
    if text.write_fmt(args).is_err() {
        text = entry::unprintable("fmt::Arguments");
    }

    {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    if let Some(store) = current_target() {
        for line in text.lines() {
            store.append(LogEntry::with_level(line.to_string(), LogLevel::Normal));
            diagnostics().increment_prints_captured();
        }
    }
}

/// 安装 panic 钩子（进程内只安装一次）
///
/// 新钩子串在原有钩子之前：panic 发生在捕获作用域内时先记录一条带调用栈的
/// `error` 条目，然后调用原有钩子。条目消息字符串化时发生的 panic 会被
/// 静默处理，不会调用原有钩子。
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if is_quiet() {
                return;
            }
            if let Some(store) = current_target() {
                let mut stack = String::new();
                if let Some(location) = info.location() {
                    let _ = writeln!(stack, "at {}", location);
                }
                let _ = write!(stack, "{}", Backtrace::force_capture());

                let entry = LogEntry::builder(panic_message(info.payload()))
                    .level(LogLevel::Error)
                    .stack_trace(stack)
                    .build();
                without_capture(|| store.append(entry));
                diagnostics().increment_panics_captured();
            }
            previous(info);
        }));
    });
}

/// 从 panic 载荷中取出消息
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// 向标准输出打印并在捕获作用域内记录
#[macro_export]
macro_rules! console_print {
    ($($arg:tt)*) => {
        $crate::intercept::print(::std::format_args!($($arg)*))
    };
}

/// 向标准输出打印一行并在捕获作用域内记录
#[macro_export]
macro_rules! console_println {
    () => {
        $crate::intercept::print(::std::format_args!("\n"))
    };
    ($($arg:tt)*) => {
        $crate::intercept::print(::std::format_args!("{}\n", ::std::format_args!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::AssertUnwindSafe;

    fn messages(store: &LogStore) -> Vec<String> {
        store
            .entries()
            .iter()
            .map(|e| e.message_text().to_string())
            .collect()
    }

    #[test]
    fn test_print_outside_scope_is_not_recorded() {
        let store = LogStore::new();
        crate::console_println!("nobody listening");
        assert!(store.is_empty());
        assert!(!is_capturing());
    }

    #[test]
    fn test_print_inside_scope_records_lines() {
        let store = LogStore::new();
        capture(&store, || {
            crate::console_println!("one");
            crate::console_print!("two\nthree\n");
        });

        assert_eq!(messages(&store), vec!["one", "two", "three"]);
        assert!(store
            .entries()
            .iter()
            .all(|e| e.level() == LogLevel::Normal));
    }

    #[test]
    fn test_nested_scopes_route_to_innermost() {
        let outer = LogStore::new();
        let inner = LogStore::new();

        capture(&outer, || {
            crate::console_println!("outer before");
            capture(&inner, || {
                crate::console_println!("inner");
            });
            crate::console_println!("outer after");
        });

        assert_eq!(messages(&outer), vec!["outer before", "outer after"]);
        assert_eq!(messages(&inner), vec!["inner"]);
        assert!(current_target().is_none());
    }

    #[test]
    fn test_panic_is_recorded_and_propagated() {
        let store = LogStore::new();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            capture(&store, || {
                crate::console_println!("x");
                panic!("kaboom");
            })
        }));

        assert!(result.is_err());
        let payload = result.unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "kaboom");

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message_text(), "x");
        assert_eq!(entries[0].level(), LogLevel::Normal);
        assert_eq!(entries[1].message_text(), "kaboom");
        assert_eq!(entries[1].level(), LogLevel::Error);
        assert!(entries[1].stack_trace().unwrap().starts_with("at "));

        // 展开后作用域已恢复
        assert!(current_target().is_none());
    }

    #[test]
    fn test_inner_scope_panic_goes_to_inner_store() {
        let outer = LogStore::new();
        let inner = LogStore::new();

        capture(&outer, || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                capture(&inner, || panic!("inner failure"));
            }));
            assert!(result.is_err());
            // 外层作用域已恢复
            assert!(current_target().unwrap().ptr_eq(&outer));
        });

        let entries = inner.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level(), LogLevel::Error);
        assert_eq!(entries[0].message_text(), "inner failure");
        assert!(outer.is_empty());
        assert!(current_target().is_none());
    }

    #[test]
    fn test_panicking_display_inside_scope_is_silent() {
        struct Explodes;

        impl fmt::Display for Explodes {
            fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
                panic!("display exploded")
            }
        }

        let store = LogStore::new();
        capture(&store, || {
            store.log(Explodes, LogLevel::Warning);
            let entries = store.entries();
            assert!(entries[0].message_text().starts_with("<unprintable "));
        });

        // 只有原始条目，没有因字符串化 panic 产生的 error 条目
        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level(), LogLevel::Warning);
        assert!(!is_quiet());
    }

    #[test]
    fn test_quietly_restores_state() {
        let store = LogStore::new();
        capture(&store, || {
            let result = quietly(|| panic::catch_unwind(|| panic!("hushed")));
            assert!(result.is_err());
            assert!(!is_quiet());
            assert!(is_capturing());
        });
        assert!(store.is_empty());
    }

    #[test]
    fn test_panic_outside_scope_is_not_recorded() {
        install_panic_hook();
        let store = LogStore::new();
        let _ = panic::catch_unwind(|| panic!("unobserved"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_capture_result_records_and_returns_error() {
        let store = LogStore::new();
        let result: Result<u32, String> =
            capture_result(&store, || Err("disk on fire".to_string()));

        assert_eq!(result.unwrap_err(), "disk on fire");
        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level(), LogLevel::Error);
        assert_eq!(entries[0].message_text(), "disk on fire");
        assert!(entries[0].stack_trace().is_some());

        let ok: Result<u32, String> = capture_result(&store, || Ok(7));
        assert_eq!(ok.unwrap(), 7);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_without_capture_suspends_scope() {
        let store = LogStore::new();
        capture(&store, || {
            without_capture(|| crate::console_println!("hidden"));
            crate::console_println!("visible");
        });
        assert_eq!(messages(&store), vec!["visible"]);
    }

    #[tokio::test]
    async fn test_capture_async_spans_await_points() {
        let store = LogStore::new();

        capture_async(&store, async {
            crate::console_println!("before");
            tokio::task::yield_now().await;
            crate::console_println!("after");
        })
        .await;

        crate::console_println!("outside");
        assert_eq!(messages(&store), vec!["before", "after"]);
    }

    #[test]
    fn test_panic_message_variants() {
        let text: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(text.as_ref()), "static");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "Box<dyn Any>");
    }
}
