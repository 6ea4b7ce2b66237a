//! 持久化文件的读写
//!
//! 文本格式：每条记录是一个渲染后的文本块（首行 `[<level>] <timestamp>: <message>`，
//! 随后是调用栈行），按最新优先的顺序以换行连接。JSON 行格式：每行一个
//! `LogRecord`。读取时跳过无法解析的行而不是中止。

use crate::config::PersistenceFormat;
use crate::core::entry::{LogEntry, LogLevel, LogRecord};
use crate::diagnostics::diagnostics;
use crate::error::{LogConsoleError, Result};
use crate::utils::FileTools;
use crate::view::display_order;
use chrono::{DateTime, Utc};
use std::path::Path;

/// 读取持久化文件的结果
#[derive(Debug, Default)]
pub struct ReadOutcome {
    /// 按追加顺序（最旧在前）排列的条目
    pub entries: Vec<LogEntry>,
    /// 每个被跳过的行对应的解析错误
    pub errors: Vec<LogConsoleError>,
}

impl ReadOutcome {
    /// 跳过的行数
    pub fn skipped(&self) -> usize {
        self.errors.len()
    }

    fn skip(&mut self, line: usize, reason: impl Into<String>) {
        let err = LogConsoleError::parse(line, reason);
        tracing::debug!(error = %err, category = err.category(), "skipping malformed line");
        self.errors.push(err);
    }
}

/// 将条目序列化为文件内容，条目按最新优先排列
///
/// 空集合返回 `None`，表示应删除文件。
pub fn render_entries(entries: &[LogEntry], format: PersistenceFormat) -> Result<Option<String>> {
    if entries.is_empty() {
        return Ok(None);
    }

    let ordered = display_order(entries);
    let mut out = String::new();
    for entry in &ordered {
        match format {
            PersistenceFormat::Text => out.push_str(&entry.render()),
            PersistenceFormat::JsonLines => out.push_str(&entry.to_json()?),
        }
        out.push('\n');
    }
    Ok(Some(out))
}

/// 解析文件内容
pub fn parse_entries(content: &str, format: PersistenceFormat) -> ReadOutcome {
    let mut outcome = match format {
        PersistenceFormat::Text => parse_text(content),
        PersistenceFormat::JsonLines => parse_json_lines(content),
    };
    // 文件中最新的在前
    outcome.entries.reverse();
    outcome
}

/// 解析文本块的首行
pub fn parse_header(line: &str) -> Option<(LogLevel, DateTime<Utc>, &str)> {
    let rest = line.strip_prefix('[')?;
    let (name, rest) = rest.split_once("] ")?;
    let level = name.parse::<LogLevel>().ok()?;
    // 级别名必须与渲染结果完全一致
    if level.as_str() != name {
        return None;
    }
    let (timestamp, message) = rest.split_once(": ")?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .ok()?
        .with_timezone(&Utc);
    Some((level, timestamp, message))
}

struct PendingEntry<'a> {
    level: LogLevel,
    timestamp: DateTime<Utc>,
    message: &'a str,
    stack: Vec<&'a str>,
}

impl PendingEntry<'_> {
    fn finish(self) -> LogEntry {
        // 尾部空白行由条目构建时统一去除
        LogEntry::from_parts(
            self.level,
            self.timestamp,
            self.message,
            Some(self.stack.join("\n")),
        )
    }
}

fn parse_text(content: &str) -> ReadOutcome {
    let mut outcome = ReadOutcome::default();
    let mut current: Option<PendingEntry<'_>> = None;

    for (index, line) in content.lines().enumerate() {
        if let Some((level, timestamp, message)) = parse_header(line) {
            if let Some(done) = current.take() {
                outcome.entries.push(done.finish());
            }
            current = Some(PendingEntry {
                level,
                timestamp,
                message,
                stack: Vec::new(),
            });
            continue;
        }

        match current.as_mut() {
            Some(pending) => pending.stack.push(line),
            None if line.trim().is_empty() => {}
            None => outcome.skip(index + 1, "line before the first entry header"),
        }
    }

    if let Some(done) = current.take() {
        outcome.entries.push(done.finish());
    }
    outcome
}

fn parse_json_lines(content: &str) -> ReadOutcome {
    let mut outcome = ReadOutcome::default();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => outcome.entries.push(LogEntry::from(record)),
            Err(e) => outcome.skip(index + 1, e.to_string()),
        }
    }
    outcome
}

/// 读取持久化文件
///
/// 文件不存在时返回空结果；其他 I/O 错误向调用方返回。
pub fn read_entries(path: &Path, format: PersistenceFormat) -> Result<ReadOutcome> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ReadOutcome::default()),
        Err(e) => return Err(e.into()),
    };

    let outcome = parse_entries(&content, format);
    diagnostics().add_seed_lines_skipped(outcome.skipped() as u64);
    Ok(outcome)
}

/// 将条目写入持久化文件；集合为空时删除文件
pub async fn write_entries(
    path: &Path,
    entries: &[LogEntry],
    format: PersistenceFormat,
) -> Result<()> {
    match render_entries(entries, format)? {
        Some(content) => {
            if let Some(parent) = path.parent() {
                FileTools::ensure_directory_exists(parent)?;
            }
            tokio::fs::write(path, content).await?;
        }
        None => FileTools::remove_file_if_exists(path).await?,
    }
    diagnostics().increment_persistence_writes();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(message: &str, level: LogLevel, minute: u32) -> LogEntry {
        LogEntry::from_parts(
            level,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
            message,
            None,
        )
    }

    #[test]
    fn test_render_is_most_recent_first() {
        let entries = vec![
            entry("hello", LogLevel::Info, 0),
            entry("boom", LogLevel::Error, 1),
        ];
        let content = render_entries(&entries, PersistenceFormat::Text)
            .unwrap()
            .unwrap();
        assert_eq!(
            content,
            "[error] 2024-05-01T10:01:00.000000Z: boom\n\
             [info] 2024-05-01T10:00:00.000000Z: hello\n"
        );
    }

    #[test]
    fn test_render_empty_means_delete() {
        assert!(render_entries(&[], PersistenceFormat::Text)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_parse_header() {
        let (level, timestamp, message) =
            parse_header("[warning] 2024-05-01T10:00:00.000000Z: disk: almost full").unwrap();
        assert_eq!(level, LogLevel::Warning);
        assert_eq!(timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert_eq!(message, "disk: almost full");

        assert!(parse_header("[warn] 2024-05-01T10:00:00.000000Z: alias").is_none());
        assert!(parse_header("[info] yesterday: nope").is_none());
        assert!(parse_header("plain text").is_none());
    }

    #[test]
    fn test_parse_text_with_stack_traces() {
        let content = "garbage before any header\n\
                       [error] 2024-05-01T10:01:00.000000Z: boom\n\
                       \x20  0: frame_a\n\
                       \x20  1: frame_b\n\
                       \n\
                       [info] 2024-05-01T10:00:00.000000Z: hello\n";

        let outcome = parse_entries(content, PersistenceFormat::Text);
        assert_eq!(outcome.skipped(), 1);
        assert!(matches!(
            &outcome.errors[0],
            LogConsoleError::ParseError { line: 1, .. }
        ));
        assert_eq!(outcome.errors[0].category(), "parse");
        assert_eq!(outcome.entries.len(), 2);

        // 读回后恢复为最旧在前
        assert_eq!(outcome.entries[0].message_text(), "hello");
        assert_eq!(outcome.entries[1].message_text(), "boom");
        assert_eq!(
            outcome.entries[1].stack_trace(),
            Some("   0: frame_a\n   1: frame_b")
        );
    }

    #[test]
    fn test_text_round_trip() {
        let entries = vec![
            entry("hello", LogLevel::Info, 0),
            LogEntry::from_parts(
                LogLevel::Error,
                Utc.with_ymd_and_hms(2024, 5, 1, 10, 1, 0).unwrap(),
                "boom",
                Some("S1\nS2".to_string()),
            ),
            LogEntry::from_parts(
                LogLevel::Warning,
                Utc.with_ymd_and_hms(2024, 5, 1, 10, 2, 0).unwrap(),
                "trailing blank",
                Some("S1\n   ".to_string()),
            ),
            entry("same minute", LogLevel::Debug, 1),
        ];

        let content = render_entries(&entries, PersistenceFormat::Text)
            .unwrap()
            .unwrap();
        let outcome = parse_entries(&content, PersistenceFormat::Text);
        assert_eq!(outcome.skipped(), 0);

        let rerendered = render_entries(&outcome.entries, PersistenceFormat::Text)
            .unwrap()
            .unwrap();
        assert_eq!(rerendered, content);
    }

    #[test]
    fn test_json_lines_skip_malformed() {
        let entries = vec![entry("one", LogLevel::Info, 0), entry("two", LogLevel::Info, 1)];
        let mut content = render_entries(&entries, PersistenceFormat::JsonLines)
            .unwrap()
            .unwrap();
        content.push_str("{not json}\n");

        let outcome = parse_entries(&content, PersistenceFormat::JsonLines);
        assert_eq!(outcome.skipped(), 1);
        assert!(matches!(
            &outcome.errors[0],
            LogConsoleError::ParseError { line: 3, .. }
        ));
        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.entries[0].message_text(), "one");
        assert_eq!(outcome.entries[1].message_text(), "two");
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = read_entries(&dir.path().join("none.log"), PersistenceFormat::Text).unwrap();
        assert!(outcome.entries.is_empty());
        assert_eq!(outcome.skipped(), 0);
    }

    #[tokio::test]
    async fn test_write_then_delete_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("console.log");

        write_entries(&path, &[entry("kept", LogLevel::Info, 0)], PersistenceFormat::Text)
            .await
            .unwrap();
        assert!(path.exists());

        let outcome = read_entries(&path, PersistenceFormat::Text).unwrap();
        assert_eq!(outcome.entries.len(), 1);

        write_entries(&path, &[], PersistenceFormat::Text).await.unwrap();
        assert!(!path.exists());

        // 再次删除不存在的文件不是错误
        write_entries(&path, &[], PersistenceFormat::Text).await.unwrap();
    }
}
