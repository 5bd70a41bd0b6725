//! Append-only JSON-lines logs.
//!
//! [`ChatLog`] owns the chat log file and an in-memory mirror of its entries.
//! The file is the durable copy: the mirror is rebuilt by replaying it at
//! startup and only grows through [`ChatLog::append`].
//!
//! [`JsonlWriter`] is the shared appender; the comparison log uses it
//! directly.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use salesdesk_core::history::history_for_day;
use salesdesk_core::models::{ChatLogEntry, ChatTurn};

/// Serialized appends of one JSON object per line.
pub struct JsonlWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

pub struct ChatLog {
    writer: JsonlWriter,
    entries: RwLock<Vec<ChatLogEntry>>,
}

impl ChatLog {
    /// Opens the log at `path`, replaying any existing lines. A missing file
    /// is an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = replay(&path);
        tracing::info!(path = %path.display(), entries = entries.len(), "chat log replayed");
        Self {
            writer: JsonlWriter::new(path),
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }

    /// Writes `entry` to the file, then adds it to the mirror. The mirror is
    /// untouched when the write fails.
    pub async fn append(&self, entry: ChatLogEntry) -> Result<()> {
        self.writer.append(&entry).await?;
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entries(&self) -> Vec<ChatLogEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Turns of every exchange logged on `day` (UTC), oldest first.
    pub fn history(&self, day: NaiveDate) -> Vec<ChatTurn> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        history_for_day(&entries, day)
    }

    /// Every line of the file as raw JSON, in file order. `None` when the
    /// file does not exist.
    pub fn read_all(&self) -> Result<Option<Vec<serde_json::Value>>> {
        let content = match std::fs::read_to_string(self.path()) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path().display()))
            }
        };
        let mut lines = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(value) => lines.push(value),
                Err(e) => tracing::warn!(line = i + 1, error = %e, "skipping malformed chat log line"),
            }
        }
        Ok(Some(lines))
    }
}

/// Parses every line of the chat log at `path`. Bad lines are skipped.
pub fn replay(path: &Path) -> Vec<ChatLogEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "chat log unreadable");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChatLogEntry>(line) {
            Ok(entry) if !entry.question.is_empty() && !entry.answer.is_empty() => {
                entries.push(entry)
            }
            Ok(_) => tracing::warn!(line = i + 1, "skipping chat log line without question/answer"),
            Err(e) => tracing::warn!(line = i + 1, error = %e, "skipping malformed chat log line"),
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use salesdesk_core::models::{Role, Source};
    use tempfile::TempDir;

    fn entry(q: &str, a: &str, day: u32) -> ChatLogEntry {
        ChatLogEntry {
            question: q.to_string(),
            answer: a.to_string(),
            source: Source::Catalog,
            username: None,
            timestamp: Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_append_then_history() {
        let tmp = TempDir::new().unwrap();
        let log = ChatLog::open(tmp.path().join("logs/chat.jsonl"));
        assert!(log.is_empty());

        log.append(entry("preço da câmera?", "R$ 300", 10)).await.unwrap();
        log.append(entry("ontem", "resposta", 9)).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let turns = log.history(day);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "preço da câmera?");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].text, "R$ 300");
    }

    #[tokio::test]
    async fn test_replay_survives_restart() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.jsonl");
        {
            let log = ChatLog::open(path.clone());
            log.append(entry("a", "b", 1)).await.unwrap();
        }
        let reopened = ChatLog::open(&path);
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.entries()[0].question, "a");
    }

    #[test]
    fn test_replay_skips_bad_lines_and_reads_legacy_labels() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"pergunta":"1234","resposta":"use 5678","origem":"Encerrados CSV","data":"2025-03-10T10:00:00.000Z"}"#,
                "\n",
                "not json\n",
                "\n",
                r#"{"pergunta":"","resposta":"x","origem":"GPT","data":"2025-03-10T10:00:00Z"}"#,
                "\n",
                r#"{"pergunta":"lua","resposta":"384400 km","origem":"WolframAlpha","username":"ana","data":"2025-03-10T11:00:00Z"}"#,
                "\n",
            ),
        )
        .unwrap();

        let entries = replay(&path);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, Source::DiscontinuedList);
        assert_eq!(entries[1].source, Source::ExternalKnowledge);
        assert_eq!(entries[1].username.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn test_read_all() {
        let tmp = TempDir::new().unwrap();
        let log = ChatLog::open(tmp.path().join("chat.jsonl"));
        assert!(log.read_all().unwrap().is_none());

        log.append(entry("q", "a", 2)).await.unwrap();
        let lines = log.read_all().unwrap().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["pergunta"], "q");
        assert_eq!(lines[0]["origem"], "catalog");
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_all_warns_on_malformed_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("chat.jsonl");
        std::fs::write(
            &path,
            "{\"pergunta\":\"q\",\"resposta\":\"a\"}\n{ broken\n\n{\"pergunta\":\"r\"}\n",
        )
        .unwrap();
        let log = ChatLog::open(path.clone());

        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let lines = tracing::subscriber::with_default(subscriber, || log.read_all())
            .unwrap()
            .unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["pergunta"], "r");
        let logged = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("skipping malformed chat log line"));
        assert!(logged.contains("line=2"));
    }
}
