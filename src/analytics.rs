//! Chat analytics report generation.
//!
//! Reads the chat log file (not the in-memory mirror, so the report can be
//! produced offline by the CLI), runs `salesdesk_core::analytics::analyze`
//! and stores the result as pretty-printed JSON.

use anyhow::{Context, Result};
use std::path::Path;

use salesdesk_core::analytics::{analyze, AnalysisReport};

use crate::chat_log;

/// Builds the report from the log at `chat_log` and writes it to `out`.
pub async fn run_analysis(chat_log: &Path, out: &Path) -> Result<AnalysisReport> {
    let entries = chat_log::replay(chat_log);
    let report = analyze(&entries);

    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_string_pretty(&report)?;
    tokio::fs::write(out, json)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;

    tracing::info!(messages = report.total_messages, path = %out.display(), "analysis written");
    Ok(report)
}

/// The last stored report, or `None` if analysis never ran.
pub fn read_report(path: &Path) -> Result<Option<serde_json::Value>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(
            serde_json::from_str(&content)
                .with_context(|| format!("malformed analysis file {}", path.display()))?,
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}
