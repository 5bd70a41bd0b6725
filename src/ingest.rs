//! Spreadsheet ingestion and upload archive.
//!
//! An upload is decoded into a header row plus string rows ([`read_sheet`]),
//! mapped onto products by `salesdesk_core::sheet`, written over the active
//! catalog, and archived under the backup directory. Delimited text goes
//! through `csv`; workbooks through `calamine` (first sheet only).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

use salesdesk_core::sheet::{products_from_rows, ColumnMap};

use crate::catalog::CatalogStore;

/// Upload problems attributable to the file itself.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("unsupported file type: {0} (expected csv, tsv, txt, xlsx, xlsm, xls or ods)")]
    Unsupported(String),
    #[error("the spreadsheet has no header row")]
    Empty,
    #[error("could not read spreadsheet: {0}")]
    Malformed(String),
}

/// A decoded sheet: one header row and the data rows below it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub total: usize,
    pub backup: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub modified: DateTime<Utc>,
}

fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Decodes an uploaded file by its extension.
pub fn read_sheet(file_name: &str, bytes: &[u8]) -> Result<Sheet, SheetError> {
    match extension(file_name).as_str() {
        "csv" | "txt" => read_delimited(bytes, None),
        "tsv" => read_delimited(bytes, Some(b'\t')),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(bytes),
        other => Err(SheetError::Unsupported(if other.is_empty() {
            file_name.to_string()
        } else {
            format!(".{}", other)
        })),
    }
}

/// Picks `,`, `;` or tab, whichever appears most in the header line. Ties
/// go to `,`.
fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    [b'\t', b';', b',']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .unwrap_or(b',')
}

fn read_delimited(bytes: &[u8], delimiter: Option<u8>) -> Result<Sheet, SheetError> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_start_matches('\u{feff}');
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(text));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(Ok(r)) => r.iter().map(str::to_string).collect(),
        Some(Err(e)) => return Err(SheetError::Malformed(e.to_string())),
        None => return Err(SheetError::Empty),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| SheetError::Malformed(e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Sheet { headers, rows })
}

fn read_workbook(bytes: &[u8]) -> Result<Sheet, SheetError> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SheetError::Malformed(e.to_string()))?;
    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Err(SheetError::Empty);
    };
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| SheetError::Malformed(e.to_string()))?;

    let mut rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect::<Vec<String>>());
    let headers = rows.next().ok_or(SheetError::Empty)?;
    Ok(Sheet {
        headers,
        rows: rows.collect(),
    })
}

/// `backup_<ISO-8601 with ':' and '.' as '-'>_<file name>`.
pub fn backup_name(file_name: &str, now: DateTime<Utc>) -> String {
    let stamp = now
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-");
    format!("backup_{}_{}", stamp, sanitize_file_name(file_name))
}

/// Keeps the final path component and replaces anything outside
/// `[A-Za-z0-9._-]` with `_`.
fn sanitize_file_name(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Replaces the catalog with the products in an uploaded sheet and archives
/// the upload.
pub async fn import_sheet(
    catalog: &CatalogStore,
    backup_dir: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<ImportSummary> {
    let sheet = read_sheet(file_name, bytes)?;
    if ColumnMap::from_headers(&sheet.headers).recognized() == 0 {
        tracing::warn!(file = file_name, headers = ?sheet.headers, "no known columns in upload");
    }
    let products = products_from_rows(&sheet.headers, &sheet.rows);
    let total = products.len();

    tokio::fs::create_dir_all(backup_dir)
        .await
        .with_context(|| format!("failed to create {}", backup_dir.display()))?;
    let backup = backup_name(file_name, Utc::now());
    tokio::fs::write(backup_dir.join(&backup), bytes)
        .await
        .with_context(|| format!("failed to archive upload as {}", backup))?;

    catalog.replace_products(products).await?;
    tracing::info!(file = file_name, total, backup = %backup, "catalog replaced from upload");

    Ok(ImportSummary { total, backup })
}

/// Archived uploads, newest first. A missing directory is an empty list.
pub fn list_backups(backup_dir: &Path) -> Result<Vec<BackupInfo>> {
    let entries = match std::fs::read_dir(backup_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("failed to list {}", backup_dir.display())),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let modified: DateTime<Utc> = meta.modified()?.into();
        backups.push(BackupInfo { name, modified });
    }
    backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(backups)
}

/// A name within the `[A-Za-z0-9._-]` alphabet [`backup_name`] produces that
/// does not start with a dot.
pub fn is_safe_backup_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// Path of backup `name`, or `None` when the name could escape the directory.
pub fn backup_path(backup_dir: &Path, name: &str) -> Option<PathBuf> {
    is_safe_backup_name(name).then(|| backup_dir.join(name))
}
