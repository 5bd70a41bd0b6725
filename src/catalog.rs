//! The process-wide catalog: active products and discontinued records.
//!
//! [`CatalogStore`] is the single owner of both lists. It loads them from
//! disk at startup, hands out snapshots to readers, and is the only writer of
//! the active-catalog JSON file. Read failures never propagate: a missing or
//! malformed file is logged and treated as an empty list, so chat lookups keep
//! working with whatever data is available.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;

use salesdesk_core::lookup::{self, Lookup};
use salesdesk_core::models::{DiscontinuedRecord, Product, ProductStatus, RawDiscontinued};
use salesdesk_core::sheet::DiscontinuedColumns;

use crate::config::CatalogConfig;

/// Filters accepted by [`CatalogStore::browse`].
#[derive(Debug, Clone, Default)]
pub struct BrowseFilter {
    pub query: Option<String>,
    pub segment: Option<String>,
    pub status: Option<ProductStatus>,
}

/// A product as shown in the catalog listing, with discontinued status
/// resolved against the discontinued list.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub product: Product,
    #[serde(rename = "substituto", skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(rename = "indicacao", skip_serializing_if = "Option::is_none")]
    pub alternative: Option<String>,
}

pub struct CatalogStore {
    products_path: PathBuf,
    discontinued_csv: PathBuf,
    discontinued_json: Option<PathBuf>,
    search_limit: usize,
    products: RwLock<Vec<Product>>,
    discontinued: RwLock<Vec<DiscontinuedRecord>>,
    write_lock: Mutex<()>,
}

impl CatalogStore {
    /// Loads both lists from the configured files.
    pub fn load(config: &CatalogConfig) -> Self {
        let store = Self {
            products_path: config.products_path.clone(),
            discontinued_csv: config.discontinued_csv.clone(),
            discontinued_json: config.discontinued_json.clone(),
            search_limit: config.search_limit,
            products: RwLock::new(Vec::new()),
            discontinued: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
        };
        store.reload();
        store
    }

    /// Re-reads every source file, replacing the in-memory lists.
    pub fn reload(&self) {
        let products = read_products(&self.products_path).unwrap_or_else(|e| {
            tracing::warn!(path = %self.products_path.display(), error = %e, "catalog unavailable, using empty catalog");
            Vec::new()
        });

        let mut discontinued = read_discontinued_csv(&self.discontinued_csv).unwrap_or_else(|e| {
            tracing::warn!(path = %self.discontinued_csv.display(), error = %e, "discontinued CSV unavailable");
            Vec::new()
        });
        if let Some(path) = &self.discontinued_json {
            match read_discontinued_json(path) {
                Ok(mut extra) => discontinued.append(&mut extra),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "discontinued JSON unavailable")
                }
            }
        }

        tracing::info!(
            products = products.len(),
            discontinued = discontinued.len(),
            "catalog loaded"
        );
        *self.products.write().unwrap_or_else(|e| e.into_inner()) = products;
        *self.discontinued.write().unwrap_or_else(|e| e.into_inner()) = discontinued;
    }

    pub fn products(&self) -> Vec<Product> {
        self.products
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn discontinued(&self) -> Vec<DiscontinuedRecord> {
        self.discontinued
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn product_count(&self) -> usize {
        self.products.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Catalog lookup for chat: at most `search_limit` matches in file order.
    pub fn search(&self, query: &str) -> Vec<Product> {
        let products = self.products.read().unwrap_or_else(|e| e.into_inner());
        lookup::search_catalog(&products, query, self.search_limit)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Catalog and discontinued stages of the lookup chain.
    pub fn resolve_local(&self, query: &str) -> Option<Lookup> {
        let products = self.products.read().unwrap_or_else(|e| e.into_inner());
        let discontinued = self.discontinued.read().unwrap_or_else(|e| e.into_inner());
        lookup::resolve_local(&products, &discontinued, query, self.search_limit)
    }

    /// Full listing with filters; products whose code appears in the
    /// discontinued list are reported as discontinued with their successors.
    pub fn browse(&self, filter: &BrowseFilter) -> Vec<CatalogEntry> {
        let products = self.products.read().unwrap_or_else(|e| e.into_inner());
        let discontinued = self.discontinued.read().unwrap_or_else(|e| e.into_inner());
        let segment = filter.segment.as_deref().map(str::to_lowercase);

        lookup::filter_catalog(&products, filter.query.as_deref().unwrap_or(""))
            .into_iter()
            .filter(|p| {
                segment
                    .as_deref()
                    .map_or(true, |s| p.segment.to_lowercase() == s)
            })
            .map(|p| {
                let mut entry = CatalogEntry {
                    product: p.clone(),
                    replacement: None,
                    alternative: None,
                };
                if let Some(rec) = discontinued.iter().find(|d| d.code == p.code.trim()) {
                    entry.product.status = ProductStatus::Discontinued;
                    entry.replacement = rec.replacement.clone();
                    entry.alternative = rec.alternative.clone();
                }
                entry
            })
            .filter(|e| filter.status.map_or(true, |s| e.product.status == s))
            .collect()
    }

    /// Replaces the active catalog on disk and in memory. Concurrent calls
    /// are serialized; the last one wins.
    pub async fn replace_products(&self, products: Vec<Product>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.products_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(&products)?;
        tokio::fs::write(&self.products_path, json)
            .await
            .with_context(|| format!("failed to write {}", self.products_path.display()))?;

        *self.products.write().unwrap_or_else(|e| e.into_inner()) = products;
        Ok(())
    }
}

fn read_products(path: &Path) -> Result<Vec<Product>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("malformed catalog {}", path.display()))?;

    let mut products = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<Product>(row) {
            Ok(p) => products.push(p),
            Err(e) => tracing::warn!(
                path = %path.display(),
                row = index + 1,
                error = %e,
                "skipping unreadable catalog row"
            ),
        }
    }
    Ok(products)
}

fn read_discontinued_csv(path: &Path) -> Result<Vec<DiscontinuedRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let columns = DiscontinuedColumns::from_headers(&headers);

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        match row {
            Ok(row) => {
                let cells: Vec<String> = row.iter().map(str::to_string).collect();
                if let Some(rec) = columns.record(&cells) {
                    records.push(rec);
                }
            }
            Err(e) => tracing::warn!(line = line + 2, error = %e, "skipping discontinued row"),
        }
    }
    Ok(records)
}

fn read_discontinued_json(path: &Path) -> Result<Vec<DiscontinuedRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw: Vec<RawDiscontinued> = serde_json::from_str(&content)
        .with_context(|| format!("malformed discontinued list {}", path.display()))?;
    Ok(raw.into_iter().map(RawDiscontinued::into_record).collect())
}
