//! The local half of the chat lookup chain.
//!
//! A question is answered from the first stage that produces context:
//!
//! 1. **Catalog**: up to [`CATALOG_MATCH_LIMIT`] active products whose
//!    description, code or segment contains the query (case-insensitive).
//! 2. **Discontinued list**: the first record whose code equals the trimmed
//!    query or whose description contains it.
//! 3. **External knowledge**: a short answer from the knowledge API.
//! 4. **Not found**: the model answers with an empty context.
//!
//! Stages 1 and 2 are pure and live here ([`resolve_local`]); stage 3 needs
//! the network and is driven by the application crate, which then builds a
//! [`Lookup::External`] or [`Lookup::NotFound`].

use crate::models::{DiscontinuedRecord, Product, Source};

/// Default number of catalog products handed to the model.
pub const CATALOG_MATCH_LIMIT: usize = 3;

/// Placeholder written when a discontinued record has no successor.
pub const NONE_LABEL: &str = "none";

/// Outcome of the lookup chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Catalog(Vec<Product>),
    Discontinued(DiscontinuedRecord),
    External(String),
    NotFound,
}

impl Lookup {
    /// The source tag reported to the client and written to the chat log.
    pub fn source(&self) -> Source {
        match self {
            Lookup::Catalog(_) => Source::Catalog,
            Lookup::Discontinued(_) => Source::DiscontinuedList,
            Lookup::External(_) => Source::ExternalKnowledge,
            Lookup::NotFound => Source::Model,
        }
    }

    /// Context text given to the language model. Empty for [`Lookup::NotFound`].
    pub fn context(&self) -> String {
        match self {
            Lookup::Catalog(products) => products
                .iter()
                .map(product_context)
                .collect::<Vec<_>>()
                .join("\n"),
            Lookup::Discontinued(record) => discontinued_context(record),
            Lookup::External(answer) => answer.clone(),
            Lookup::NotFound => String::new(),
        }
    }
}

/// One context line per catalog product.
pub fn product_context(p: &Product) -> String {
    format!(
        "Product: {}, Code: {}, Segment: {}, PSD: {}, PSCF: {}, Status: {}",
        p.description,
        p.code,
        p.segment,
        p.psd,
        p.pscf,
        p.status.as_str()
    )
}

/// Context for a discontinued hit. Replacement and alternative are always
/// present, as [`NONE_LABEL`] when unknown.
pub fn discontinued_context(record: &DiscontinuedRecord) -> String {
    format!(
        "DISCONTINUED product: {} (code {}). Direct replacement: {}. Recommended alternative: {}.",
        record.description,
        record.code,
        record.replacement.as_deref().unwrap_or(NONE_LABEL),
        record.alternative.as_deref().unwrap_or(NONE_LABEL),
    )
}

/// True when the product's description, code or segment contains `needle`.
/// `needle` must already be lowercase.
pub fn product_matches(product: &Product, needle: &str) -> bool {
    product.description.to_lowercase().contains(needle)
        || product.code.to_lowercase().contains(needle)
        || product.segment.to_lowercase().contains(needle)
}

/// Every product matching `query`, in catalog order. A blank query matches
/// everything.
pub fn filter_catalog<'a>(products: &'a [Product], query: &str) -> Vec<&'a Product> {
    let needle = query.trim().to_lowercase();
    products
        .iter()
        .filter(|p| needle.is_empty() || product_matches(p, &needle))
        .collect()
}

/// Up to `limit` products matching `query`, in catalog order. A blank query
/// matches nothing.
pub fn search_catalog<'a>(products: &'a [Product], query: &str, limit: usize) -> Vec<&'a Product> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    products
        .iter()
        .filter(|p| product_matches(p, &needle))
        .take(limit)
        .collect()
}

/// First discontinued record whose code equals the trimmed query or whose
/// description contains the query, ignoring case.
pub fn find_discontinued<'a>(
    records: &'a [DiscontinuedRecord],
    query: &str,
) -> Option<&'a DiscontinuedRecord> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return None;
    }
    let needle = trimmed.to_lowercase();
    records.iter().find(|r| {
        r.code.trim() == trimmed
            || (!r.description.is_empty() && r.description.to_lowercase().contains(&needle))
    })
}

/// Runs the catalog and discontinued stages. `None` means the caller should
/// continue with the external knowledge stage.
pub fn resolve_local(
    products: &[Product],
    discontinued: &[DiscontinuedRecord],
    query: &str,
    limit: usize,
) -> Option<Lookup> {
    let hits = search_catalog(products, query, limit);
    if !hits.is_empty() {
        return Some(Lookup::Catalog(hits.into_iter().cloned().collect()));
    }
    find_discontinued(discontinued, query).map(|r| Lookup::Discontinued(r.clone()))
}
