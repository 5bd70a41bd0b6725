//! Core data models shared by the catalog, the chat log and the HTTP layer.
//!
//! On-disk shapes keep the keys written by the previous generation of the
//! service (`codigo`, `descricao`, `pergunta`, ...) so existing catalog files
//! and chat logs load unchanged. Rust field names are English.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle status of a catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProductStatus {
    #[default]
    #[serde(rename = "em_linha", alias = "in-line", alias = "active")]
    InLine,
    #[serde(rename = "encerrado", alias = "discontinued")]
    Discontinued,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::InLine => "em_linha",
            ProductStatus::Discontinued => "encerrado",
        }
    }

    /// Parses the query-string form used by the browse endpoint.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "em_linha" | "in-line" | "active" => Some(ProductStatus::InLine),
            "encerrado" | "discontinued" => Some(ProductStatus::Discontinued),
            _ => None,
        }
    }
}

/// An active catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: u64,
    #[serde(rename = "tabela", default, deserialize_with = "de_text")]
    pub table: String,
    #[serde(rename = "unidade", default, deserialize_with = "de_text")]
    pub unit: String,
    #[serde(rename = "segmento", default, deserialize_with = "de_text")]
    pub segment: String,
    #[serde(rename = "codigo", default, deserialize_with = "de_code")]
    pub code: String,
    #[serde(rename = "descricao", default, deserialize_with = "de_text")]
    pub description: String,
    #[serde(default, deserialize_with = "de_price")]
    pub psd: f64,
    #[serde(default, deserialize_with = "de_price")]
    pub pscf: f64,
    #[serde(default, deserialize_with = "de_status")]
    pub status: ProductStatus,
}

/// A legacy product kept only to redirect sellers to its successor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscontinuedRecord {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "substituto")]
    pub replacement: Option<String>,
    #[serde(rename = "indicacao")]
    pub alternative: Option<String>,
}

/// Row shape of the discontinued-products CSV/JSON exports.
///
/// Both the converted export (`codigo,descricao,substituto,indicacao`) and
/// the raw vendor export (`Código Produto,Descrição,Substituto Direto,Indicação`)
/// are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDiscontinued {
    #[serde(
        default,
        alias = "codigo",
        alias = "Código Produto",
        alias = "Código",
        alias = "Codigo",
        deserialize_with = "de_code"
    )]
    pub code: String,
    #[serde(
        default,
        alias = "descricao",
        alias = "Descrição",
        alias = "Descricao"
    )]
    pub description: Option<String>,
    #[serde(
        default,
        alias = "substituto",
        alias = "Substituto Direto",
        deserialize_with = "de_opt_code"
    )]
    pub replacement: Option<String>,
    #[serde(
        default,
        alias = "indicacao",
        alias = "Indicação",
        alias = "Indicacao",
        deserialize_with = "de_opt_code"
    )]
    pub alternative: Option<String>,
}

impl RawDiscontinued {
    pub fn into_record(self) -> DiscontinuedRecord {
        DiscontinuedRecord {
            code: self.code.trim().to_string(),
            description: self.description.unwrap_or_default().trim().to_string(),
            replacement: present(self.replacement),
            alternative: present(self.alternative),
        }
    }
}

/// Blank and `-` placeholders mean "no value" in the vendor exports.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != "-")
}

/// Which stage of the lookup chain produced the context for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "catalog", alias = "Catálogo")]
    Catalog,
    #[serde(rename = "discontinued-list", alias = "Encerrados CSV")]
    DiscontinuedList,
    #[serde(rename = "external-knowledge-api", alias = "WolframAlpha")]
    ExternalKnowledge,
    #[serde(rename = "model", alias = "model-only", alias = "GPT")]
    Model,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Catalog => "catalog",
            Source::DiscontinuedList => "discontinued-list",
            Source::ExternalKnowledge => "external-knowledge-api",
            Source::Model => "model",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One question/answer exchange as persisted in the chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    #[serde(rename = "pergunta", default)]
    pub question: String,
    #[serde(rename = "resposta", default)]
    pub answer: String,
    #[serde(rename = "origem")]
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "data")]
    pub timestamp: DateTime<Utc>,
}

/// Who spoke a [`ChatTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn of the flattened chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

/// A record appended to the datasheet comparison log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonLogEntry {
    pub camera1: String,
    pub camera2: String,
    #[serde(rename = "resultado")]
    pub result: String,
    #[serde(rename = "data")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Product codes appear as JSON numbers in older catalog files.
fn de_code<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let value: Option<Scalar> = Option::deserialize(d)?;
    Ok(value.map(Scalar::into_string).unwrap_or_default())
}

/// `null` and numbers in text columns are read as text.
fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    de_code(d)
}

/// Unknown or missing statuses fall back to in-line.
fn de_status<'de, D: Deserializer<'de>>(d: D) -> Result<ProductStatus, D::Error> {
    let value: Option<Scalar> = Option::deserialize(d)?;
    Ok(value
        .and_then(|v| ProductStatus::parse(&v.into_string()))
        .unwrap_or_default())
}

fn de_opt_code<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value: Option<Scalar> = Option::deserialize(d)?;
    Ok(value.map(Scalar::into_string))
}

fn de_price<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value: Option<Scalar> = Option::deserialize(d)?;
    Ok(match value {
        Some(Scalar::Int(i)) => i as f64,
        Some(Scalar::Float(f)) => f,
        Some(Scalar::Text(s)) => crate::sheet::parse_price(&s),
        _ => 0.0,
    })
}
