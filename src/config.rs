//! TOML configuration.
//!
//! Every path the service touches (catalog files, logs, upload directory,
//! database) comes from here. Secrets are never stored in the file: the
//! `[llm]` and `[knowledge]` sections name the environment variables that
//! hold them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    /// Maximum request body, in bytes. Applies to multipart uploads.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_body_limit() -> usize {
    25 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_products_path")]
    pub products_path: PathBuf,
    #[serde(default = "default_discontinued_csv")]
    pub discontinued_csv: PathBuf,
    #[serde(default)]
    pub discontinued_json: Option<PathBuf>,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            products_path: default_products_path(),
            discontinued_csv: default_discontinued_csv(),
            discontinued_json: None,
            search_limit: default_search_limit(),
        }
    }
}

fn default_products_path() -> PathBuf {
    PathBuf::from("./data/produtos.json")
}
fn default_discontinued_csv() -> PathBuf {
    PathBuf::from("./data/encerramentos.csv")
}
fn default_search_limit() -> usize {
    salesdesk_core::lookup::CATALOG_MATCH_LIMIT
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogsConfig {
    #[serde(default = "default_chat_log")]
    pub chat_log: PathBuf,
    #[serde(default = "default_comparison_log")]
    pub comparison_log: PathBuf,
    #[serde(default = "default_analysis_path")]
    pub analysis_path: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            chat_log: default_chat_log(),
            comparison_log: default_comparison_log(),
            analysis_path: default_analysis_path(),
        }
    }
}

fn default_chat_log() -> PathBuf {
    PathBuf::from("./data/chat_logs.jsonl")
}
fn default_comparison_log() -> PathBuf {
    PathBuf::from("./data/comparison_logs.jsonl")
}
fn default_analysis_path() -> PathBuf {
    PathBuf::from("./data/analise_logs.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    /// Root for temporary uploads (`<dir>/tmp`) and archived sheets (`<dir>/backup`).
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
        }
    }
}

impl UploadsConfig {
    pub fn tmp_dir(&self) -> PathBuf {
        self.dir.join("tmp")
    }
    pub fn backup_dir(&self) -> PathBuf {
        self.dir.join("backup")
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    #[serde(default = "default_seed_username")]
    pub seed_username: String,
    /// Used when `SALESDESK_ADMIN_PASSWORD` is not set.
    #[serde(default)]
    pub seed_password: Option<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            seed_username: default_seed_username(),
            seed_password: None,
        }
    }
}

impl AdminConfig {
    pub fn seed_password(&self) -> Option<String> {
        std::env::var("SALESDESK_ADMIN_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty())
            .or_else(|| self.seed_password.clone())
    }
}

fn default_seed_username() -> String {
    "admin".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,
    #[serde(default = "default_comparison_max_tokens")]
    pub comparison_max_tokens: u32,
    #[serde(default = "default_comparison_temperature")]
    pub comparison_temperature: f32,
    /// Replaces the built-in assistant instruction when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Brand the comparison verdict should favour when the specs are close.
    #[serde(default)]
    pub preferred_brand: Option<String>,
    /// No timeout when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            api_key_env: default_llm_key_env(),
            chat_max_tokens: default_chat_max_tokens(),
            comparison_max_tokens: default_comparison_max_tokens(),
            comparison_temperature: default_comparison_temperature(),
            system_prompt: None,
            preferred_brand: None,
            timeout_secs: None,
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_chat_max_tokens() -> u32 {
    300
}
fn default_comparison_max_tokens() -> u32 {
    1024
}
fn default_comparison_temperature() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_knowledge_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_knowledge_env")]
    pub app_id_env: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_knowledge_endpoint(),
            app_id_env: default_knowledge_env(),
            timeout_secs: None,
        }
    }
}

impl KnowledgeConfig {
    pub fn app_id(&self) -> Option<String> {
        std::env::var(&self.app_id_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

fn default_true() -> bool {
    true
}
fn default_knowledge_endpoint() -> String {
    "https://api.wolframalpha.com/v1/result".to_string()
}
fn default_knowledge_env() -> String {
    "WOLFRAM_APP_ID".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_extraction_url")]
    pub url: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            url: default_extraction_url(),
            timeout_secs: None,
        }
    }
}

fn default_extraction_url() -> String {
    "http://localhost:5001/processar-datasheets".to_string()
}

impl Config {
    /// A configuration with every file under `root`. Upstream endpoints keep
    /// their defaults.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:5000".to_string(),
                body_limit: default_body_limit(),
            },
            db: DbConfig {
                path: root.join("users.sqlite"),
            },
            catalog: CatalogConfig {
                products_path: root.join("produtos.json"),
                discontinued_csv: root.join("encerramentos.csv"),
                discontinued_json: None,
                search_limit: default_search_limit(),
            },
            logs: LogsConfig {
                chat_log: root.join("chat_logs.jsonl"),
                comparison_log: root.join("comparison_logs.jsonl"),
                analysis_path: root.join("analise_logs.json"),
            },
            uploads: UploadsConfig {
                dir: root.join("uploads"),
            },
            admin: AdminConfig::default(),
            llm: LlmConfig::default(),
            knowledge: KnowledgeConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.catalog.search_limit == 0 {
        anyhow::bail!("catalog.search_limit must be >= 1");
    }

    if config.llm.chat_max_tokens == 0 || config.llm.comparison_max_tokens == 0 {
        anyhow::bail!("llm.chat_max_tokens and llm.comparison_max_tokens must be > 0");
    }

    if !(0.0..=2.0).contains(&config.llm.comparison_temperature) {
        anyhow::bail!("llm.comparison_temperature must be in [0.0, 2.0]");
    }

    if config.admin.seed_username.trim().is_empty() {
        anyhow::bail!("admin.seed_username must not be empty");
    }

    for (name, url) in [
        ("llm.endpoint", &config.llm.endpoint),
        ("knowledge.endpoint", &config.knowledge.endpoint),
        ("extraction.url", &config.extraction.url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("{} must be an http(s) URL, got '{}'", name, url);
        }
    }

    Ok(())
}
