//! External knowledge fallback.
//!
//! Used only when neither the catalog nor the discontinued list knows the
//! query. The answer is best-effort: every failure collapses into `None` so
//! the chat pipeline continues with an empty context.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::KnowledgeConfig;

/// A source of short plain-text answers to free-text questions.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// `None` means "no answer", whatever the reason.
    async fn short_answer(&self, query: &str) -> Option<String>;
}

/// WolframAlpha short-answers API (`GET <endpoint>?i=<query>&appid=<id>`).
pub struct WolframShortAnswer {
    client: reqwest::Client,
    endpoint: String,
    app_id: Option<String>,
}

impl WolframShortAnswer {
    pub fn new(config: &KnowledgeConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint.clone(),
            app_id: config.app_id(),
        })
    }
}

#[async_trait]
impl KnowledgeSource for WolframShortAnswer {
    async fn short_answer(&self, query: &str) -> Option<String> {
        let Some(app_id) = self.app_id.as_deref() else {
            tracing::warn!("knowledge API app id not set, skipping");
            return None;
        };

        let response = match self
            .client
            .get(&self.endpoint)
            .query(&[("i", query), ("appid", app_id)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "knowledge API request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "knowledge API returned no answer");
            return None;
        }

        match response.text().await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "knowledge API body unreadable");
                None
            }
        }
    }
}

/// A [`KnowledgeSource`] that never answers. Used when the stage is disabled.
pub struct NoKnowledge;

#[async_trait]
impl KnowledgeSource for NoKnowledge {
    async fn short_answer(&self, _query: &str) -> Option<String> {
        None
    }
}

/// The configured knowledge stage: the short-answers API, or [`NoKnowledge`]
/// when `enabled = false`.
pub fn from_config(config: &KnowledgeConfig) -> anyhow::Result<Arc<dyn KnowledgeSource>> {
    if config.enabled {
        Ok(Arc::new(WolframShortAnswer::new(config)?))
    } else {
        Ok(Arc::new(NoKnowledge))
    }
}
