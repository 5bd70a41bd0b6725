//! The chat pipeline: lookup chain, response composer and logging.
//!
//! ```text
//! query ──▶ catalog ──▶ discontinued ──▶ knowledge API ──▶ (nothing)
//!                  └────────────┴──────────────┴─────────────┘
//!                                   │ context + source
//!                                   ▼
//!                            language model ──▶ reply ──▶ chat log
//! ```
//!
//! A model failure does not lose the exchange: the fixed [`FALLBACK_REPLY`]
//! is logged in place of the answer and the caller is told the reply is
//! degraded.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

use salesdesk_core::lookup::Lookup;
use salesdesk_core::models::{ChatLogEntry, Source};

use crate::catalog::CatalogStore;
use crate::chat_log::ChatLog;
use crate::config::LlmConfig;
use crate::knowledge::KnowledgeSource;
use crate::llm::{ChatMessage, ChatModel, CompletionRequest};

/// Reply shown when the language model cannot be reached.
pub const FALLBACK_REPLY: &str =
    "Sorry, I could not generate an answer right now. Please try again in a moment.";

/// Default assistant instruction.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a sales assistant for a distributor of \
security, networking, communication and energy products. Answer sellers briefly and \
objectively using the context provided. When a product is discontinued, always point to its \
direct replacement or recommended alternative. Use at most six lines. End every answer with: \
\"This answer was generated by AI and may contain mistakes.\"";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub reply: String,
    pub source: Source,
    /// True when `reply` is [`FALLBACK_REPLY`] because the model call failed.
    pub degraded: bool,
}

pub struct Assistant {
    catalog: Arc<CatalogStore>,
    knowledge: Arc<dyn KnowledgeSource>,
    model: Arc<dyn ChatModel>,
    log: Arc<ChatLog>,
    system_prompt: String,
    max_tokens: u32,
}

impl Assistant {
    pub fn new(
        catalog: Arc<CatalogStore>,
        knowledge: Arc<dyn KnowledgeSource>,
        model: Arc<dyn ChatModel>,
        log: Arc<ChatLog>,
        config: &LlmConfig,
    ) -> Self {
        Self {
            catalog,
            knowledge,
            model,
            log,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: config.chat_max_tokens,
        }
    }

    /// Runs the lookup chain. Only reaches the knowledge API when both local
    /// stages come up empty.
    pub async fn lookup(&self, query: &str) -> Lookup {
        if let Some(hit) = self.catalog.resolve_local(query) {
            return hit;
        }
        match self.knowledge.short_answer(query).await {
            Some(answer) => Lookup::External(answer),
            None => Lookup::NotFound,
        }
    }

    /// Messages sent to the model for `query` with `context`.
    pub fn messages(&self, context: &str, query: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::system(format!("Context:\n{}", context)),
            ChatMessage::user(query),
        ]
    }

    /// Answers `query` and appends the exchange to the chat log.
    ///
    /// Errors only when the log write fails; model failures produce a
    /// degraded reply instead.
    pub async fn answer(&self, query: &str, username: Option<&str>) -> Result<ChatReply> {
        let hit = self.lookup(query).await;
        let source = hit.source();
        tracing::debug!(%source, "lookup resolved");

        let request = CompletionRequest {
            messages: self.messages(&hit.context(), query),
            max_tokens: self.max_tokens,
            temperature: None,
        };

        let (reply, degraded) = match self.model.complete(&request).await {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::error!(error = %e, model = self.model.model_name(), "chat completion failed");
                (FALLBACK_REPLY.to_string(), true)
            }
        };

        self.log
            .append(ChatLogEntry {
                question: query.to_string(),
                answer: reply.clone(),
                source,
                username: username.map(str::to_string),
                timestamp: Utc::now(),
            })
            .await?;

        Ok(ChatReply {
            reply,
            source,
            degraded,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records requests and replies with a canned answer, or fails.
    pub(crate) struct FakeModel {
        pub reply: Option<String>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl FakeModel {
        pub fn answering(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                reply: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        fn model_name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            self.reply
                .clone()
                .ok_or_else(|| anyhow::anyhow!("invalid chat completion response"))
        }
    }

    pub(crate) struct FakeKnowledge {
        pub answer: Option<String>,
        pub calls: Mutex<usize>,
    }

    impl FakeKnowledge {
        pub fn new(answer: Option<&str>) -> Self {
            Self {
                answer: answer.map(str::to_string),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl KnowledgeSource for FakeKnowledge {
        async fn short_answer(&self, _query: &str) -> Option<String> {
            *self.calls.lock().unwrap() += 1;
            self.answer.clone()
        }
    }

    const PRODUCTS: &str = r#"[
        {"id":1,"segmento":"REDES","codigo":"4750021","descricao":"Roteador Wi-Fi 6","psd":199.9,"pscf":249.9}
    ]"#;
    const CSV: &str = "codigo,descricao,substituto,indicacao\n1234,Central antiga,5678,-\n";

    struct Harness {
        _tmp: TempDir,
        assistant: Assistant,
        model: Arc<FakeModel>,
        knowledge: Arc<FakeKnowledge>,
        log: Arc<ChatLog>,
    }

    fn harness(model: FakeModel, knowledge: FakeKnowledge) -> Harness {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("produtos.json"), PRODUCTS).unwrap();
        std::fs::write(tmp.path().join("encerramentos.csv"), CSV).unwrap();
        let catalog = Arc::new(CatalogStore::load(&CatalogConfig {
            products_path: tmp.path().join("produtos.json"),
            discontinued_csv: tmp.path().join("encerramentos.csv"),
            discontinued_json: None,
            search_limit: 3,
        }));
        let model = Arc::new(model);
        let knowledge = Arc::new(knowledge);
        let log = Arc::new(ChatLog::open(tmp.path().join("chat.jsonl")));
        let assistant = Assistant::new(
            catalog,
            knowledge.clone(),
            model.clone(),
            log.clone(),
            &LlmConfig::default(),
        );
        Harness {
            _tmp: tmp,
            assistant,
            model,
            knowledge,
            log,
        }
    }

    #[tokio::test]
    async fn test_catalog_hit_skips_knowledge_api() {
        let h = harness(FakeModel::answering("R$ 199,90"), FakeKnowledge::new(Some("x")));
        let reply = h.assistant.answer("roteador", Some("ana")).await.unwrap();

        assert_eq!(reply.source, Source::Catalog);
        assert!(!reply.degraded);
        assert_eq!(*h.knowledge.calls.lock().unwrap(), 0);

        let requests = h.model.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, 300);
        assert!(requests[0].messages[1].content.contains("Code: 4750021"));
        assert_eq!(requests[0].messages[2].content, "roteador");
    }

    #[tokio::test]
    async fn test_discontinued_code_names_replacement() {
        let h = harness(FakeModel::answering("use 5678"), FakeKnowledge::new(None));
        let reply = h.assistant.answer("1234", None).await.unwrap();

        assert_eq!(reply.source, Source::DiscontinuedList);
        let requests = h.model.requests.lock().unwrap();
        let context = &requests[0].messages[1].content;
        assert!(context.contains("5678"));
        assert!(context.contains("Recommended alternative: none"));
    }

    #[tokio::test]
    async fn test_knowledge_then_model_only() {
        let h = harness(FakeModel::answering("ok"), FakeKnowledge::new(Some("42")));
        let reply = h.assistant.answer("meaning of life", None).await.unwrap();
        assert_eq!(reply.source, Source::ExternalKnowledge);

        let h = harness(FakeModel::answering("ok"), FakeKnowledge::new(None));
        let reply = h.assistant.answer("meaning of life", None).await.unwrap();
        assert_eq!(reply.source, Source::Model);
        let requests = h.model.requests.lock().unwrap();
        assert_eq!(requests[0].messages[1].content, "Context:\n");
    }

    #[tokio::test]
    async fn test_model_failure_logs_fallback() {
        let h = harness(FakeModel::failing(), FakeKnowledge::new(None));
        let reply = h.assistant.answer("roteador", Some("ana")).await.unwrap();

        assert!(reply.degraded);
        assert_eq!(reply.reply, FALLBACK_REPLY);
        let entries = h.log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].answer, FALLBACK_REPLY);
        assert_eq!(entries[0].username.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn test_custom_system_prompt() {
        let h = harness(FakeModel::answering("ok"), FakeKnowledge::new(None));
        let config = LlmConfig {
            system_prompt: Some("Responda em português.".to_string()),
            ..LlmConfig::default()
        };
        let assistant = Assistant::new(
            h.assistant.catalog.clone(),
            h.knowledge.clone(),
            h.model.clone(),
            h.log.clone(),
            &config,
        );
        let messages = assistant.messages("", "oi");
        assert_eq!(messages[0].content, "Responda em português.");
    }
}
