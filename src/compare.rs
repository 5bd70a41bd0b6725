//! Datasheet comparison proxy.
//!
//! Two uploaded datasheets are staged under the upload `tmp` directory, the
//! staged files are sent to the extraction service (`multipart: datasheet1, datasheet2` →
//! `{camera1, camera2}`), and the extracted records are turned into a
//! comparison by the language model. Staged files are removed only after the
//! extraction succeeds.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use salesdesk_core::models::ComparisonLogEntry;

use crate::chat_log::JsonlWriter;
use crate::config::Config;
use crate::llm::{ChatMessage, ChatModel, CompletionRequest};

/// Returned when the model produces no comparison.
pub const COMPARISON_FALLBACK: &str = "Could not obtain a comparison.";

/// One uploaded datasheet.
#[derive(Debug, Clone)]
pub struct Datasheet {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

pub struct Comparator {
    client: reqwest::Client,
    extraction_url: String,
    tmp_dir: PathBuf,
    model: Arc<dyn ChatModel>,
    log: JsonlWriter,
    max_tokens: u32,
    temperature: f32,
    preferred_brand: Option<String>,
}

impl Comparator {
    pub fn new(config: &Config, model: Arc<dyn ChatModel>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.extraction.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            extraction_url: config.extraction.url.clone(),
            tmp_dir: config.uploads.tmp_dir(),
            model,
            log: JsonlWriter::new(config.logs.comparison_log.clone()),
            max_tokens: config.llm.comparison_max_tokens,
            temperature: config.llm.comparison_temperature,
            preferred_brand: config.llm.preferred_brand.clone(),
        })
    }

    /// Compares two datasheets and returns the model's text verbatim.
    pub async fn compare(&self, first: Datasheet, second: Datasheet) -> Result<String> {
        let staged = [
            self.stage(&first).await?,
            self.stage(&second).await?,
        ];

        let (camera1, camera2) = self
            .extract(
                (staged[0].as_path(), first.file_name.as_str()),
                (staged[1].as_path(), second.file_name.as_str()),
            )
            .await?;

        for path in &staged {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!(path = %path.display(), error = %e, "could not remove staged datasheet");
            }
        }

        let request = CompletionRequest {
            messages: vec![ChatMessage::user(comparison_prompt(
                &camera1,
                &camera2,
                self.preferred_brand.as_deref(),
            ))],
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
        };
        let comparison = match self.model.complete(&request).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "comparison completion failed");
                COMPARISON_FALLBACK.to_string()
            }
        };

        self.log
            .append(&ComparisonLogEntry {
                camera1: first.file_name,
                camera2: second.file_name,
                result: comparison.clone(),
                timestamp: Utc::now(),
            })
            .await?;

        Ok(comparison)
    }

    async fn stage(&self, sheet: &Datasheet) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.tmp_dir)
            .await
            .with_context(|| format!("failed to create {}", self.tmp_dir.display()))?;
        let path = self.tmp_dir.join(Uuid::new_v4().to_string());
        tokio::fs::write(&path, &sheet.bytes)
            .await
            .with_context(|| format!("failed to stage {}", sheet.file_name))?;
        Ok(path)
    }

    async fn extract(&self, first: (&Path, &str), second: (&Path, &str)) -> Result<(Value, Value)> {
        let form = Form::new()
            .part("datasheet1", pdf_part(first.0, first.1).await?)
            .part("datasheet2", pdf_part(second.0, second.1).await?);

        let response = self
            .client
            .post(&self.extraction_url)
            .multipart(form)
            .send()
            .await
            .context("extraction service unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("extraction service error {}: {}", status, body);
        }

        let mut json: Value = response
            .json()
            .await
            .context("extraction service returned invalid JSON")?;
        let camera1 = json.get_mut("camera1").map(Value::take);
        let camera2 = json.get_mut("camera2").map(Value::take);
        match (camera1, camera2) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => bail!("extraction service response lacks camera1/camera2"),
        }
    }
}

/// Multipart part carrying a staged file under its uploaded name.
async fn pdf_part(staged: &Path, file_name: &str) -> Result<Part> {
    let bytes = tokio::fs::read(staged)
        .await
        .with_context(|| format!("failed to read staged {}", staged.display()))?;
    Ok(Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str("application/pdf")?)
}

/// `"<fabricante> <modelo_produto>"` of an extracted record.
fn camera_label(camera: &Value) -> String {
    let maker = camera.get("fabricante").and_then(Value::as_str).unwrap_or("");
    let model = camera
        .get("modelo_produto")
        .and_then(Value::as_str)
        .unwrap_or("Unknown model");
    format!("{} {}", maker, model).trim().to_string()
}

/// Prompt asking for a feature table, strengths and weaknesses, and a verdict.
pub fn comparison_prompt(camera1: &Value, camera2: &Value, preferred_brand: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are the technical sales specialist of a security products distributor. \
Compare the two IP cameras below for a seller.\n\n\
1. Comparison table: a Markdown table with the columns \"Feature\", \"Camera 1\" and \
\"Camera 2\". Pick the 8 to 10 most important features only. Write \"-\" when a value is \
missing.\n\
2. Strengths and weaknesses: for each camera, 2 or 3 strengths and 1 or 2 weaknesses \
based on the data.\n\
3. Verdict: a clear recommendation.\n",
    );

    if let Some(brand) = preferred_brand {
        prompt.push_str(&format!(
            "   When performance is similar or the competitor's advantage is small, recommend the \
{brand} camera. When the other camera is clearly superior on a key point, acknowledge it and \
position {brand} as the best value with the strongest after-sales support.\n",
        ));
    }

    prompt.push_str(
        "4. End with a short notice that this comparison was generated by AI and technical \
details should be confirmed before closing the order.\n\n",
    );

    for (i, camera) in [camera1, camera2].into_iter().enumerate() {
        let pretty = serde_json::to_string_pretty(camera).unwrap_or_else(|_| camera.to_string());
        prompt.push_str(&format!(
            "**Camera {}: {}**\n```json\n{}\n```\n\n",
            i + 1,
            camera_label(camera),
            pretty
        ));
    }
    prompt
}
