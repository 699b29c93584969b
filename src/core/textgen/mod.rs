//! Text-generation collaborator: one request/response call returning
//! generated prose. Used to draft descriptions from BPMN XML, never to
//! mutate a diagram.

use crate::core::error::AppError;
use crate::core::store::{ServiceStore, StepDescriptionRow};
use crate::core::types::ErrorCategory;
use crate::utils::text::clamp_description;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Failures of the generation collaborator, adapted into `AppError` at the
/// drafting boundary.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("generation endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },
    #[error("generation response has no text field")]
    MissingText,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, GenerationError>;
}

/// HTTP-backed generator posting `{model, system, prompt}` and reading
/// back `{text}`.
pub struct HttpTextGenerator {
    http: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpTextGenerator {
    pub fn new(endpoint: &str, model: &str) -> Self {
        HttpTextGenerator {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, GenerationError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&json!({
                "model": self.model,
                "system": system,
                "prompt": prompt,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        payload["text"]
            .as_str()
            .map(str::to_string)
            .ok_or(GenerationError::MissingText)
    }
}

/// Canned generator for tests and offline runs.
pub struct CannedTextGenerator {
    text: String,
}

impl CannedTextGenerator {
    pub fn new(text: &str) -> Self {
        CannedTextGenerator {
            text: text.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerator for CannedTextGenerator {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, GenerationError> {
        Ok(self.text.clone())
    }
}

const DRAFT_SYSTEM: &str = "You summarize administrative business processes. \
Answer with at most two plain prose sentences, no markup, no lists.";

/// Drafts the service-level description from the service's BPMN XML and
/// upserts it as the (service key, null node) description singleton.
pub struct DescriptionDrafter {
    store: Arc<dyn ServiceStore>,
    generator: Arc<dyn TextGenerator>,
}

impl DescriptionDrafter {
    pub fn new(store: Arc<dyn ServiceStore>, generator: Arc<dyn TextGenerator>) -> Self {
        DescriptionDrafter { store, generator }
    }

    pub async fn draft_service_description(&self, service_id: &str) -> Result<String, AppError> {
        let service = self.store.service(service_id).await?.ok_or_else(|| {
            AppError::new(
                ErrorCategory::NoDiagram,
                format!("service '{}' does not exist", service_id),
            )
        })?;
        let xml = service
            .edited_xml
            .as_deref()
            .or(service.original_xml.as_deref())
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::NoDiagram,
                    format!("service '{}' has no diagram to describe", service_id),
                )
            })?;

        let prompt = format!(
            "Describe what the process \"{}\" does for a caseworker:\n\n{}",
            service.name, xml
        );
        let raw = self
            .generator
            .generate(DRAFT_SYSTEM, &prompt)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorCategory::InternalError,
                    "description drafting failed",
                    anyhow::anyhow!(e),
                )
                .with_code("GEN-001")
            })?;
        let text = clamp_description(&raw);

        self.store
            .upsert_description(StepDescriptionRow {
                service_key: service.external_key.clone(),
                node_id: None,
                step_key: None,
                text: text.clone(),
            })
            .await?;

        Ok(text)
    }
}
