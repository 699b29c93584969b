//! Persistence collaborator: five record kinds behind an object-safe
//! async trait, with an in-memory implementation used by the CLI workspace
//! loader and by tests.

use crate::core::error::AppError;
use crate::core::types::JobState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod workspace;

pub use workspace::load_workspace;

/// Top-level business process for one service. The edited XML wins over
/// the originally-generated XML when present and not flagged corrupted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    /// Stable key shared with the upstream master-data source.
    pub external_key: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_xml: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_xml: Option<String>,
}

/// Child process invoked from one call-activity in the parent service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubprocessRecord {
    pub id: String,
    pub service_id: String,
    pub name: String,
    /// External step identifier binding the parent call-activity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_xml: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_xml: Option<String>,
}

/// One upstream master-data row for a process step. Reference links are
/// kept as the source's delimited fields, not discrete rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterDataStep {
    pub service_key: String,
    pub step_key: String,
    pub step_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Semicolon/comma-delimited URLs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_urls: Option<String>,
    /// Semicolon-delimited titles aligned with the URLs; gaps are legal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_titles: Option<String>,
}

/// Authored description row, upserted keyed by (service key, node id).
/// A None node id is the service-level description singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescriptionRow {
    pub service_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,
    pub text: String,
}

/// Progress row written by transfer/export jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusRow {
    pub id: Uuid,
    pub kind: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusRow {
    pub fn new(kind: &str) -> Self {
        JobStatusRow {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            state: JobState::Pending,
            message: None,
            updated_at: Utc::now(),
        }
    }

    pub fn advance(mut self, state: JobState, message: Option<String>) -> Self {
        self.state = state;
        self.message = message;
        self.updated_at = Utc::now();
        self
    }
}

/// Row-oriented persistence collaborator.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn service(&self, service_id: &str) -> Result<Option<ServiceRecord>, AppError>;

    async fn subprocesses(&self, service_id: &str) -> Result<Vec<SubprocessRecord>, AppError>;

    async fn master_data_steps(&self, service_key: &str) -> Result<Vec<MasterDataStep>, AppError>;

    /// Description row for one step key, any node.
    async fn step_description_by_key(
        &self,
        service_key: &str,
        step_key: &str,
    ) -> Result<Option<StepDescriptionRow>, AppError>;

    /// Description row keyed by node id.
    async fn node_description(
        &self,
        service_key: &str,
        node_id: &str,
    ) -> Result<Option<StepDescriptionRow>, AppError>;

    /// The service-level description singleton (node id None).
    async fn service_description(
        &self,
        service_key: &str,
    ) -> Result<Option<StepDescriptionRow>, AppError>;

    /// Upsert keyed by (service key, node id).
    async fn upsert_description(&self, row: StepDescriptionRow) -> Result<(), AppError>;

    async fn save_edited_xml(&self, service_id: &str, xml: &str) -> Result<(), AppError>;

    async fn job_status(&self, id: Uuid) -> Result<Option<JobStatusRow>, AppError>;

    async fn upsert_job_status(&self, row: JobStatusRow) -> Result<(), AppError>;
}

#[derive(Default, Debug)]
struct MemoryInner {
    services: HashMap<String, ServiceRecord>,
    subprocesses: Vec<SubprocessRecord>,
    master_data: Vec<MasterDataStep>,
    descriptions: Vec<StepDescriptionRow>,
    jobs: HashMap<Uuid, JobStatusRow>,
}

/// In-memory store used by the CLI workspace mode and by tests.
#[derive(Default, Debug)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_service(&self, record: ServiceRecord) {
        self.inner
            .write()
            .await
            .services
            .insert(record.id.clone(), record);
    }

    pub async fn insert_subprocess(&self, record: SubprocessRecord) {
        self.inner.write().await.subprocesses.push(record);
    }

    pub async fn insert_master_data(&self, row: MasterDataStep) {
        self.inner.write().await.master_data.push(row);
    }

    pub async fn insert_description(&self, row: StepDescriptionRow) {
        self.inner.write().await.descriptions.push(row);
    }
}

#[async_trait]
impl ServiceStore for MemoryStore {
    async fn service(&self, service_id: &str) -> Result<Option<ServiceRecord>, AppError> {
        Ok(self.inner.read().await.services.get(service_id).cloned())
    }

    async fn subprocesses(&self, service_id: &str) -> Result<Vec<SubprocessRecord>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .subprocesses
            .iter()
            .filter(|s| s.service_id == service_id)
            .cloned()
            .collect())
    }

    async fn master_data_steps(&self, service_key: &str) -> Result<Vec<MasterDataStep>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .master_data
            .iter()
            .filter(|m| m.service_key == service_key)
            .cloned()
            .collect())
    }

    async fn step_description_by_key(
        &self,
        service_key: &str,
        step_key: &str,
    ) -> Result<Option<StepDescriptionRow>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .descriptions
            .iter()
            .find(|d| d.service_key == service_key && d.step_key.as_deref() == Some(step_key))
            .cloned())
    }

    async fn node_description(
        &self,
        service_key: &str,
        node_id: &str,
    ) -> Result<Option<StepDescriptionRow>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .descriptions
            .iter()
            .find(|d| d.service_key == service_key && d.node_id.as_deref() == Some(node_id))
            .cloned())
    }

    async fn service_description(
        &self,
        service_key: &str,
    ) -> Result<Option<StepDescriptionRow>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .descriptions
            .iter()
            .find(|d| d.service_key == service_key && d.node_id.is_none())
            .cloned())
    }

    async fn upsert_description(&self, row: StepDescriptionRow) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .descriptions
            .iter_mut()
            .find(|d| d.service_key == row.service_key && d.node_id == row.node_id)
        {
            *existing = row;
        } else {
            inner.descriptions.push(row);
        }
        Ok(())
    }

    async fn save_edited_xml(&self, service_id: &str, xml: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        match inner.services.get_mut(service_id) {
            Some(service) => {
                service.edited_xml = Some(xml.to_string());
                Ok(())
            }
            None => Err(AppError::new(
                crate::core::types::ErrorCategory::PersistenceError,
                format!("unknown service '{}'", service_id),
            )),
        }
    }

    async fn job_status(&self, id: Uuid) -> Result<Option<JobStatusRow>, AppError> {
        Ok(self.inner.read().await.jobs.get(&id).cloned())
    }

    async fn upsert_job_status(&self, row: JobStatusRow) -> Result<(), AppError> {
        self.inner.write().await.jobs.insert(row.id, row);
        Ok(())
    }
}
