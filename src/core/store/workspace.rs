//! Workspace loader: reads a plain directory of JSON/BPMN files into a
//! `MemoryStore` so the CLI can run without a live persistence service.
//!
//! Layout:
//!   service.json          — required, service record (XML via file refs)
//!   subprocesses.json     — optional, list of subprocess records
//!   master_data.json      — optional, list of master-data step rows
//!   descriptions.json     — optional, list of description rows
//! XML file references are resolved relative to the workspace directory.

use crate::core::error::AppError;
use crate::core::store::{
    MasterDataStep, MemoryStore, ServiceRecord, StepDescriptionRow, SubprocessRecord,
};
use crate::core::types::ErrorCategory;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ServiceFile {
    id: String,
    external_key: String,
    name: String,
    owning_unit: Option<String>,
    original_xml_file: Option<String>,
    edited_xml_file: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubprocessFile {
    id: String,
    name: String,
    step_key: Option<String>,
    original_xml_file: Option<String>,
    edited_xml_file: Option<String>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let content = fs::read_to_string(path).map_err(|e| {
        AppError::new(
            ErrorCategory::IoError,
            format!("failed to read {}: {}", path.display(), e),
        )
    })?;
    serde_json::from_str(&content).map_err(|e| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!("failed to parse {}: {}", path.display(), e),
        )
    })
}

fn read_xml_ref(dir: &Path, reference: &Option<String>) -> Result<Option<String>, AppError> {
    match reference {
        None => Ok(None),
        Some(file) => {
            let path = dir.join(file);
            let content = fs::read_to_string(&path).map_err(|e| {
                AppError::new(
                    ErrorCategory::IoError,
                    format!("failed to read {}: {}", path.display(), e),
                )
            })?;
            Ok(Some(content))
        }
    }
}

/// Load a workspace directory into an in-memory store. Returns the store
/// and the id of the service the workspace describes.
pub async fn load_workspace(dir: &Path) -> Result<(MemoryStore, String), AppError> {
    let service_path = dir.join("service.json");
    if !service_path.exists() {
        return Err(AppError::new(
            ErrorCategory::ValidationError,
            format!("{} has no service.json", dir.display()),
        ));
    }
    let service_file: ServiceFile = read_json(&service_path)?;
    let service = ServiceRecord {
        id: service_file.id.clone(),
        external_key: service_file.external_key,
        name: service_file.name,
        owning_unit: service_file.owning_unit,
        original_xml: read_xml_ref(dir, &service_file.original_xml_file)?,
        edited_xml: read_xml_ref(dir, &service_file.edited_xml_file)?,
    };

    let store = MemoryStore::new();
    let service_id = service.id.clone();
    store.insert_service(service).await;

    let subprocesses_path = dir.join("subprocesses.json");
    if subprocesses_path.exists() {
        let files: Vec<SubprocessFile> = read_json(&subprocesses_path)?;
        for file in files {
            store
                .insert_subprocess(SubprocessRecord {
                    id: file.id,
                    service_id: service_id.clone(),
                    name: file.name,
                    step_key: file.step_key,
                    original_xml: read_xml_ref(dir, &file.original_xml_file)?,
                    edited_xml: read_xml_ref(dir, &file.edited_xml_file)?,
                })
                .await;
        }
    }

    let master_data_path = dir.join("master_data.json");
    if master_data_path.exists() {
        let rows: Vec<MasterDataStep> = read_json(&master_data_path)?;
        for row in rows {
            store.insert_master_data(row).await;
        }
    }

    let descriptions_path = dir.join("descriptions.json");
    if descriptions_path.exists() {
        let rows: Vec<StepDescriptionRow> = read_json(&descriptions_path)?;
        for row in rows {
            store.insert_description(row).await;
        }
    }

    Ok((store, service_id))
}
