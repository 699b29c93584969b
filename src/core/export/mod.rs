//! Export sink: persists a bundle's files under a service/timestamp blob
//! prefix and produces a single archive with fixed subfolder names. A
//! failed individual write aborts packaging — a partial archive is a worse
//! outcome than a clear failure for this sink.

use crate::core::blob::BlobStore;
use crate::core::bundle::Bundle;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Write};
use std::sync::Arc;
use tracing::info;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// Fixed archive layout.
const SUBPROCESS_DIR: &str = "subprocesses";
const FORMS_DIR: &str = "forms";
const MANIFEST_FILE: &str = "manifest.json";
const ARCHIVE_FILE: &str = "bundle.zip";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    /// Blob prefix every file of this run lives under.
    pub folder_prefix: String,
    /// Retrievable reference to the archive.
    pub archive_ref: String,
}

pub struct ExportPackager {
    blob: Arc<dyn BlobStore>,
}

impl ExportPackager {
    pub fn new(blob: Arc<dyn BlobStore>) -> Self {
        ExportPackager { blob }
    }

    /// Write every bundle file plus the archive under a fresh
    /// service/timestamp prefix and return the archive reference.
    pub async fn package(&self, bundle: &Bundle) -> Result<ExportResult, AppError> {
        let prefix = format!(
            "{}/{}",
            bundle.service_id,
            Utc::now().format("%Y%m%d-%H%M%S")
        );

        self.blob
            .put(
                &format!("{}/{}", prefix, bundle.main_file),
                bundle.main_xml.as_bytes(),
                "application/xml",
            )
            .await?;

        for subprocess in &bundle.subprocess_files {
            self.blob
                .put(
                    &format!("{}/{}/{}", prefix, SUBPROCESS_DIR, subprocess.filename),
                    subprocess.xml.as_bytes(),
                    "application/xml",
                )
                .await?;
        }

        for form in &bundle.forms {
            self.blob
                .put(
                    &format!("{}/{}/{}", prefix, FORMS_DIR, form.filename),
                    form.content.to_string().as_bytes(),
                    "application/json",
                )
                .await?;
        }

        let manifest = serde_json::to_vec_pretty(&bundle.manifest)?;
        self.blob
            .put(
                &format!("{}/{}", prefix, MANIFEST_FILE),
                &manifest,
                "application/json",
            )
            .await?;

        let archive = build_archive(bundle)?;
        let archive_path = format!("{}/{}", prefix, ARCHIVE_FILE);
        self.blob
            .put(&archive_path, &archive, "application/zip")
            .await?;
        let archive_ref = self.blob.link(&archive_path).await?;

        info!(
            "exported bundle for '{}' under {} ({} files + archive)",
            bundle.service_name,
            prefix,
            1 + bundle.subprocess_files.len() + bundle.forms.len() + 1
        );

        Ok(ExportResult {
            folder_prefix: prefix,
            archive_ref,
        })
    }
}

/// Serialize the bundle into one zip archive with the fixed layout:
/// main BPMN at the root, subprocesses/ and forms/ subfolders, manifest.
pub fn build_archive(bundle: &Bundle) -> Result<Vec<u8>, AppError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut add = |zip: &mut ZipWriter<&mut Cursor<Vec<u8>>>,
                       name: String,
                       content: &[u8]|
         -> Result<(), AppError> {
            zip.start_file(name.clone(), options).map_err(|e| {
                AppError::new(
                    ErrorCategory::StorageError,
                    format!("failed to add '{}' to archive: {}", name, e),
                )
            })?;
            zip.write_all(content).map_err(|e| {
                AppError::new(
                    ErrorCategory::StorageError,
                    format!("failed to write '{}' into archive: {}", name, e),
                )
            })
        };

        add(&mut zip, bundle.main_file.clone(), bundle.main_xml.as_bytes())?;
        for subprocess in &bundle.subprocess_files {
            add(
                &mut zip,
                format!("{}/{}", SUBPROCESS_DIR, subprocess.filename),
                subprocess.xml.as_bytes(),
            )?;
        }
        for form in &bundle.forms {
            add(
                &mut zip,
                format!("{}/{}", FORMS_DIR, form.filename),
                form.content.to_string().as_bytes(),
            )?;
        }
        add(
            &mut zip,
            MANIFEST_FILE.to_string(),
            &serde_json::to_vec_pretty(&bundle.manifest)?,
        )?;

        zip.finish().map_err(|e| {
            AppError::new(
                ErrorCategory::StorageError,
                format!("failed to finalize archive: {}", e),
            )
        })?;
    }
    Ok(cursor.into_inner())
}
