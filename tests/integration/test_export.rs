use modelbridge::core::blob::{BlobStore, MemoryBlobStore};
use modelbridge::core::bundle::{Bundle, FormArtifact, Manifest, ManifestForm, SubprocessFile};
use modelbridge::core::export::{build_archive, ExportPackager};
use modelbridge::core::types::ErrorCategory;
use serde_json::json;
use std::io::Read;
use std::sync::Arc;
use zip::ZipArchive;

fn bundle() -> Bundle {
    Bundle {
        service_id: "svc-res".into(),
        service_name: "Residence permit".into(),
        main_file: "residence-permit.bpmn".into(),
        main_xml: "<bpmn:definitions/>".into(),
        subprocess_files: vec![SubprocessFile {
            filename: "docs_abcd1234.bpmn".into(),
            xml: "<bpmn:definitions id=\"sub\"/>".into(),
        }],
        forms: vec![FormArtifact {
            node_id: "Task_101".into(),
            node_name: "Check".into(),
            filename: "check_1.form".into(),
            form_id: "Form_check_1".into(),
            content: json!({"id": "Form_check_1", "components": []}),
        }],
        manifest: Manifest {
            main_file: "residence-permit.bpmn".into(),
            subprocesses: vec![],
            forms: vec![ManifestForm {
                node_id: "Task_101".into(),
                node_name: "Check".into(),
                filename: "check_1.form".into(),
                form_id: "Form_check_1".into(),
            }],
        },
    }
}

#[test]
fn archive_has_the_fixed_layout() {
    let bytes = build_archive(&bundle()).unwrap();
    let mut archive = ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();

    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "residence-permit.bpmn",
            "subprocesses/docs_abcd1234.bpmn",
            "forms/check_1.form",
            "manifest.json"
        ]
    );

    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .unwrap()
        .read_to_string(&mut manifest)
        .unwrap();
    assert!(manifest.contains("Form_check_1"));
}

#[tokio::test]
async fn package_writes_files_and_archive_under_one_prefix() {
    let blob = Arc::new(MemoryBlobStore::new());
    let packager = ExportPackager::new(blob.clone());
    let result = packager.package(&bundle()).await.unwrap();

    assert!(result.folder_prefix.starts_with("svc-res/"));
    assert!(result.archive_ref.starts_with("mem://"));

    let paths = blob.paths().await;
    assert_eq!(paths.len(), 5);
    assert!(paths
        .iter()
        .all(|p| p.starts_with(&result.folder_prefix)));
    assert!(paths
        .iter()
        .any(|p| p.ends_with("subprocesses/docs_abcd1234.bpmn")));
    assert!(paths.iter().any(|p| p.ends_with("forms/check_1.form")));
    assert!(paths.iter().any(|p| p.ends_with("manifest.json")));
    assert!(paths.iter().any(|p| p.ends_with("bundle.zip")));

    let archive_bytes = blob
        .get(&format!("{}/bundle.zip", result.folder_prefix))
        .await
        .unwrap()
        .unwrap();
    let archive = ZipArchive::new(std::io::Cursor::new(archive_bytes)).unwrap();
    assert_eq!(archive.len(), 4);
}

/// Blob store that rejects every write.
struct AlwaysFailing;

#[async_trait::async_trait]
impl BlobStore for AlwaysFailing {
    async fn put(
        &self,
        _path: &str,
        _content: &[u8],
        _content_type: &str,
    ) -> Result<(), modelbridge::core::error::AppError> {
        Err(modelbridge::core::error::AppError::new(
            ErrorCategory::StorageError,
            "disk full",
        ))
    }

    async fn get(
        &self,
        _path: &str,
    ) -> Result<Option<Vec<u8>>, modelbridge::core::error::AppError> {
        Ok(None)
    }

    async fn link(&self, _path: &str) -> Result<String, modelbridge::core::error::AppError> {
        Ok(String::new())
    }
}

#[tokio::test]
async fn one_failed_write_aborts_packaging() {
    // A partial archive is a worse outcome than a clear failure.
    let packager = ExportPackager::new(Arc::new(AlwaysFailing));
    let err = packager.package(&bundle()).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::StorageError);
    assert!(err.to_string().contains("disk full"));
}
