use modelbridge::core::bundle::{Bundle, FormArtifact, Manifest, SubprocessFile};
use modelbridge::core::config::ModelerConfig;
use modelbridge::core::transfer::TransferEngine;
use modelbridge::core::types::{ErrorCategory, TransferStatus};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, id_env: &str, secret_env: &str) -> ModelerConfig {
    std::env::set_var(id_env, "client-under-test");
    std::env::set_var(secret_env, "secret-under-test");
    ModelerConfig {
        base_url: server.uri(),
        token_url: format!("{}/oauth/token", server.uri()),
        audience: "api.test".into(),
        client_id_env: id_env.into(),
        client_secret_env: secret_env.into(),
        project_name: None,
        max_attempts: 3,
        backoff_unit_ms: 1,
        pacing_ms: 1,
        token_margin_secs: 10,
    }
}

fn bundle() -> Bundle {
    Bundle {
        service_id: "svc-res".into(),
        service_name: "Residence permit".into(),
        main_file: "residence-permit.bpmn".into(),
        main_xml: "<bpmn:definitions/>".into(),
        subprocess_files: vec![SubprocessFile {
            filename: "docs_abcd1234.bpmn".into(),
            xml: "<bpmn:definitions/>".into(),
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
            forms: vec![],
        },
    }
}

async fn mount_happy_auth_and_project(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-1",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "proj-1", "name": "Residence permit" }]
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects/proj-1/folders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "folder-1" })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn complete_transfer_uploads_every_file_in_order() {
    let server = MockServer::start().await;
    mount_happy_auth_and_project(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "file-x" })))
        .expect(3)
        .mount(&server)
        .await;

    let engine = TransferEngine::new(config_for(&server, "XFER_OK_ID", "XFER_OK_SECRET")).unwrap();
    let result = engine.transfer(&bundle()).await.unwrap();

    assert_eq!(result.status, TransferStatus::Complete);
    assert_eq!(result.project_id, "proj-1");
    assert_eq!(result.folder_id, "folder-1");
    let names: Vec<&str> = result.uploaded.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["residence-permit.bpmn", "docs_abcd1234.bpmn", "check_1.form"]
    );
    assert!(result.failed.is_empty());
}

#[tokio::test]
async fn token_is_cached_across_uploads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-1",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "proj-new" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects/proj-new/folders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "folder-1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "file-x" })))
        .mount(&server)
        .await;

    let engine =
        TransferEngine::new(config_for(&server, "XFER_CACHE_ID", "XFER_CACHE_SECRET")).unwrap();
    let result = engine.transfer(&bundle()).await.unwrap();
    assert_eq!(result.status, TransferStatus::Complete);
    // The mock's expect(1) verifies the single token request on drop.
}

#[tokio::test]
async fn file_succeeding_on_third_attempt_counts_as_uploaded() {
    let server = MockServer::start().await;
    mount_happy_auth_and_project(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/files"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "file-1" })))
        .mount(&server)
        .await;

    let engine =
        TransferEngine::new(config_for(&server, "XFER_RETRY_ID", "XFER_RETRY_SECRET")).unwrap();
    let mut single = bundle();
    single.subprocess_files.clear();
    single.forms.clear();
    let result = engine.transfer(&single).await.unwrap();

    assert_eq!(result.status, TransferStatus::Complete);
    assert_eq!(result.uploaded.len(), 1);
    assert!(result.failed.is_empty());
}

#[tokio::test]
async fn exhausted_file_is_recorded_and_the_batch_continues() {
    let server = MockServer::start().await;
    mount_happy_auth_and_project(&server).await;
    // The main file always fails; everything else uploads fine.
    Mock::given(method("POST"))
        .and(path("/api/v1/files"))
        .and(body_partial_json(json!({ "name": "residence-permit.bpmn" })))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "file-x" })))
        .expect(2)
        .mount(&server)
        .await;

    let engine =
        TransferEngine::new(config_for(&server, "XFER_PART_ID", "XFER_PART_SECRET")).unwrap();
    let result = engine.transfer(&bundle()).await.unwrap();

    assert_eq!(result.status, TransferStatus::Partial);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].name, "residence-permit.bpmn");
    // The last error message is retained.
    assert!(result.failed[0].error.contains("500"));
    assert!(result.failed[0].error.contains("boom"));
    // Subsequent files in the batch still executed.
    assert_eq!(result.uploaded.len(), 2);
}

#[tokio::test]
async fn credential_failure_surfaces_before_any_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad client"))
        .expect(3)
        .mount(&server)
        .await;
    // No project/file mocks: nothing past auth may be attempted.

    let engine =
        TransferEngine::new(config_for(&server, "XFER_AUTH_ID", "XFER_AUTH_SECRET")).unwrap();
    let err = engine.transfer(&bundle()).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::AuthenticationError);
    assert!(err.to_string().contains("bad client"));
}

#[tokio::test]
async fn missing_credentials_fail_without_touching_the_network() {
    let server = MockServer::start().await;
    let mut config = config_for(&server, "XFER_NOENV_ID", "XFER_NOENV_SECRET");
    std::env::remove_var("XFER_NOENV_ID");
    std::env::remove_var("XFER_NOENV_SECRET");
    config.max_attempts = 1;

    let engine = TransferEngine::new(config).unwrap();
    let err = engine.transfer(&bundle()).await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::AuthenticationError);
}

#[test]
fn invalid_base_url_is_rejected_at_construction() {
    let config = ModelerConfig {
        base_url: "not a url".into(),
        ..ModelerConfig::default()
    };
    let err = TransferEngine::new(config).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);
}
