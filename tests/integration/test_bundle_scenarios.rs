use modelbridge::core::blob::MemoryBlobStore;
use modelbridge::core::bundle::BundleBuilder;
use modelbridge::core::config::TemplatesConfig;
use modelbridge::core::forms::TemplateEngine;
use modelbridge::core::store::{
    MasterDataStep, MemoryStore, ServiceRecord, StepDescriptionRow, SubprocessRecord,
};
use modelbridge::core::types::ErrorCategory;
use modelbridge::utils::text::short_hash;
use std::sync::Arc;

const MAIN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" xmlns:zeebe="http://camunda.org/schema/zeebe/1.0" targetNamespace="http://bpmn.io/schema/bpmn">
  <bpmn:process id="Process_original" isExecutable="true">
    <bpmn:startEvent id="Start_intake" name="Antrag eingegangen" />
    <bpmn:userTask id="Activity_check" name="Antrag prüfen" />
    <bpmn:userTask id="Activity_special" name="Sonderfall bearbeiten" />
    <bpmn:callActivity id="Activity_docs" name="Unterlagen anfordern" calledElement="Process_Sub_202" />
    <bpmn:sequenceFlow id="Flow_1" sourceRef="Start_intake" targetRef="Activity_check" />
    <bpmn:sequenceFlow id="Flow_2" sourceRef="Activity_check" targetRef="Activity_docs" />
    <bpmn:sequenceFlow id="Flow_3" sourceRef="Activity_docs" targetRef="Activity_special" />
    <bpmn:endEvent id="End_done" />
  </bpmn:process>
</bpmn:definitions>"#;

const SUBPROCESS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" targetNamespace="http://bpmn.io/schema/bpmn">
  <bpmn:process id="Process_docs_original" isExecutable="true">
    <bpmn:startEvent id="Start_docs" name="Anforderung" />
    <bpmn:endEvent id="End_docs" />
  </bpmn:process>
</bpmn:definitions>"#;

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_service(ServiceRecord {
            id: "svc-res".into(),
            external_key: "MDS-9".into(),
            name: "Residence permit".into(),
            owning_unit: Some("Office 31".into()),
            original_xml: Some(MAIN.into()),
            edited_xml: None,
        })
        .await;
    store
        .insert_subprocess(SubprocessRecord {
            id: "sub-1".into(),
            service_id: "svc-res".into(),
            name: "Unterlagen anfordern".into(),
            step_key: Some("202".into()),
            original_xml: Some(SUBPROCESS.into()),
            edited_xml: None,
        })
        .await;
    store
        .insert_master_data(MasterDataStep {
            service_key: "MDS-9".into(),
            step_key: "101".into(),
            step_name: "Antrag prüfen".into(),
            description: Some("Check the request for completeness.".into()),
            reference_urls: Some("https://law.example/one".into()),
            reference_titles: None,
        })
        .await;
    store
        .insert_master_data(MasterDataStep {
            service_key: "MDS-9".into(),
            step_key: "202".into(),
            step_name: "Unterlagen anfordern".into(),
            description: Some("Request missing documents.".into()),
            reference_urls: None,
            reference_titles: None,
        })
        .await;
    store
        .insert_description(StepDescriptionRow {
            service_key: "MDS-9".into(),
            node_id: None,
            step_key: None,
            text: "Grants residence permits. Handles the full review.".into(),
        })
        .await;
    store
}

fn builder(store: Arc<MemoryStore>) -> BundleBuilder {
    let engine = TemplateEngine::new(Arc::new(MemoryBlobStore::new()), TemplatesConfig::default());
    BundleBuilder::new(store, engine)
}

#[tokio::test]
async fn end_to_end_bundle_for_a_mixed_service() {
    let store = seeded_store().await;
    let bundle = builder(store).build("svc-res").await.unwrap();

    // One form per form-bearing node: start + matched task + unmatched task.
    assert_eq!(bundle.forms.len(), 3);
    assert_eq!(bundle.subprocess_files.len(), 1);
    assert_eq!(bundle.main_file, "residence-permit.bpmn");

    // Root and matched nodes carry the external-key conventions.
    assert!(bundle.main_xml.contains(r#"id="Process_MDS-9""#));
    assert!(bundle.main_xml.contains(r#"id="Task_101""#));
    assert!(bundle.main_xml.contains(r#"id="CallActivity_202""#));
    assert!(bundle.main_xml.contains(r#"calledElement="Process_Sub_202""#));
    // The unmatched task keeps its diagram id and still got a form.
    assert!(bundle.main_xml.contains(r#"id="Activity_special""#));

    // Every form id appears in exactly one injected binding.
    for form in &bundle.forms {
        assert_eq!(
            bundle
                .main_xml
                .matches(&format!(r#"formId="{}""#, form.form_id))
                .count(),
            1,
            "binding for {}",
            form.form_id
        );
    }
    assert_eq!(bundle.main_xml.matches("zeebe:formDefinition").count(), 3);

    // Subprocess rewritten to the shared convention and named
    // slug + short id hash.
    let subprocess = &bundle.subprocess_files[0];
    assert!(subprocess.xml.contains(r#"id="Process_Sub_202""#));
    assert_eq!(
        subprocess.filename,
        format!("unterlagen-anfordern_{}.bpmn", short_hash("sub-1"))
    );

    // Manifest cross-references everything.
    assert_eq!(bundle.manifest.main_file, bundle.main_file);
    assert_eq!(bundle.manifest.subprocesses.len(), 1);
    assert_eq!(bundle.manifest.subprocesses[0].step_key.as_deref(), Some("202"));
    assert_eq!(bundle.manifest.forms.len(), 3);
    let manifest_nodes: Vec<&str> = bundle
        .manifest
        .forms
        .iter()
        .map(|f| f.node_id.as_str())
        .collect();
    assert!(manifest_nodes.contains(&"Start_intake"));
    assert!(manifest_nodes.contains(&"Task_101"));
    assert!(manifest_nodes.contains(&"Activity_special"));
}

#[tokio::test]
async fn regeneration_from_unchanged_input_is_stable() {
    let store = seeded_store().await;
    let first = builder(store.clone()).build("svc-res").await.unwrap();
    let second = builder(store).build("svc-res").await.unwrap();

    assert_eq!(first.main_xml, second.main_xml);
    let first_ids: Vec<&str> = first.forms.iter().map(|f| f.form_id.as_str()).collect();
    let second_ids: Vec<&str> = second.forms.iter().map(|f| f.form_id.as_str()).collect();
    assert_eq!(first_ids, second_ids);
    let first_names: Vec<&str> = first.forms.iter().map(|f| f.filename.as_str()).collect();
    assert_eq!(
        first_names,
        second.forms.iter().map(|f| f.filename.as_str()).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn forms_are_ordered_start_events_before_user_tasks() {
    let store = seeded_store().await;
    let bundle = builder(store).build("svc-res").await.unwrap();
    let names: Vec<&str> = bundle.forms.iter().map(|f| f.node_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Antrag eingegangen", "Antrag prüfen", "Sonderfall bearbeiten"]
    );
    // Filenames carry the 1-based traversal index.
    assert!(bundle.forms[0].filename.ends_with("_1.form"));
    assert!(bundle.forms[2].filename.ends_with("_3.form"));
}

#[tokio::test]
async fn corrupted_edited_xml_falls_back_to_original() {
    let store = seeded_store().await;
    // Simulate the lossy round-trip: fully lowercased tags in edited XML.
    let mangled = MAIN.replace("bpmn:startEvent", "bpmn:startevent");
    store
        .insert_service(ServiceRecord {
            id: "svc-res".into(),
            external_key: "MDS-9".into(),
            name: "Residence permit".into(),
            owning_unit: None,
            original_xml: Some(MAIN.into()),
            edited_xml: Some(mangled),
        })
        .await;

    let bundle = builder(store).build("svc-res").await.unwrap();
    // The healthy original was used; forms still cover all three nodes.
    assert_eq!(bundle.forms.len(), 3);
    assert!(bundle.main_xml.contains("bpmn:startEvent"));
}

#[tokio::test]
async fn service_without_any_diagram_is_no_diagram() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_service(ServiceRecord {
            id: "svc-empty".into(),
            external_key: "MDS-0".into(),
            name: "Empty".into(),
            owning_unit: None,
            original_xml: None,
            edited_xml: None,
        })
        .await;

    let err = builder(store).build("svc-empty").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::NoDiagram);
}

#[tokio::test]
async fn unknown_service_is_no_diagram_too() {
    let store = Arc::new(MemoryStore::new());
    let err = builder(store).build("ghost").await.unwrap_err();
    assert_eq!(err.category, ErrorCategory::NoDiagram);
}

#[tokio::test]
async fn empty_subprocess_is_skipped_not_fatal() {
    let store = seeded_store().await;
    store
        .insert_subprocess(SubprocessRecord {
            id: "sub-2".into(),
            service_id: "svc-res".into(),
            name: "Leerer Teilprozess".into(),
            step_key: None,
            original_xml: Some("   ".into()),
            edited_xml: None,
        })
        .await;

    let bundle = builder(store).build("svc-res").await.unwrap();
    assert_eq!(bundle.subprocess_files.len(), 1);
}
