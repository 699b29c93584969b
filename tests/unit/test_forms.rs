use modelbridge::core::blob::{BlobStore, MemoryBlobStore};
use modelbridge::core::config::TemplatesConfig;
use modelbridge::core::forms::{FormContext, TemplateEngine};
use std::sync::Arc;

fn context() -> FormContext {
    FormContext {
        service_name: "Residence permit".into(),
        step_name: "Check request".into(),
        description: "Line one.\nLine two.".into(),
        next_tasks: vec!["Decide".into()],
        references_text: "- [Guide](https://example.test/guide)".into(),
    }
}

#[test]
fn opaque_template_structure_survives_substitution() {
    // Third-party template shapes must pass through untouched apart from
    // the placeholder tokens.
    let template = r#"{
      "type": "default",
      "exporter": { "name": "some-editor", "version": "5.1" },
      "components": [
        { "type": "group", "components": [
          { "type": "text", "text": "{{serviceName}} / {{stepName}}" }
        ]}
      ]
    }"#;
    let value = TemplateEngine::instantiate(template, &context(), "Form_check_1").unwrap();
    assert_eq!(value["exporter"]["name"], "some-editor");
    assert_eq!(
        value["components"][0]["components"][0]["text"],
        "Residence permit / Check request"
    );
    assert_eq!(value["id"], "Form_check_1");
}

#[test]
fn multiline_values_are_escaped_into_valid_json() {
    let value = TemplateEngine::instantiate(
        r#"{"text": "{{stepDescription}}"}"#,
        &context(),
        "Form_x_1",
    )
    .unwrap();
    assert_eq!(value["text"], "Line one.\nLine two.");
}

#[test]
fn builtin_skeleton_resolves_completely_for_empty_context() {
    let empty = FormContext::default();
    let pair = TemplateEngine::builtin_pair();
    let value = TemplateEngine::instantiate(&pair.start, &empty, "Form_blank_1").unwrap();
    assert!(!value.to_string().contains("{{"));
    assert_eq!(value["id"], "Form_blank_1");
}

#[tokio::test]
async fn one_missing_template_makes_the_pair_unavailable() {
    let blob = Arc::new(MemoryBlobStore::new());
    blob.put("templates/start.json", br#"{"a": 1}"#, "application/json")
        .await
        .unwrap();
    // task.json missing on purpose
    let engine = TemplateEngine::new(blob, TemplatesConfig::default());
    assert!(engine.load_templates().await.is_err());
}
