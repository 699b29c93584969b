//! Form-template instantiation. Templates are opaque third-party JSON
//! shapes; substitution is textual placeholder replacement over the
//! serialized text, never structural field assignment. Only the form id is
//! set structurally afterwards — it must be deterministic and
//! caller-supplied, not embedded in a template.

use crate::core::blob::BlobStore;
use crate::core::config::TemplatesConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// The two named skeletons: one for start events, one for user tasks.
#[derive(Debug, Clone)]
pub struct TemplatePair {
    pub start: String,
    pub task: String,
}

/// Resolved substitution context for one node.
#[derive(Debug, Clone, Default)]
pub struct FormContext {
    pub service_name: String,
    pub step_name: String,
    pub description: String,
    pub next_tasks: Vec<String>,
    pub references_text: String,
}

impl FormContext {
    fn variables(&self) -> IndexMap<&'static str, String> {
        let mut vars = IndexMap::new();
        vars.insert("serviceName", self.service_name.clone());
        vars.insert("stepName", self.step_name.clone());
        vars.insert("stepDescription", self.description.clone());
        vars.insert("nextTasks", self.next_tasks.join(", "));
        vars.insert("references", self.references_text.clone());
        vars
    }
}

/// Minimal built-in skeleton used when the stored templates are missing.
/// Degrades output richness; never blocks delivery.
const BUILTIN_SKELETON: &str = r##"{
  "type": "default",
  "schemaVersion": 16,
  "components": [
    { "type": "text", "text": "# {{serviceName}}\n## {{stepName}}" },
    { "type": "text", "text": "{{stepDescription}}" },
    { "type": "text", "text": "{{references}}" },
    { "type": "textarea", "key": "notes", "label": "Notes" },
    { "type": "text", "text": "Next steps: {{nextTasks}}" }
  ]
}"##;

pub struct TemplateEngine {
    blob: Arc<dyn BlobStore>,
    config: TemplatesConfig,
}

impl TemplateEngine {
    pub fn new(blob: Arc<dyn BlobStore>, config: TemplatesConfig) -> Self {
        TemplateEngine { blob, config }
    }

    /// Fetch the two stored skeletons. Fails with `TemplatesUnavailable`
    /// when either is missing; callers degrade to `builtin_pair`.
    pub async fn load_templates(&self) -> Result<TemplatePair, AppError> {
        let start = self.fetch(&self.config.start_name).await?;
        let task = self.fetch(&self.config.task_name).await?;
        Ok(TemplatePair { start, task })
    }

    /// Stored templates when available, otherwise the built-in skeletons.
    pub async fn load_templates_or_builtin(&self) -> TemplatePair {
        match self.load_templates().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("form templates unavailable, using built-in skeleton: {}", e);
                Self::builtin_pair()
            }
        }
    }

    pub fn builtin_pair() -> TemplatePair {
        TemplatePair {
            start: BUILTIN_SKELETON.to_string(),
            task: BUILTIN_SKELETON.to_string(),
        }
    }

    async fn fetch(&self, name: &str) -> Result<String, AppError> {
        let path = format!("{}/{}", self.config.prefix, name);
        let bytes = self.blob.get(&path).await?.ok_or_else(|| {
            AppError::new(
                ErrorCategory::TemplatesUnavailable,
                format!("template '{}' not found", path),
            )
        })?;
        String::from_utf8(bytes).map_err(|e| {
            AppError::new(
                ErrorCategory::TemplatesUnavailable,
                format!("template '{}' is not UTF-8: {}", path, e),
            )
        })
    }

    /// Instantiate a template: replace every placeholder token, confirm the
    /// result still parses as a JSON object, and set the form id field.
    /// A placeholder surviving substitution is a defect, not a valid
    /// output.
    pub fn instantiate(template: &str, context: &FormContext, form_id: &str) -> Result<Value, AppError> {
        let mut contents = template.to_string();
        for (key, value) in context.variables() {
            contents = contents.replace(&format!("{{{{{}}}}}", key), &json_escape(&value));
        }

        let leftover = regex::Regex::new(r"\{\{[A-Za-z0-9_]+\}\}").expect("static pattern");
        if let Some(token) = leftover.find(&contents) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("unresolved placeholder '{}' in template output", token.as_str()),
            )
            .with_code("FORM-003"));
        }

        let mut value: Value = serde_json::from_str(&contents).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("template output is not valid JSON: {}", e),
            )
            .with_code("FORM-002")
        })?;

        let object = value.as_object_mut().ok_or_else(|| {
            AppError::new(
                ErrorCategory::ValidationError,
                "template output is not a JSON object",
            )
            .with_code("FORM-002")
        })?;
        object.insert("id".to_string(), Value::String(form_id.to_string()));

        Ok(value)
    }
}

/// Escape a value for splicing into serialized JSON text: JSON-string
/// escaping without the surrounding quotes.
fn json_escape(value: &str) -> String {
    let quoted = serde_json::to_string(value).unwrap_or_default();
    quoted[1..quoted.len() - 1].to_string()
}
