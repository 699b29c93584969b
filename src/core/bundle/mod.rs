//! Bundle orchestration: loads the authoritative diagrams, rewrites
//! identifiers to the external-key conventions, materializes forms, and
//! assembles the manifest. Pure transformation over inputs fetched through
//! the injected collaborators — no network or storage writes happen here,
//! which keeps the hardest logic independently testable.

use crate::core::bpmn::{is_likely_corrupted, ProcessDocument};
use crate::core::describe::{format_references, DescriptionResolver};
use crate::core::error::AppError;
use crate::core::forms::{FormContext, TemplateEngine, TemplatePair};
use crate::core::store::{ServiceRecord, ServiceStore, SubprocessRecord};
use crate::core::types::{ElementType, ErrorCategory};
use crate::utils::text::{normalize_for_match, sanitize_ncname, short_hash, slugify};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A materialized form definition for one BPMN node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormArtifact {
    pub node_id: String,
    pub node_name: String,
    pub filename: String,
    pub form_id: String,
    pub content: Value,
}

/// One rewritten subprocess diagram ready for transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubprocessFile {
    pub filename: String,
    pub xml: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSubprocess {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestForm {
    pub node_id: String,
    pub node_name: String,
    pub filename: String,
    pub form_id: String,
}

/// Structured index mapping bundle filenames to node ids and external keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub main_file: String,
    pub subprocesses: Vec<ManifestSubprocess>,
    pub forms: Vec<ManifestForm>,
}

/// The unit of transfer/export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub service_id: String,
    pub service_name: String,
    pub main_file: String,
    pub main_xml: String,
    pub subprocess_files: Vec<SubprocessFile>,
    pub forms: Vec<FormArtifact>,
    pub manifest: Manifest,
}

/// Pick the authoritative XML: edited wins when present and healthy,
/// original otherwise. Corrupted or unparsable candidates are skipped with
/// a warning so a bad edit never poisons the bundle.
fn choose_document(
    label: &str,
    edited: Option<&str>,
    original: Option<&str>,
) -> Option<ProcessDocument> {
    for (source, xml) in [("edited", edited), ("original", original)] {
        let Some(xml) = xml else { continue };
        if xml.trim().is_empty() {
            continue;
        }
        if is_likely_corrupted(xml) {
            warn!("{}: {} XML looks case-mangled, skipping", label, source);
            continue;
        }
        match ProcessDocument::parse(xml) {
            Ok(doc) => {
                debug!("{}: using {} XML", label, source);
                return Some(doc);
            }
            Err(e) => {
                warn!("{}: {} XML unusable ({}), skipping", label, source, e);
            }
        }
    }
    None
}

fn parse_called_key(called_element: &str) -> Option<&str> {
    called_element
        .strip_prefix("Process_Sub_")
        .filter(|key| !key.is_empty())
}

pub struct BundleBuilder {
    store: Arc<dyn ServiceStore>,
    templates: TemplateEngine,
    resolver: DescriptionResolver,
}

impl BundleBuilder {
    pub fn new(store: Arc<dyn ServiceStore>, templates: TemplateEngine) -> Self {
        let resolver = DescriptionResolver::new(store.clone());
        BundleBuilder {
            store,
            templates,
            resolver,
        }
    }

    /// Produce a complete bundle for one service.
    pub async fn build(&self, service_id: &str) -> Result<Bundle, AppError> {
        let service = self
            .store
            .service(service_id)
            .await?
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::NoDiagram,
                    format!("service '{}' does not exist", service_id),
                )
            })?;

        let mut doc = choose_document(
            &service.name,
            service.edited_xml.as_deref(),
            service.original_xml.as_deref(),
        )
        .ok_or_else(|| {
            AppError::new(
                ErrorCategory::NoDiagram,
                format!("service '{}' has no usable diagram", service_id),
            )
        })?;

        // Root id carries the external business key so the target system
        // can correlate deployed definitions back to the source record.
        let root_id = doc.root_process_id().map(str::to_string).ok_or_else(|| {
            AppError::new(
                ErrorCategory::MalformedInput,
                format!("service '{}' diagram has no process element", service_id),
            )
        })?;
        let root_target = sanitize_ncname(&format!("Process_{}", service.external_key));
        doc.rewrite_element_id(&root_id, &root_target)?;

        // Independent fetches share no mutable state; issue them together.
        let (step_keys_by_name, subprocess_records, templates) = tokio::join!(
            self.master_data_name_index(&service),
            self.store.subprocesses(service_id),
            self.templates.load_templates_or_builtin(),
        );
        let step_keys_by_name = step_keys_by_name?;
        let subprocess_records = subprocess_records?;

        let forms = self
            .rewrite_and_instantiate(
                &service,
                &mut doc,
                &step_keys_by_name,
                &subprocess_records,
                &templates,
            )
            .await?;

        let subprocess_files = self.collect_subprocesses(&subprocess_records);

        let main_file = format!("{}.bpmn", slugify(&service.name));
        let manifest = Manifest {
            main_file: main_file.clone(),
            subprocesses: subprocess_files
                .iter()
                .map(|(record, file)| ManifestSubprocess {
                    filename: file.filename.clone(),
                    step_key: record.step_key.clone(),
                    name: record.name.clone(),
                })
                .collect(),
            forms: forms
                .iter()
                .map(|f| ManifestForm {
                    node_id: f.node_id.clone(),
                    node_name: f.node_name.clone(),
                    filename: f.filename.clone(),
                    form_id: f.form_id.clone(),
                })
                .collect(),
        };

        Ok(Bundle {
            service_id: service.id.clone(),
            service_name: service.name.clone(),
            main_file,
            main_xml: doc.serialize()?,
            subprocess_files: subprocess_files.into_iter().map(|(_, f)| f).collect(),
            forms,
            manifest,
        })
    }

    /// Normalized display name -> external step key, from master data.
    async fn master_data_name_index(
        &self,
        service: &ServiceRecord,
    ) -> Result<HashMap<String, String>, AppError> {
        let steps = self.store.master_data_steps(&service.external_key).await?;
        Ok(steps
            .into_iter()
            .map(|s| (normalize_for_match(&s.step_name), s.step_key))
            .collect())
    }

    /// Walk the fixed-order traversal: rewrite element ids to the external
    /// key conventions, resolve descriptions, instantiate a form for every
    /// form-bearing node, and inject its binding.
    async fn rewrite_and_instantiate(
        &self,
        service: &ServiceRecord,
        doc: &mut ProcessDocument,
        step_keys_by_name: &HashMap<String, String>,
        subprocess_records: &[SubprocessRecord],
        templates: &TemplatePair,
    ) -> Result<Vec<FormArtifact>, AppError> {
        let nodes: Vec<_> = doc
            .find_elements_ordered(&[
                ElementType::StartEvent,
                ElementType::UserTask,
                ElementType::CallActivity,
            ])
            .into_iter()
            .cloned()
            .collect();

        let mut forms = Vec::new();
        let mut form_index = 0usize;

        for node in &nodes {
            let step_key = self.resolve_step_key(node, step_keys_by_name, subprocess_records);

            // Descriptions are resolved against the authoring-time node id,
            // before any rewrite.
            let resolved = self
                .resolver
                .resolve(&service.external_key, node, step_key.as_deref())
                .await?;

            let current_id = match (&step_key, node.element_type) {
                (Some(key), ElementType::CallActivity) => {
                    if let Err(e) = doc.set_called_element(&node.id, key) {
                        warn!("{}: keeping called element on '{}': {}", service.name, node.id, e);
                    }
                    let target = sanitize_ncname(&format!("CallActivity_{}", key));
                    self.try_rewrite(doc, &node.id, &target, service)
                }
                (Some(key), ElementType::UserTask) => {
                    let target = sanitize_ncname(&format!("Task_{}", key));
                    self.try_rewrite(doc, &node.id, &target, service)
                }
                _ => {
                    if node.element_type != ElementType::StartEvent {
                        // Hand-edited diagrams drift from upstream naming;
                        // a mismatch is best-effort, never a hard failure.
                        debug!(
                            "{}: no master-data match for '{}' ({}), keeping diagram id",
                            service.name, node.name, node.id
                        );
                    }
                    node.id.clone()
                }
            };

            if !node.element_type.is_form_bearing() {
                continue;
            }

            form_index += 1;
            let display_name = if node.name.is_empty() {
                node.id.clone()
            } else {
                node.name.clone()
            };
            let slug = slugify(&display_name);
            let form_id = format!("Form_{}_{}", slug.replace('-', "_"), form_index);
            let filename = format!("{}_{}.form", slug, form_index);

            let context = FormContext {
                service_name: service.name.clone(),
                step_name: display_name.clone(),
                description: resolved.description.clone(),
                next_tasks: doc.next_element_names(&current_id),
                references_text: format_references(&resolved.references),
            };
            let template = match node.element_type {
                ElementType::StartEvent => templates.start.as_str(),
                _ => templates.task.as_str(),
            };
            let content = TemplateEngine::instantiate(template, &context, &form_id)?;

            doc.inject_form_binding(&current_id, &form_id)?;

            forms.push(FormArtifact {
                node_id: current_id,
                node_name: display_name,
                filename,
                form_id,
                content,
            });
        }

        Ok(forms)
    }

    /// Rewrite one element id, degrading to the existing id on conflicts —
    /// duplicate-target collisions are cosmetic drift, not structural
    /// corruption.
    fn try_rewrite(
        &self,
        doc: &mut ProcessDocument,
        node_id: &str,
        new_id: &str,
        service: &ServiceRecord,
    ) -> String {
        match doc.rewrite_element_id(node_id, new_id) {
            Ok(()) => new_id.to_string(),
            Err(e) => {
                warn!(
                    "{}: keeping id '{}' ({}): {}",
                    service.name, node_id, new_id, e
                );
                node_id.to_string()
            }
        }
    }

    fn resolve_step_key(
        &self,
        node: &crate::core::bpmn::ElementInfo,
        step_keys_by_name: &HashMap<String, String>,
        subprocess_records: &[SubprocessRecord],
    ) -> Option<String> {
        match node.element_type {
            ElementType::UserTask => step_keys_by_name
                .get(&normalize_for_match(&node.name))
                .cloned(),
            ElementType::CallActivity => node
                .called_element
                .as_deref()
                .and_then(parse_called_key)
                .map(str::to_string)
                .or_else(|| {
                    step_keys_by_name
                        .get(&normalize_for_match(&node.name))
                        .cloned()
                })
                .or_else(|| {
                    subprocess_records
                        .iter()
                        .find(|s| normalize_for_match(&s.name) == normalize_for_match(&node.name))
                        .and_then(|s| s.step_key.clone())
                }),
            _ => None,
        }
    }

    /// Load, rewrite, and name every subprocess diagram. Empty records are
    /// skipped with a log line, never an abort.
    fn collect_subprocesses<'a>(
        &self,
        records: &'a [SubprocessRecord],
    ) -> Vec<(&'a SubprocessRecord, SubprocessFile)> {
        let mut files = Vec::new();
        for record in records {
            let Some(mut doc) = choose_document(
                &record.name,
                record.edited_xml.as_deref(),
                record.original_xml.as_deref(),
            ) else {
                warn!("subprocess '{}' has no usable diagram, skipping", record.name);
                continue;
            };

            match (&record.step_key, doc.root_process_id().map(str::to_string)) {
                (Some(key), Some(root_id)) => {
                    let target = sanitize_ncname(&format!("Process_Sub_{}", key));
                    if let Err(e) = doc.rewrite_element_id(&root_id, &target) {
                        warn!(
                            "subprocess '{}': keeping root id '{}': {}",
                            record.name, root_id, e
                        );
                    }
                }
                (None, _) => {
                    debug!(
                        "subprocess '{}' has no step key, keeping root id",
                        record.name
                    );
                }
                (_, None) => {
                    warn!(
                        "subprocess '{}' diagram has no process element",
                        record.name
                    );
                }
            }

            let xml = match doc.serialize() {
                Ok(xml) => xml,
                Err(e) => {
                    warn!("subprocess '{}' failed to serialize: {}", record.name, e);
                    continue;
                }
            };

            // Name-derived slug plus a short id-derived suffix so two
            // same-named subprocesses cannot collide.
            let filename = format!("{}_{}.bpmn", slugify(&record.name), short_hash(&record.id));
            files.push((record, SubprocessFile { filename, xml }));
        }
        files
    }
}
