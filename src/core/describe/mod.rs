//! Per-node description and reference-link resolution. Descriptions live
//! in more than one place depending on how a service was authored, so
//! resolution walks a fallback chain; a node with no description is a
//! legitimate outcome, not an error.

use crate::core::bpmn::ElementInfo;
use crate::core::error::AppError;
use crate::core::store::{MasterDataStep, ServiceStore};
use crate::core::types::ElementType;
use crate::utils::text::clamp_description;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A named link attached to a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub title: String,
    pub url: String,
}

/// Resolution result for one node.
#[derive(Debug, Clone, Default)]
pub struct ResolvedDescription {
    pub description: String,
    pub references: Vec<ReferenceEntry>,
}

/// Split the delimited source fields of one master-data row into entries.
/// URLs split on `;` and `,`; titles split on `;` only and aligned by
/// index. Untitled entries are auto-numbered with the step's display name:
/// a 1-based suffix when more than one URL exists, no suffix for a single
/// one.
pub fn parse_reference_entries(
    step_name: &str,
    urls: &Option<String>,
    titles: &Option<String>,
) -> Vec<ReferenceEntry> {
    let urls: Vec<String> = urls
        .as_deref()
        .unwrap_or_default()
        .split([';', ','])
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        return Vec::new();
    }

    let titles: Vec<String> = titles
        .as_deref()
        .unwrap_or_default()
        .split(';')
        .map(|t| t.trim().to_string())
        .collect();

    let total = urls.len();
    urls.into_iter()
        .enumerate()
        .map(|(idx, url)| {
            let title = match titles.get(idx) {
                Some(title) if !title.is_empty() => title.clone(),
                _ if total == 1 => step_name.to_string(),
                _ => format!("{} ({})", step_name, idx + 1),
            };
            ReferenceEntry { title, url }
        })
        .collect()
}

/// Render reference entries as the markdown block spliced into forms.
pub fn format_references(entries: &[ReferenceEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("- [{}]({})", e.title, e.url))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct DescriptionResolver {
    store: Arc<dyn ServiceStore>,
}

impl DescriptionResolver {
    pub fn new(store: Arc<dyn ServiceStore>) -> Self {
        DescriptionResolver { store }
    }

    /// Resolve description and references for one node. `step_key` is the
    /// node's external step key when the caller could determine one (from
    /// the called-element reference or master-data name matching).
    pub async fn resolve(
        &self,
        service_key: &str,
        node: &ElementInfo,
        step_key: Option<&str>,
    ) -> Result<ResolvedDescription, AppError> {
        let description = self.resolve_description(service_key, node, step_key).await?;
        let references = self.resolve_references(service_key, node, step_key).await?;
        Ok(ResolvedDescription {
            description,
            references,
        })
    }

    async fn resolve_description(
        &self,
        service_key: &str,
        node: &ElementInfo,
        step_key: Option<&str>,
    ) -> Result<String, AppError> {
        // Start events are the only nodes that resolve the service-level
        // description; every other node resolves per-step sources.
        if node.element_type == ElementType::StartEvent {
            let row = self.store.service_description(service_key).await?;
            return Ok(row.map(|r| clamp_description(&r.text)).unwrap_or_default());
        }

        if let Some(key) = step_key {
            if let Some(row) = self.store.step_description_by_key(service_key, key).await? {
                return Ok(clamp_description(&row.text));
            }
            let steps = self.store.master_data_steps(service_key).await?;
            if let Some(step) = steps.iter().find(|s| s.step_key == key) {
                if let Some(description) = step.description.as_deref() {
                    if !description.trim().is_empty() {
                        return Ok(clamp_description(description));
                    }
                }
            }
        }

        if let Some(row) = self.store.node_description(service_key, &node.id).await? {
            return Ok(clamp_description(&row.text));
        }

        // Some nodes legitimately have none.
        Ok(String::new())
    }

    async fn resolve_references(
        &self,
        service_key: &str,
        node: &ElementInfo,
        step_key: Option<&str>,
    ) -> Result<Vec<ReferenceEntry>, AppError> {
        let steps = self.store.master_data_steps(service_key).await?;

        if let Some(key) = step_key {
            if let Some(step) = steps.iter().find(|s| s.step_key == key) {
                let display_name = if node.name.is_empty() {
                    step.step_name.as_str()
                } else {
                    node.name.as_str()
                };
                let entries = parse_reference_entries(
                    display_name,
                    &step.reference_urls,
                    &step.reference_titles,
                );
                if !entries.is_empty() {
                    return Ok(entries);
                }
            }
        }

        // Better to over-surface documentation than to surface none: fall
        // back to the full deduplicated reference set for the service.
        Ok(all_service_references(&steps))
    }
}

/// Deduplicated (by URL, first title wins) references across every
/// master-data row of the service, row order preserved.
pub fn all_service_references(steps: &[MasterDataStep]) -> Vec<ReferenceEntry> {
    let mut seen = std::collections::HashSet::new();
    let mut entries = Vec::new();
    for step in steps {
        for entry in
            parse_reference_entries(&step.step_name, &step.reference_urls, &step.reference_titles)
        {
            if seen.insert(entry.url.clone()) {
                entries.push(entry);
            }
        }
    }
    entries
}
