//! Structural mutations over the event stream: id rewriting, call-activity
//! retargeting, and form-binding injection. Each operation touches only the
//! events it must; everything else round-trips untouched.

use crate::core::bpmn::{ProcessDocument, ZEEBE_NS};
use crate::core::error::AppError;
use crate::core::types::{ElementType, ErrorCategory};
use crate::utils::text::sanitize_ncname;
use quick_xml::events::{BytesEnd, BytesStart, Event};

/// Attributes that reference element ids and must follow an id rewrite,
/// or the diagram dangles at deploy time.
const REFERENCE_ATTRIBUTES: &[&[u8]] = &[
    b"sourceRef",
    b"targetRef",
    b"bpmnElement",
    b"attachedToRef",
    b"default",
];

fn name_of(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn prefix_of(start: &BytesStart<'_>) -> Option<String> {
    start
        .name()
        .prefix()
        .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned())
}

fn prefixed(prefix: &Option<String>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", p, local),
        None => local.to_string(),
    }
}

/// Rebuild a start tag with one attribute replaced (or appended when
/// absent). Attribute order and all other attributes are preserved.
fn with_attribute(start: &BytesStart<'_>, key: &[u8], new_value: &str) -> BytesStart<'static> {
    let mut rebuilt = BytesStart::new(name_of(start));
    let mut replaced = false;
    for attr in start.attributes().filter_map(Result::ok) {
        if attr.key.as_ref() == key {
            rebuilt.push_attribute((key, new_value.as_bytes()));
            replaced = true;
        } else {
            rebuilt.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    if !replaced {
        rebuilt.push_attribute((key, new_value.as_bytes()));
    }
    rebuilt
}

/// Rebuild a start tag rewriting every attribute in `keys` whose current
/// value equals `old` to `new`.
fn with_rewritten_values(
    start: &BytesStart<'_>,
    keys: &[&[u8]],
    old: &str,
    new: &str,
) -> (BytesStart<'static>, bool) {
    let mut rebuilt = BytesStart::new(name_of(start));
    let mut changed = false;
    for attr in start.attributes().filter_map(Result::ok) {
        let matches = keys.iter().any(|k| *k == attr.key.as_ref())
            && attr.value.as_ref() == old.as_bytes();
        if matches {
            rebuilt.push_attribute((attr.key.as_ref(), new.as_bytes()));
            changed = true;
        } else {
            rebuilt.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    (rebuilt, changed)
}

impl ProcessDocument {
    /// Rewrite one element's id in place, updating referencing attributes
    /// (sequence-flow refs, diagram-interchange refs, gateway defaults)
    /// alongside. Fails with `ElementNotFound` when no element carries the
    /// id; a rewrite to the current id is a no-op, so regeneration over an
    /// already-rewritten document never double-prefixes.
    pub fn rewrite_element_id(&mut self, element_id: &str, new_id: &str) -> Result<(), AppError> {
        let found = self
            .elements()
            .iter()
            .any(|e| e.id == element_id);
        if !found {
            return Err(AppError::new(
                ErrorCategory::ElementNotFound,
                format!("no element with id '{}'", element_id),
            ));
        }
        if element_id == new_id {
            return Ok(());
        }
        if self.elements().iter().any(|e| e.id == new_id) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("id '{}' already exists in the document", new_id),
            ));
        }

        let mut id_keys: Vec<&[u8]> = vec![b"id"];
        id_keys.extend_from_slice(REFERENCE_ATTRIBUTES);

        for event in self.events.iter_mut() {
            let rebuilt = match event {
                Event::Start(e) => {
                    let (rebuilt, changed) =
                        with_rewritten_values(e, &id_keys, element_id, new_id);
                    changed.then(|| Event::Start(rebuilt))
                }
                Event::Empty(e) => {
                    let (rebuilt, changed) =
                        with_rewritten_values(e, &id_keys, element_id, new_id);
                    changed.then(|| Event::Empty(rebuilt))
                }
                _ => None,
            };
            if let Some(rebuilt) = rebuilt {
                *event = rebuilt;
            }
        }
        self.reindex();
        Ok(())
    }

    /// Point a call-activity at the subprocess keyed by `subprocess_key`,
    /// using the fixed `Process_Sub_<key>` convention shared with the
    /// subprocess documents' own root ids.
    pub fn set_called_element(
        &mut self,
        call_activity_id: &str,
        subprocess_key: &str,
    ) -> Result<(), AppError> {
        let target = sanitize_ncname(&format!("Process_Sub_{}", subprocess_key));
        let position = self
            .elements()
            .iter()
            .find(|e| e.id == call_activity_id && e.element_type == ElementType::CallActivity)
            .map(|e| e.event_index)
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ElementNotFound,
                    format!("no call activity with id '{}'", call_activity_id),
                )
            })?;

        let rebuilt = match &self.events[position] {
            Event::Start(e) => Event::Start(with_attribute(e, b"calledElement", &target)),
            Event::Empty(e) => Event::Empty(with_attribute(e, b"calledElement", &target)),
            _ => unreachable!("indexed element positions always hold start events"),
        };
        self.events[position] = rebuilt;
        self.reindex();
        Ok(())
    }

    /// Ensure the element carries exactly one extension block with one
    /// form-binding declaration for `form_id`, binding mode "deployment".
    /// Any pre-existing binding on the element is removed first, so
    /// repeated regeneration is idempotent.
    pub fn inject_form_binding(&mut self, element_id: &str, form_id: &str) -> Result<(), AppError> {
        let zeebe_prefix = self.ensure_zeebe_namespace()?;

        let (position, element_prefix) = {
            let info = self.element(element_id).ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ElementNotFound,
                    format!("no element with id '{}'", element_id),
                )
            })?;
            let prefix = match &self.events[info.event_index] {
                Event::Start(e) | Event::Empty(e) => prefix_of(e),
                _ => None,
            };
            (info.event_index, prefix)
        };

        let extension_name = prefixed(&element_prefix, "extensionElements");
        let mut binding = BytesStart::new(format!("{}:formDefinition", zeebe_prefix));
        binding.push_attribute(("formId", form_id));
        binding.push_attribute(("bindingType", "deployment"));
        let binding = Event::Empty(binding);

        match self.events[position].clone() {
            Event::Empty(e) => {
                // Self-closing element: expand to start/end and insert the
                // extension block as its only child.
                let element_name = name_of(&e);
                let opened = e.into_owned();
                let replacement = vec![
                    Event::Start(opened),
                    Event::Start(BytesStart::new(extension_name.clone())),
                    binding,
                    Event::End(BytesEnd::new(extension_name)),
                    Event::End(BytesEnd::new(element_name)),
                ];
                self.events.splice(position..=position, replacement);
            }
            Event::Start(_) => {
                let end = self.matching_end(position).ok_or_else(|| {
                    AppError::new(
                        ErrorCategory::MalformedInput,
                        format!("unclosed element '{}'", element_id),
                    )
                })?;
                self.remove_form_definitions(position, end);
                // Spans may have shifted; the element start itself has not.
                let end = self.matching_end(position).expect("span still closed");
                self.insert_binding(position, end, &extension_name, binding);
            }
            _ => unreachable!("indexed element positions always hold start events"),
        }

        self.reindex();
        Ok(())
    }

    /// Remove every formDefinition declaration between `start` and `end`.
    fn remove_form_definitions(&mut self, start: usize, end: usize) {
        let mut spans: Vec<(usize, usize)> = Vec::new();
        let mut idx = start + 1;
        while idx < end {
            match &self.events[idx] {
                Event::Empty(e) if e.local_name().as_ref() == b"formDefinition" => {
                    spans.push((idx, idx));
                    idx += 1;
                }
                Event::Start(e) if e.local_name().as_ref() == b"formDefinition" => {
                    let close = self.matching_end(idx).unwrap_or(idx);
                    spans.push((idx, close));
                    idx = close + 1;
                }
                _ => idx += 1,
            }
        }
        for (from, to) in spans.into_iter().rev() {
            self.events.drain(from..=to);
        }
    }

    /// Insert the binding into the element's extension block, creating the
    /// block as the first child when the element has none.
    fn insert_binding(
        &mut self,
        start: usize,
        end: usize,
        extension_name: &str,
        binding: Event<'static>,
    ) {
        let mut depth = 0usize;
        let mut idx = start + 1;
        while idx < end {
            match &self.events[idx] {
                Event::Start(e) => {
                    if depth == 0 && e.local_name().as_ref() == b"extensionElements" {
                        self.events.insert(idx + 1, binding);
                        return;
                    }
                    depth += 1;
                }
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Empty(e) => {
                    if depth == 0 && e.local_name().as_ref() == b"extensionElements" {
                        let opened = e.clone().into_owned();
                        let name = name_of(e);
                        let replacement = vec![
                            Event::Start(opened),
                            binding,
                            Event::End(BytesEnd::new(name)),
                        ];
                        self.events.splice(idx..=idx, replacement);
                        return;
                    }
                }
                _ => {}
            }
            idx += 1;
        }

        let block = vec![
            Event::Start(BytesStart::new(extension_name.to_string())),
            binding,
            Event::End(BytesEnd::new(extension_name.to_string())),
        ];
        let mut insert_at = start + 1;
        for event in block {
            self.events.insert(insert_at, event);
            insert_at += 1;
        }
    }

    /// Find the prefix bound to the Zeebe namespace on the definitions
    /// root, declaring `xmlns:zeebe` there when absent. Returns the prefix
    /// to use for injected bindings.
    fn ensure_zeebe_namespace(&mut self) -> Result<String, AppError> {
        let root = self
            .events
            .iter()
            .position(|event| match event {
                Event::Start(e) | Event::Empty(e) => e.local_name().as_ref() == b"definitions",
                _ => false,
            })
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::MalformedInput,
                    "document has no BPMN definitions root",
                )
            })?;

        if let Event::Start(e) | Event::Empty(e) = &self.events[root] {
            for attr in e.attributes().filter_map(Result::ok) {
                let key = attr.key.as_ref();
                if attr.value.as_ref() == ZEEBE_NS.as_bytes() {
                    if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                        return Ok(String::from_utf8_lossy(prefix).into_owned());
                    }
                }
            }
        }

        let rebuilt = match &self.events[root] {
            Event::Start(e) => Event::Start(with_attribute(e, b"xmlns:zeebe", ZEEBE_NS)),
            Event::Empty(e) => Event::Empty(with_attribute(e, b"xmlns:zeebe", ZEEBE_NS)),
            _ => unreachable!("root position holds a start event"),
        };
        self.events[root] = rebuilt;
        Ok("zeebe".to_string())
    }
}
