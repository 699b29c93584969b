//! Heuristics for two known storage corruption modes: BPMN payloads
//! wrapped in stray markup tags, and case-mangled tag/attribute names left
//! behind by a lossy round-trip through a case-normalizing editor.

use regex::Regex;

/// Mixed-case BPMN names whose fully-lowercased form never occurs in a
/// healthy document. The check runs on the raw string: BPMN's XML grammar
/// is case-sensitive, and a normalizing parser would mask the defect.
const CASED_ELEMENT_NAMES: &[&str] = &[
    "startEvent",
    "endEvent",
    "userTask",
    "serviceTask",
    "callActivity",
    "sequenceFlow",
    "exclusiveGateway",
    "parallelGateway",
    "extensionElements",
    "formDefinition",
];

const CASED_ATTRIBUTE_NAMES: &[&str] = &[
    "targetNamespace",
    "isExecutable",
    "sourceRef",
    "targetRef",
    "calledElement",
    "attachedToRef",
    "bindingType",
    "bpmnElement",
];

/// Flag XML whose BPMN-namespaced names appear fully lowercased — the
/// symptom of a prior lossy round-trip. Operates on the raw text so the
/// defect is visible before any parser touches it.
pub fn is_likely_corrupted(xml: &str) -> bool {
    let lowered_elements = CASED_ELEMENT_NAMES
        .iter()
        .map(|name| name.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("|");
    let element_re = Regex::new(&format!(
        r"<(?:[A-Za-z0-9_]+:)?(?:{})[\s/>]",
        lowered_elements
    ))
    .expect("static element pattern");
    if element_re.is_match(xml) {
        return true;
    }

    let lowered_attributes = CASED_ATTRIBUTE_NAMES
        .iter()
        .map(|name| name.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("|");
    let attribute_re = Regex::new(&format!(r#"\s(?:{})\s*="#, lowered_attributes))
        .expect("static attribute pattern");
    attribute_re.is_match(xml)
}

/// Extract the inner BPMN payload from text wrapped in stray markup tags.
/// Returns the definitions slice when one is present, None otherwise —
/// callers treat None as "document absent" and fall back to another source
/// rather than importing wrapped content.
pub fn recover_wrapped_payload(xml: &str) -> Option<&str> {
    let re = Regex::new(
        r"(?s)<(?:[A-Za-z0-9_]+:)?definitions[\s>].*</(?:[A-Za-z0-9_]+:)?definitions\s*>",
    )
    .expect("static recovery pattern");
    re.find(xml).map(|m| m.as_str())
}
