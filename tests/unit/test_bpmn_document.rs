use modelbridge::core::bpmn::{is_likely_corrupted, recover_wrapped_payload, ProcessDocument};
use modelbridge::core::types::{ElementType, ErrorCategory};

const DIAGRAM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<bpmn:definitions xmlns:bpmn="http://www.omg.org/spec/BPMN/20100524/MODEL" xmlns:bpmndi="http://www.omg.org/spec/BPMN/20100524/DI" xmlns:zeebe="http://camunda.org/schema/zeebe/1.0" id="Definitions_1" targetNamespace="http://bpmn.io/schema/bpmn">
  <bpmn:process id="Process_1" isExecutable="true">
    <bpmn:startEvent id="StartEvent_1" name="Antrag eingegangen" />
    <bpmn:userTask id="Activity_check" name="Antrag prüfen" />
    <bpmn:userTask id="Activity_decide" name="Entscheidung treffen" />
    <bpmn:callActivity id="Activity_sub" name="Dokumente anfordern" calledElement="Process_Sub_4711" />
    <bpmn:exclusiveGateway id="Gateway_1" default="Flow_3" />
    <bpmn:sequenceFlow id="Flow_1" sourceRef="StartEvent_1" targetRef="Activity_check" />
    <bpmn:sequenceFlow id="Flow_2" sourceRef="Activity_check" targetRef="Gateway_1" />
    <bpmn:sequenceFlow id="Flow_3" sourceRef="Gateway_1" targetRef="Activity_decide" />
    <bpmn:endEvent id="EndEvent_1" />
  </bpmn:process>
  <bpmndi:BPMNDiagram id="BPMNDiagram_1">
    <bpmndi:BPMNPlane id="BPMNPlane_1" bpmnElement="Process_1">
      <bpmndi:BPMNShape id="StartEvent_1_di" bpmnElement="StartEvent_1" />
      <bpmndi:BPMNShape id="Activity_check_di" bpmnElement="Activity_check" />
    </bpmndi:BPMNPlane>
  </bpmndi:BPMNDiagram>
</bpmn:definitions>"#;

#[test]
fn untouched_round_trip_is_byte_identical() {
    let doc = ProcessDocument::parse(DIAGRAM).unwrap();
    assert_eq!(doc.serialize().unwrap(), DIAGRAM);
}

#[test]
fn round_trip_preserves_everything_outside_the_mutation() {
    let mut doc = ProcessDocument::parse(DIAGRAM).unwrap();
    doc.rewrite_element_id("Activity_decide", "Task_9002").unwrap();
    let xml = doc.serialize().unwrap();

    // The untouched regions keep their exact text, prefixes included.
    assert!(xml.contains(r#"<bpmn:startEvent id="StartEvent_1" name="Antrag eingegangen" />"#));
    assert!(xml.contains(r#"<bpmn:userTask id="Activity_check" name="Antrag prüfen" />"#));
    assert!(xml.contains(r#"calledElement="Process_Sub_4711""#));
    assert!(xml.contains(r#"<bpmndi:BPMNShape id="StartEvent_1_di" bpmnElement="StartEvent_1" />"#));
    // The mutation itself landed, references updated alongside.
    assert!(xml.contains(r#"targetRef="Task_9002""#));
    assert!(!xml.contains("Activity_decide"));
}

#[test]
fn rewrite_keeps_ids_unique_and_is_idempotent() {
    let mut doc = ProcessDocument::parse(DIAGRAM).unwrap();
    doc.rewrite_element_id("Activity_check", "Task_101").unwrap();
    let once = doc.serialize().unwrap();

    // Rewriting to the id it already carries changes nothing.
    doc.rewrite_element_id("Task_101", "Task_101").unwrap();
    assert_eq!(doc.serialize().unwrap(), once);
    assert_eq!(once.matches(r#"id="Task_101""#).count(), 1);

    // A second element may not take an occupied id.
    let err = doc
        .rewrite_element_id("Activity_decide", "Task_101")
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::ValidationError);
}

#[test]
fn gateway_default_reference_follows_flow_rewrite() {
    let mut doc = ProcessDocument::parse(DIAGRAM).unwrap();
    doc.rewrite_element_id("Flow_3", "Flow_decide").unwrap();
    let xml = doc.serialize().unwrap();
    assert!(xml.contains(r#"default="Flow_decide""#));
}

#[test]
fn missing_element_is_element_not_found() {
    let mut doc = ProcessDocument::parse(DIAGRAM).unwrap();
    let err = doc.rewrite_element_id("Nope", "X").unwrap_err();
    assert_eq!(err.category, ErrorCategory::ElementNotFound);
}

#[test]
fn ordered_traversal_is_start_events_then_user_tasks_in_document_order() {
    let doc = ProcessDocument::parse(DIAGRAM).unwrap();
    let ordered = doc.find_elements_ordered(&[ElementType::StartEvent, ElementType::UserTask]);
    let ids: Vec<&str> = ordered.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["StartEvent_1", "Activity_check", "Activity_decide"]);
}

#[test]
fn binding_injection_is_exactly_once_per_element() {
    let mut doc = ProcessDocument::parse(DIAGRAM).unwrap();
    doc.inject_form_binding("StartEvent_1", "Form_intake_1").unwrap();
    doc.inject_form_binding("Activity_check", "Form_check_2").unwrap();
    doc.inject_form_binding("StartEvent_1", "Form_intake_1").unwrap();

    let xml = doc.serialize().unwrap();
    assert_eq!(xml.matches("zeebe:formDefinition").count(), 2);
    assert_eq!(xml.matches(r#"formId="Form_intake_1""#).count(), 1);
    assert_eq!(xml.matches(r#"formId="Form_check_2""#).count(), 1);
    assert_eq!(xml.matches(r#"bindingType="deployment""#).count(), 2);
}

#[test]
fn lowercase_start_event_tag_is_flagged_as_corrupted() {
    let mangled = DIAGRAM.replace("bpmn:startEvent", "bpmn:startevent");
    assert!(is_likely_corrupted(&mangled));
    assert!(!is_likely_corrupted(DIAGRAM));
}

#[test]
fn mixed_case_variant_is_not_flagged() {
    // Only the fully-lowercased rendition is the corruption symptom.
    let recased = DIAGRAM.replace("bpmn:startEvent", "bpmn:StartEvent");
    assert!(!is_likely_corrupted(&recased));
}

#[test]
fn lowercase_target_namespace_attribute_is_flagged() {
    let mangled = DIAGRAM.replace("targetNamespace", "targetnamespace");
    assert!(is_likely_corrupted(&mangled));
}

#[test]
fn wrapped_payload_is_recovered_on_parse() {
    let wrapped = format!("<article><section>{}</section></article>", DIAGRAM);
    assert!(recover_wrapped_payload(&wrapped).is_some());
    let doc = ProcessDocument::parse(&wrapped).unwrap();
    assert_eq!(doc.root_process_id(), Some("Process_1"));
    // The serialized recovery contains only the inner payload.
    assert!(!doc.serialize().unwrap().contains("<article>"));
}

#[test]
fn wrapper_without_payload_is_treated_as_absent() {
    let err = ProcessDocument::parse("<article>no diagram</article>").unwrap_err();
    assert_eq!(err.category, ErrorCategory::MalformedInput);
}

#[test]
fn called_element_rewrite_targets_only_call_activities() {
    let mut doc = ProcessDocument::parse(DIAGRAM).unwrap();
    let err = doc.set_called_element("Activity_check", "999").unwrap_err();
    assert_eq!(err.category, ErrorCategory::ElementNotFound);

    doc.set_called_element("Activity_sub", "999").unwrap();
    let xml = doc.serialize().unwrap();
    assert!(xml.contains(r#"calledElement="Process_Sub_999""#));
}
