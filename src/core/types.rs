use serde::{Deserialize, Serialize};

/// Error category enumeration covering the pipeline's failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Unparsable or structurally invalid BPMN XML.
    MalformedInput,
    /// A targeted element id does not exist in the document.
    ElementNotFound,
    /// Form template skeletons could not be fetched.
    TemplatesUnavailable,
    /// OAuth token exchange failed.
    AuthenticationError,
    /// A file upload to the Modeler API failed.
    UploadError,
    /// Neither edited nor original XML exists for a service.
    NoDiagram,
    /// Persistence collaborator failure.
    PersistenceError,
    /// Blob store or archive failure.
    StorageError,
    ValidationError,
    IoError,
    InternalError,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}

/// Typed BPMN flow elements the pipeline cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    StartEvent,
    UserTask,
    CallActivity,
    EndEvent,
    Gateway,
    SequenceFlow,
    Process,
}

impl ElementType {
    /// Start events and user tasks carry a runtime form.
    pub fn is_form_bearing(self) -> bool {
        matches!(self, ElementType::StartEvent | ElementType::UserTask)
    }
}

/// Overall outcome of shipping a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Complete,
    Partial,
}

/// Lifecycle state recorded for transfer/export jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    PartiallyFailed,
    Failed,
}

/// File kinds accepted by the Modeler upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Bpmn,
    Form,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Bpmn => write!(f, "bpmn"),
            FileKind::Form => write!(f, "form"),
        }
    }
}
