use crate::core::types::{ErrorCategory, ErrorSeverity};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Central error type for the pipeline. Carries the category used for
/// recovery decisions and HTTP status mapping, plus free-form context.
#[derive(Debug)]
pub struct AppError {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: String,
    pub message: String,
    pub context: HashMap<String, String>,
    pub occurred_at: DateTime<Utc>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new<T: Into<String>>(category: ErrorCategory, message: T) -> Self {
        let severity = match category {
            ErrorCategory::ElementNotFound => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        };
        AppError {
            category,
            severity,
            code: default_code(category).to_string(),
            message: message.into(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            source: None,
        }
    }

    pub fn with_source<T: Into<String>>(
        category: ErrorCategory,
        message: T,
        source: anyhow::Error,
    ) -> Self {
        let mut error = AppError::new(category, message);
        error.source = Some(source);
        error
    }

    pub fn with_code<T: Into<String>>(mut self, code: T) -> Self {
        self.code = code.into();
        self
    }

    pub fn add_context(&mut self, key: &str, value: &str) {
        self.context.insert(key.to_string(), value.to_string());
    }

    pub fn with_context<T: Into<String>>(mut self, key: &str, value: T) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }
}

fn default_code(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::MalformedInput => "BPMN-001",
        ErrorCategory::ElementNotFound => "BPMN-002",
        ErrorCategory::NoDiagram => "BPMN-003",
        ErrorCategory::TemplatesUnavailable => "FORM-001",
        ErrorCategory::AuthenticationError => "XFER-001",
        ErrorCategory::UploadError => "XFER-002",
        ErrorCategory::PersistenceError => "STORE-001",
        ErrorCategory::StorageError => "BLOB-001",
        ErrorCategory::ValidationError => "VAL-001",
        ErrorCategory::IoError => "IO-001",
        ErrorCategory::InternalError => "INT-001",
        ErrorCategory::Unknown => "UNK-001",
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.category, self.message)?;
        if !self.context.is_empty() {
            let mut keys: Vec<&String> = self.context.keys().collect();
            keys.sort();
            write!(f, " (")?;
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}={}", key, self.context[*key])?;
            }
            write!(f, ")")?;
        }
        if let Some(ref source) = self.source {
            write!(f, "\nCaused by: {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError {
            category: ErrorCategory::InternalError,
            severity: ErrorSeverity::Error,
            code: default_code(ErrorCategory::InternalError).to_string(),
            message: e.to_string(),
            context: HashMap::new(),
            occurred_at: Utc::now(),
            source: Some(e),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::with_source(ErrorCategory::IoError, e.to_string(), anyhow::anyhow!(e))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::with_source(
            ErrorCategory::ValidationError,
            format!("JSON error: {}", e),
            anyhow::anyhow!(e),
        )
    }
}
