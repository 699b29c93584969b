use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main modelbridge configuration loaded from modelbridge.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Workspace/data configuration
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Modeler transfer target configuration
    #[serde(default)]
    pub modeler: ModelerConfig,

    /// Blob storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Form template configuration
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// Text-generation collaborator configuration
    #[serde(default)]
    pub textgen: TextGenConfig,
}

/// Workspace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory holding service data (service.json, subprocesses/, templates/)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Modeler transfer target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelerConfig {
    /// Base URL of the Modeler REST API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth2 client-credentials token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// OAuth2 audience claim
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Environment variable holding the OAuth client id
    #[serde(default = "default_client_id_env")]
    pub client_id_env: String,

    /// Environment variable holding the OAuth client secret
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,

    /// Target project name override (defaults to the service name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    /// Upload attempts per file before it is recorded as failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff unit between attempts, in milliseconds
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// Pacing delay after each successful upload, in milliseconds
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    /// Safety margin subtracted from token lifetimes, in seconds
    #[serde(default = "default_token_margin_secs")]
    pub token_margin_secs: u64,
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Local root for the filesystem blob store
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,

    /// Bucket name used in returned references
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

/// Form template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Blob path prefix the template skeletons live under
    #[serde(default = "default_template_prefix")]
    pub prefix: String,

    /// Start-event template document name
    #[serde(default = "default_start_template")]
    pub start_name: String,

    /// User-task template document name
    #[serde(default = "default_task_template")]
    pub task_name: String,
}

/// Text-generation collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TextGenConfig {
    /// Generation endpoint; drafting is disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Model identifier passed through to the endpoint
    #[serde(default = "default_textgen_model")]
    pub model: String,
}

// Default functions
fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_base_url() -> String {
    "https://modeler.camunda.io".to_string()
}

fn default_token_url() -> String {
    "https://login.cloud.camunda.io/oauth/token".to_string()
}

fn default_audience() -> String {
    "api.cloud.camunda.io".to_string()
}

fn default_client_id_env() -> String {
    "MODELBRIDGE_CLIENT_ID".to_string()
}

fn default_client_secret_env() -> String {
    "MODELBRIDGE_CLIENT_SECRET".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_unit_ms() -> u64 {
    500
}

fn default_pacing_ms() -> u64 {
    300
}

fn default_token_margin_secs() -> u64 {
    60
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("exports")
}

fn default_bucket() -> String {
    "manual-service-bundles".to_string()
}

fn default_template_prefix() -> String {
    "templates".to_string()
}

fn default_start_template() -> String {
    "start.json".to_string()
}

fn default_task_template() -> String {
    "task.json".to_string()
}

fn default_textgen_model() -> String {
    "text-draft-1".to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ModelerConfig {
    fn default() -> Self {
        ModelerConfig {
            base_url: default_base_url(),
            token_url: default_token_url(),
            audience: default_audience(),
            client_id_env: default_client_id_env(),
            client_secret_env: default_client_secret_env(),
            project_name: None,
            max_attempts: default_max_attempts(),
            backoff_unit_ms: default_backoff_unit_ms(),
            pacing_ms: default_pacing_ms(),
            token_margin_secs: default_token_margin_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            root: default_storage_root(),
            bucket: default_bucket(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        TemplatesConfig {
            prefix: default_template_prefix(),
            start_name: default_start_template(),
            task_name: default_task_template(),
        }
    }
}


pub mod loader;

pub use loader::ConfigLoader;
