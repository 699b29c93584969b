pub mod blob;
pub mod bpmn;
pub mod bundle;
pub mod config;
pub mod describe;
pub mod error;
pub mod export;
pub mod forms;
pub mod notify;
pub mod store;
pub mod textgen;
pub mod transfer;
pub mod types;

pub use blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use bpmn::{is_likely_corrupted, ProcessDocument};
pub use bundle::{Bundle, BundleBuilder, Manifest};
pub use config::{BridgeConfig, ConfigLoader};
pub use describe::{DescriptionResolver, ReferenceEntry};
pub use error::AppError;
pub use export::{ExportPackager, ExportResult};
pub use forms::{FormContext, TemplateEngine};
pub use notify::{ChangeHub, DebouncedSaver};
pub use store::{MemoryStore, ServiceStore};
pub use textgen::{DescriptionDrafter, TextGenerator};
pub use transfer::{TransferEngine, TransferResult};
pub use types::*;
