pub mod config;
pub mod error;
pub mod governor;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod source;
pub mod store;
pub mod testutil;

pub use config::{OrchestratorConfig, SourceConfig};
pub use error::AppError;
pub use models::{JobRecord, Snapshot, record_id};
pub use orchestrator::{CycleOutcome, CycleReport, Orchestrator, SourceReport};
pub use source::SourceAdapter;
pub use store::{JsonFileStore, MemoryStore, SnapshotStore};
