pub mod audit;
pub mod config;
pub mod document;
pub mod item;
pub mod subtask;

pub use audit::{FailureDetail, IterationOutcome, IterationRecord};
pub use config::{
    CommandConfig, Config, DatabaseConfig, LogFormat, LoggingConfig, RefinementConfig,
    RotationPolicy, SubtasksConfig,
};
pub use document::{is_valid_document_id, ConvergenceSnapshot, DocumentHeader, Phase, Section, SpecDocument};
pub use item::{content_key, item_id, Item, Origin, Tier};
pub use subtask::{
    AmbiguityItem, FindingItem, FindingVerdict, SubtaskKind, SubtaskResult, SubtaskStep,
};
