//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - Programmatic defaults
//! - Project YAML files under `.spec-refine/`
//! - `SPEC_REFINE_*` environment overrides
//! - Validation after extraction

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, ENV_PREFIX, PROJECT_DIR};
