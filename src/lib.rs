//! spec-refine: iterative specification refinement.
//!
//! A seed document moves through automated refinement phases (analyze,
//! research and integrate sub-tasks per iteration, stopped by a convergence
//! detector) and human review gates until it is finalized.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the port traits
//! - **Service Layer** (`services`): tier model, convergence detection, phase
//!   machine, sub-task orchestration and the refinement pipeline
//! - **Adapters** (`adapters`): SQLite document store, external-process sub-tasks
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, DocumentHeader, IterationOutcome, IterationRecord, Item, Phase, SpecDocument, Tier,
};
pub use domain::ports::{Analyzer, DocumentStore, FindingSink, Integrator, Researcher};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ConvergenceDetector, ConvergenceThresholds, RefinementPipeline, SubtaskOrchestrator};
