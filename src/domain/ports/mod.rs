//! Port trait definitions (Hexagonal Architecture)
//!
//! Adapters implement these to plug storage and sub-task execution into the
//! refinement services:
//! - DocumentStore: persistence of documents and their audit log
//! - Analyzer, Researcher, Integrator: the three sub-task steps

pub mod document_store;
pub mod subtasks;

pub use document_store::DocumentStore;
pub use subtasks::{Analyzer, FindingSink, Integrator, Researcher};
