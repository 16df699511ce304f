//! Domain layer for the spec-refine pipeline
//!
//! Core models, errors and the ports adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
