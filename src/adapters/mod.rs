//! Adapters for persistence and external sub-task processes.

pub mod sqlite;
pub mod subtasks;
