//! Sub-task implementations backed by external programs.

pub mod command;

pub use command::CommandSubtask;
