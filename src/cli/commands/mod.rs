//! CLI command implementations.

pub mod export;
pub mod init;
pub mod refine;
pub mod review;
pub mod seed;
pub mod status;
