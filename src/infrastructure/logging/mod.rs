//! Structured logging using tracing and tracing-subscriber.
//!
//! Console output (pretty or JSON) goes to stderr; optional rolling JSON log
//! files are written through tracing-appender.

pub mod logger;

pub use logger::LoggerImpl;
