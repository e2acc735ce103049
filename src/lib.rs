#![deny(missing_docs)]

//! Core library for the docflow document pipelines.

/// HTTP routing for upload events.
pub mod api;
/// Completion client abstraction and adapters.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Upload-event handling and result writing.
pub mod handler;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Text detection for scanned inputs.
pub mod ocr;
/// Token estimation, chunking, prompting and combination.
pub mod processing;
/// Object storage abstraction and adapters.
pub mod storage;
