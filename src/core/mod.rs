// src/core/mod.rs

/// Data structures shared by every part of the scan task: scan states,
/// retrieval bundles, check results and persisted records.
pub mod models;

/// Error and failure types, including the tagged failure the controller persists.
pub mod errors;

/// Analyzer checks and the ordered registry the controller walks.
pub mod analyzer;

/// Static table of result codes with their score modifiers.
pub mod knowledge_base;

/// Score and grade computation for completed scans.
pub mod grading;

/// The resource retriever contract and its HTTP implementation.
pub mod retriever;

/// State store and result recorder contracts plus in-memory and JSON backends.
pub mod storage;

/// The scan controller.
pub mod task;
