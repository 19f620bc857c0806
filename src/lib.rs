// src/lib.rs

//! A single scan task for a web security scanner: retrieve a host's
//! responses, run every registered check against them, and leave the scan in
//! a terminal state no matter how the run ends.

pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::{Settings, TaskConfig};
pub use crate::core::errors::{ScanFailure, StoreError};
pub use crate::core::models::{ScanState, ScanSummary};
pub use crate::core::task::{ScanOutcome, ScanTask};
