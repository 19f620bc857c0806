// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString};

// --- Scan Lifecycle ---

/// The persisted state of a scan.
///
/// A scan is created as `Pending` by whoever enqueues it, moves to `Started`
/// when a worker picks it up, and ends in exactly one of the terminal states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanState {
    Pending,
    Started,
    Failed,
    Aborted,
    Complete,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Failed | ScanState::Aborted | ScanState::Complete)
    }

    /// Returns whether a scan currently in `self` may be moved to `next`.
    ///
    /// `Started -> Started` is accepted so that an attempt re-dispatched after
    /// a worker crash can announce itself again. Nothing leaves a terminal state.
    pub fn can_transition_to(self, next: ScanState) -> bool {
        match (self, next) {
            (ScanState::Pending, ScanState::Started) => true,
            (ScanState::Started, ScanState::Started) => true,
            (ScanState::Started, n) => n.is_terminal(),
            _ => false,
        }
    }
}

// A scan as created by the enqueuer, before any worker touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scan {
    pub scan_id: u64,
    pub site_id: u64,
    pub hostname: String,
}

// --- Retrieval ---

/// A single HTTP response as captured by the retriever.
///
/// Header names are stored lower-cased; a header sent several times keeps all
/// of its values in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Option<String>,
    pub redirects: Vec<String>,
    pub verified: bool,
}

impl ResponseSnapshot {
    /// First value of a header, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Every value of a header, in arrival order.
    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Key of the primary connectivity probe inside a [`RetrievalBundle`].
pub const AUTO: &str = "auto";

/// Everything the retriever gathered for one hostname.
///
/// `responses[AUTO] == None` means the host could not be reached at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalBundle {
    pub hostname: String,
    pub responses: BTreeMap<String, Option<ResponseSnapshot>>,
    pub resources: BTreeMap<String, Option<String>>,
}

impl RetrievalBundle {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    pub fn with_response(mut self, key: &str, response: Option<ResponseSnapshot>) -> Self {
        self.responses.insert(key.to_string(), response);
        self
    }

    pub fn with_resource(mut self, key: &str, content: Option<String>) -> Self {
        self.resources.insert(key.to_string(), content);
        self
    }

    pub fn response(&self, key: &str) -> Option<&ResponseSnapshot> {
        self.responses.get(key).and_then(Option::as_ref)
    }

    pub fn auto(&self) -> Option<&ResponseSnapshot> {
        self.response(AUTO)
    }

    pub fn resource(&self, key: &str) -> Option<&str> {
        self.resources.get(key).and_then(|r| r.as_deref())
    }
}

// --- Check Results ---

// The outcome of a single analyzer check. The controller never looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub expectation: String,
    pub result: String,
    pub pass: bool,
    pub score_modifier: i32,
    pub output: serde_json::Value,
}

/// A persisted check outcome, unique per (`scan_id`, `check_name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResultRecord {
    pub site_id: u64,
    pub scan_id: u64,
    pub check_name: String,
    pub result: CheckResult,
    pub recorded_at: DateTime<Utc>,
}

impl TestResultRecord {
    pub fn new(site_id: u64, scan_id: u64, check_name: impl Into<String>, result: CheckResult) -> Self {
        Self {
            site_id,
            scan_id,
            check_name: check_name.into(),
            result,
            recorded_at: Utc::now(),
        }
    }
}

// --- Summary ---

// Aggregate numbers for a completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub tests_quantity: usize,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub score: u32,
    pub grade: String,
}
