// src/core/errors.rs

use crate::core::models::ScanState;
use thiserror::Error;

/// Why a scan did not complete.
///
/// Only the three kinds the controller can act on are distinguished; every
/// other error is flattened into `Unclassified` with its display text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanFailure {
    #[error("site down")]
    Connectivity,
    #[error("site unresponsive")]
    Timeout,
    #[error("{0}")]
    Unclassified(String),
}

impl ScanFailure {
    /// The reason string persisted next to the terminal state.
    pub fn reason(&self) -> String {
        self.to_string()
    }

    pub fn terminal_state(&self) -> ScanState {
        match self {
            ScanFailure::Timeout => ScanState::Aborted,
            ScanFailure::Connectivity | ScanFailure::Unclassified(_) => ScanState::Failed,
        }
    }
}

/// Failure to persist a state transition. Never recovered locally.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("scan {0} is not known to the state store")]
    UnknownScan(u64),
    #[error("scan {scan_id} cannot move from {from} to {to}")]
    InvalidTransition {
        scan_id: u64,
        from: ScanState,
        to: ScanState,
    },
    #[error("state store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("scan {0} is not known to the result recorder")]
    UnknownScan(u64),
    #[error("result recorder I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("result recorder serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("retrieval timed out")]
    Timeout,
    #[error("invalid hostname '{0}'")]
    Hostname(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("response '{0}' is missing from the retrieval bundle")]
    MissingResponse(&'static str),
    #[error("result code '{0}' is not in the knowledge base")]
    UnknownResult(&'static str),
    #[error("{0}")]
    Evaluation(String),
}

impl From<RetrieveError> for ScanFailure {
    fn from(err: RetrieveError) -> Self {
        match err {
            RetrieveError::Timeout => ScanFailure::Timeout,
            other => ScanFailure::Unclassified(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reasons_and_states() {
        assert_eq!(ScanFailure::Connectivity.reason(), "site down");
        assert_eq!(ScanFailure::Connectivity.terminal_state(), ScanState::Failed);
        assert_eq!(ScanFailure::Timeout.reason(), "site unresponsive");
        assert_eq!(ScanFailure::Timeout.terminal_state(), ScanState::Aborted);

        let other = ScanFailure::Unclassified("boom".into());
        assert_eq!(other.reason(), "boom");
        assert_eq!(other.terminal_state(), ScanState::Failed);
    }

    #[test]
    fn retrieval_timeout_is_not_unclassified() {
        assert_eq!(ScanFailure::from(RetrieveError::Timeout), ScanFailure::Timeout);
        assert_eq!(
            ScanFailure::from(RetrieveError::Hostname("".into())),
            ScanFailure::Unclassified("invalid hostname ''".into())
        );
    }
}
