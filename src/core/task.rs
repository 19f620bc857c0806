// src/core/task.rs

use std::any::Any;
use std::error::Error;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_error::SpanTrace;

use crate::config::TaskConfig;
use crate::core::analyzer::{Check, CheckRegistry, check_name};
use crate::core::errors::{CheckError, RetrieveError, ScanFailure, StoreError};
use crate::core::grading;
use crate::core::models::{CheckResult, RetrievalBundle, ScanState, ScanSummary, TestResultRecord};
use crate::core::retriever::Retriever;
use crate::core::storage::{ResultRecorder, StateStore};

/// How a single run of the scan task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Complete(ScanSummary),
    Failed(ScanFailure),
}

impl ScanOutcome {
    /// The terminal state that was persisted for this outcome.
    pub fn state(&self) -> ScanState {
        match self {
            ScanOutcome::Complete(_) => ScanState::Complete,
            ScanOutcome::Failed(failure) => failure.terminal_state(),
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            ScanOutcome::Complete(_) => None,
            ScanOutcome::Failed(failure) => Some(failure.reason()),
        }
    }
}

// A failure plus, for unexpected errors, the original error for diagnostics.
struct Interrupted {
    failure: ScanFailure,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl Interrupted {
    fn unclassified(err: impl Error + Send + Sync + 'static) -> Self {
        Self {
            failure: ScanFailure::Unclassified(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}

impl From<ScanFailure> for Interrupted {
    fn from(failure: ScanFailure) -> Self {
        Self { failure, source: None }
    }
}

impl From<RetrieveError> for Interrupted {
    fn from(err: RetrieveError) -> Self {
        match err {
            RetrieveError::Timeout => ScanFailure::Timeout.into(),
            other => Interrupted::unclassified(other),
        }
    }
}

/// The scan controller.
///
/// Drives one scan from `STARTED` to a terminal state: retrieval, the
/// connectivity short-circuit, every registered check in order, and the final
/// state write. It is the only writer of terminal state for the scans it runs.
pub struct ScanTask {
    retriever: Arc<dyn Retriever>,
    checks: CheckRegistry,
    states: Arc<dyn StateStore>,
    recorder: Arc<dyn ResultRecorder>,
    config: TaskConfig,
}

impl ScanTask {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        checks: CheckRegistry,
        states: Arc<dyn StateStore>,
        recorder: Arc<dyn ResultRecorder>,
        config: TaskConfig,
    ) -> Self {
        Self {
            retriever,
            checks,
            states,
            recorder,
            config,
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn checks(&self) -> &CheckRegistry {
        &self.checks
    }

    /// Runs the scan and persists its terminal state.
    ///
    /// Every failure of retrieval, of a check or of the recorder is turned
    /// into a `FAILED` or `ABORTED` state write and returned as
    /// [`ScanOutcome::Failed`]. Only a failed *state* write is returned as
    /// `Err`, since the scan's state can then no longer be trusted.
    #[instrument(name = "scan", skip(self))]
    pub async fn run(&self, hostname: &str, site_id: u64, scan_id: u64) -> Result<ScanOutcome, StoreError> {
        self.states.set_state(scan_id, ScanState::Started, None).await?;
        info!("Scan started.");

        let body = self.execute(hostname, site_id, scan_id);
        let interrupted = match tokio::time::timeout(self.config.hard_time_limit, body).await {
            Ok(Ok(summary)) => {
                self.states.set_state(scan_id, ScanState::Complete, None).await?;
                info!(score = summary.score, grade = %summary.grade, tests = summary.tests_quantity, "Scan complete.");
                return Ok(ScanOutcome::Complete(summary));
            }
            Ok(Err(interrupted)) => interrupted,
            Err(_) => {
                warn!(limit = ?self.config.hard_time_limit, "Hard time limit exceeded.");
                ScanFailure::Timeout.into()
            }
        };

        let failure = interrupted.failure;
        if self.config.debug && matches!(failure, ScanFailure::Unclassified(_)) {
            let span_trace = SpanTrace::capture();
            let chain = match interrupted.source.as_deref() {
                Some(source) => format!("{source:?}"),
                None => failure.reason(),
            };
            error!(hostname, error = %chain, %span_trace, "Error detected in scan.");
        }

        let state = failure.terminal_state();
        let reason = failure.reason();
        self.states.set_state(scan_id, state, Some(&reason)).await?;
        warn!(%state, reason = %reason, "Scan did not complete.");
        Ok(ScanOutcome::Failed(failure))
    }

    async fn execute(&self, hostname: &str, site_id: u64, scan_id: u64) -> Result<ScanSummary, Interrupted> {
        // Rows from an earlier attempt must not sit next to this attempt's outcome.
        self.recorder.clear(scan_id).await.map_err(Interrupted::unclassified)?;

        let bundle = self.retrieve(hostname).await?;

        if bundle.auto().is_none() {
            info!("Primary probe returned no response.");
            return Err(ScanFailure::Connectivity.into());
        }

        let mut results: Vec<CheckResult> = Vec::with_capacity(self.checks.len());
        for check in self.checks.iter() {
            let name = check_name(check.id());
            let result = evaluate_guarded(check, &bundle).map_err(Interrupted::unclassified)?;
            debug!(check = %name, result = %result.result, pass = result.pass, "Check evaluated.");

            let record = TestResultRecord::new(site_id, scan_id, name, result);
            self.recorder.record(&record).await.map_err(Interrupted::unclassified)?;
            results.push(record.result);
        }

        Ok(grading::summarize(&results))
    }

    async fn retrieve(&self, hostname: &str) -> Result<RetrievalBundle, Interrupted> {
        let limit = self.config.soft_time_limit;
        match tokio::time::timeout(limit, self.retriever.retrieve_all(hostname)).await {
            Ok(bundle) => Ok(bundle?),
            Err(_) => {
                warn!(limit = ?limit, "Soft time limit exceeded during retrieval.");
                Err(ScanFailure::Timeout.into())
            }
        }
    }
}

// A panicking check is reported like any other check error.
fn evaluate_guarded(check: &dyn Check, bundle: &RetrievalBundle) -> Result<CheckResult, CheckError> {
    catch_unwind(AssertUnwindSafe(|| check.evaluate(bundle))).unwrap_or_else(|payload| {
        Err(CheckError::Evaluation(format!(
            "check {} panicked: {}",
            check.id(),
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
