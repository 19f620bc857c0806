// src/core/storage.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::errors::{RecorderError, StoreError};
use crate::core::models::{Scan, ScanState, TestResultRecord};

// --- Collaborator Contracts ---

/// Persists scan lifecycle transitions.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Registers a scan as `PENDING`. This is the enqueuer's job; workers
    /// never call it.
    async fn insert_pending(&self, scan: Scan) -> Result<(), StoreError>;

    async fn set_state(&self, scan_id: u64, state: ScanState, reason: Option<&str>) -> Result<(), StoreError>;
}

/// Persists per-check results.
///
/// Records are keyed by (`scan_id`, `check_name`): recording the same key
/// again replaces the earlier record, so a retried task never duplicates rows.
#[async_trait]
pub trait ResultRecorder: Send + Sync {
    async fn record(&self, record: &TestResultRecord) -> Result<(), RecorderError>;

    /// Drops every record of a scan. Called when an attempt starts, so the
    /// rows left after a failure belong to that attempt alone.
    async fn clear(&self, scan_id: u64) -> Result<(), RecorderError>;
}

// Everything stored about a scan, as written to disk by `JsonFileStore`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanDocument {
    pub scan: Option<Scan>,
    pub state: Option<ScanState>,
    pub reason: Option<String>,
    pub results: Vec<TestResultRecord>,
}

// --- In-Memory Backend ---

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    scans: Arc<RwLock<BTreeMap<u64, ScanDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self, scan_id: u64) -> Option<(ScanState, Option<String>)> {
        let scans = self.scans.read().await;
        let doc = scans.get(&scan_id)?;
        doc.state.map(|s| (s, doc.reason.clone()))
    }

    /// Results of a scan in the order their keys were first recorded.
    pub async fn results(&self, scan_id: u64) -> Vec<TestResultRecord> {
        self.scans
            .read()
            .await
            .get(&scan_id)
            .map(|doc| doc.results.clone())
            .unwrap_or_default()
    }

    pub async fn document(&self, scan_id: u64) -> Option<ScanDocument> {
        self.scans.read().await.get(&scan_id).cloned()
    }

    /// Puts a scan back to `PENDING` so the queue can dispatch it again.
    pub async fn requeue(&self, scan_id: u64) -> Result<(), StoreError> {
        let mut scans = self.scans.write().await;
        let doc = scans
            .get_mut(&scan_id)
            .filter(|d| d.scan.is_some())
            .ok_or(StoreError::UnknownScan(scan_id))?;
        doc.state = Some(ScanState::Pending);
        doc.reason = None;
        info!(scan_id, "Scan requeued.");
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn insert_pending(&self, scan: Scan) -> Result<(), StoreError> {
        let mut scans = self.scans.write().await;
        let doc = scans.entry(scan.scan_id).or_default();
        debug!(scan_id = scan.scan_id, hostname = %scan.hostname, "Scan registered as pending.");
        doc.scan = Some(scan);
        doc.state = Some(ScanState::Pending);
        doc.reason = None;
        Ok(())
    }

    async fn set_state(&self, scan_id: u64, state: ScanState, reason: Option<&str>) -> Result<(), StoreError> {
        let mut scans = self.scans.write().await;
        let doc = scans.get_mut(&scan_id).ok_or(StoreError::UnknownScan(scan_id))?;
        let current = doc.state.ok_or(StoreError::UnknownScan(scan_id))?;

        if !current.can_transition_to(state) {
            return Err(StoreError::InvalidTransition {
                scan_id,
                from: current,
                to: state,
            });
        }

        doc.state = Some(state);
        doc.reason = reason.map(String::from);
        debug!(scan_id, from = %current, to = %state, reason, "Scan state updated.");
        Ok(())
    }
}

#[async_trait]
impl ResultRecorder for MemoryStore {
    async fn record(&self, record: &TestResultRecord) -> Result<(), RecorderError> {
        let mut scans = self.scans.write().await;
        let results = &mut scans
            .get_mut(&record.scan_id)
            .filter(|d| d.scan.is_some())
            .ok_or(RecorderError::UnknownScan(record.scan_id))?
            .results;

        match results.iter_mut().find(|r| r.check_name == record.check_name) {
            Some(existing) => *existing = record.clone(),
            None => results.push(record.clone()),
        }
        debug!(scan_id = record.scan_id, check = %record.check_name, "Test result recorded.");
        Ok(())
    }

    async fn clear(&self, scan_id: u64) -> Result<(), RecorderError> {
        let mut scans = self.scans.write().await;
        let doc = scans
            .get_mut(&scan_id)
            .filter(|d| d.scan.is_some())
            .ok_or(RecorderError::UnknownScan(scan_id))?;
        let dropped = doc.results.len();
        doc.results.clear();
        debug!(scan_id, dropped, "Test results cleared.");
        Ok(())
    }
}

// --- JSON File Backend ---

/// A [`MemoryStore`] mirrored to one pretty-printed JSON file per scan.
///
/// Files are rewritten in full after every change and reloaded by [`open`],
/// so a worker restarted on the same directory sees earlier scans.
///
/// [`open`]: JsonFileStore::open
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    inner: MemoryStore,
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut scans = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if !is_scan_file(&path) {
                continue;
            }
            let doc: ScanDocument = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
            if let Some(scan_id) = doc.scan.as_ref().map(|s| s.scan_id) {
                scans.insert(scan_id, doc);
            }
        }

        info!(dir = %dir.display(), scans = scans.len(), "Opened JSON scan store.");
        let inner = MemoryStore {
            scans: Arc::new(RwLock::new(scans)),
        };
        Ok(Self { inner, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn path_for(&self, scan_id: u64) -> PathBuf {
        self.dir.join(format!("scan-{}.json", scan_id))
    }

    async fn flush<E>(&self, scan_id: u64) -> Result<(), E>
    where
        E: From<std::io::Error> + From<serde_json::Error>,
    {
        let Some(doc) = self.inner.document(scan_id).await else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(&doc)?;

        let path = self.path_for(scan_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "Scan document written.");
        Ok(())
    }
}

fn is_scan_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "json")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("scan-"))
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn insert_pending(&self, scan: Scan) -> Result<(), StoreError> {
        let scan_id = scan.scan_id;
        self.inner.insert_pending(scan).await?;
        self.flush(scan_id).await
    }

    async fn set_state(&self, scan_id: u64, state: ScanState, reason: Option<&str>) -> Result<(), StoreError> {
        self.inner.set_state(scan_id, state, reason).await?;
        self.flush(scan_id).await
    }
}

#[async_trait]
impl ResultRecorder for JsonFileStore {
    async fn record(&self, record: &TestResultRecord) -> Result<(), RecorderError> {
        self.inner.record(record).await?;
        self.flush(record.scan_id).await
    }

    async fn clear(&self, scan_id: u64) -> Result<(), RecorderError> {
        self.inner.clear(scan_id).await?;
        self.flush(scan_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::CheckResult;

    fn scan(scan_id: u64) -> Scan {
        Scan {
            scan_id,
            site_id: 7,
            hostname: "example.com".into(),
        }
    }

    fn record(scan_id: u64, name: &str, modifier: i32) -> TestResultRecord {
        TestResultRecord::new(
            7,
            scan_id,
            name,
            CheckResult {
                expectation: "x".into(),
                result: "y".into(),
                pass: modifier >= 0,
                score_modifier: modifier,
                output: serde_json::Value::Null,
            },
        )
    }

    #[tokio::test]
    async fn unknown_scan_is_rejected() {
        let store = MemoryStore::new();
        let err = store.set_state(1, ScanState::Started, None).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownScan(1)));
    }

    #[tokio::test]
    async fn terminal_state_is_final() {
        let store = MemoryStore::new();
        store.insert_pending(scan(1)).await.unwrap();
        store.set_state(1, ScanState::Started, None).await.unwrap();
        store.set_state(1, ScanState::Failed, Some("site down")).await.unwrap();

        let err = store.set_state(1, ScanState::Complete, None).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition { from: ScanState::Failed, to: ScanState::Complete, .. }
        ));
        assert_eq!(store.state(1).await, Some((ScanState::Failed, Some("site down".into()))));
    }

    #[tokio::test]
    async fn requeue_allows_a_second_run() {
        let store = MemoryStore::new();
        store.insert_pending(scan(1)).await.unwrap();
        store.set_state(1, ScanState::Started, None).await.unwrap();
        store.set_state(1, ScanState::Complete, None).await.unwrap();

        store.requeue(1).await.unwrap();
        assert_eq!(store.state(1).await, Some((ScanState::Pending, None)));
        store.set_state(1, ScanState::Started, None).await.unwrap();
        assert!(matches!(store.requeue(2).await, Err(StoreError::UnknownScan(2))));
    }

    #[tokio::test]
    async fn records_overwrite_by_check_name() {
        let store = MemoryStore::new();
        store.insert_pending(scan(1)).await.unwrap();
        store.record(&record(1, "cookies", 0)).await.unwrap();
        store.record(&record(1, "x-frame-options", -20)).await.unwrap();
        store.record(&record(1, "cookies", -30)).await.unwrap();

        let results = store.results(1).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].check_name, "cookies");
        assert_eq!(results[0].result.score_modifier, -30);
        assert_eq!(results[1].check_name, "x-frame-options");
    }

    #[tokio::test]
    async fn records_need_a_registered_scan() {
        let store = MemoryStore::new();
        let err = store.record(&record(5, "cookies", 0)).await.unwrap_err();
        assert!(matches!(err, RecorderError::UnknownScan(5)));
        assert!(matches!(store.clear(5).await, Err(RecorderError::UnknownScan(5))));
        assert!(store.document(5).await.is_none());
    }

    #[tokio::test]
    async fn clear_drops_only_that_scans_records() {
        let store = MemoryStore::new();
        store.insert_pending(scan(1)).await.unwrap();
        store.insert_pending(scan(2)).await.unwrap();
        store.record(&record(1, "cookies", 0)).await.unwrap();
        store.record(&record(2, "cookies", 0)).await.unwrap();

        store.clear(1).await.unwrap();
        assert!(store.results(1).await.is_empty());
        assert_eq!(store.results(2).await.len(), 1);
        assert_eq!(store.state(1).await, Some((ScanState::Pending, None)));
    }

    #[tokio::test]
    async fn json_store_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(tmp.path()).unwrap();
            store.insert_pending(scan(3)).await.unwrap();
            store.set_state(3, ScanState::Started, None).await.unwrap();
            store.record(&record(3, "cookies", 0)).await.unwrap();
            store.set_state(3, ScanState::Complete, None).await.unwrap();
            assert!(store.path_for(3).exists());
        }

        let reopened = JsonFileStore::open(tmp.path()).unwrap();
        let doc = reopened.memory().document(3).await.unwrap();
        assert_eq!(doc.state, Some(ScanState::Complete));
        assert_eq!(doc.results.len(), 1);
        assert_eq!(doc.scan, Some(scan(3)));
    }

    #[tokio::test]
    async fn json_store_ignores_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(tmp.path().join("other.json"), "{not json").unwrap();

        let store = JsonFileStore::open(tmp.path()).unwrap();
        store.insert_pending(scan(9)).await.unwrap();
        store.set_state(9, ScanState::Started, None).await.unwrap();
        store.set_state(9, ScanState::Aborted, Some("site unresponsive")).await.unwrap();

        let written: ScanDocument =
            serde_json::from_str(&std::fs::read_to_string(store.path_for(9)).unwrap()).unwrap();
        assert_eq!(written.reason.as_deref(), Some("site unresponsive"));
    }
}
