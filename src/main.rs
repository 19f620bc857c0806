// src/main.rs

use color_eyre::eyre::{Result, WrapErr, bail};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use vanguard_scan_task::core::analyzer::CheckRegistry;
use vanguard_scan_task::core::models::Scan;
use vanguard_scan_task::core::retriever::{HttpRetriever, normalize_hostname};
use vanguard_scan_task::core::storage::{JsonFileStore, StateStore};
use vanguard_scan_task::{ScanOutcome, ScanTask, Settings, logging};

const USAGE: &str = "usage: vanguard-scan-task <hostname> <site_id> <scan_id>";

/// Runs one scan task to completion and prints its outcome as JSON.
///
/// The scan is registered as pending in the JSON store first, playing the
/// part of the enqueuer, so the binary can be pointed at any host directly.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    logging::initialize_logging()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [raw_host, site_id, scan_id] = args.as_slice() else {
        bail!(USAGE);
    };
    let hostname = normalize_hostname(raw_host);
    let site_id: u64 = site_id
        .parse()
        .wrap_err_with(|| format!("invalid site_id '{}'\n{}", site_id, USAGE))?;
    let scan_id: u64 = scan_id
        .parse()
        .wrap_err_with(|| format!("invalid scan_id '{}'\n{}", scan_id, USAGE))?;

    let settings = Settings::from_env().wrap_err("invalid configuration")?;
    info!(?settings, "Configuration loaded.");

    let store = Arc::new(
        JsonFileStore::open(&settings.data_dir)
            .wrap_err_with(|| format!("cannot open scan store at {}", settings.data_dir.display()))?,
    );
    store
        .insert_pending(Scan {
            scan_id,
            site_id,
            hostname: hostname.clone(),
        })
        .await
        .wrap_err("failed to register scan")?;

    let retriever = HttpRetriever::new(&settings.user_agent, settings.request_timeout)
        .wrap_err("failed to build HTTP retriever")?;
    let task = ScanTask::new(
        Arc::new(retriever),
        CheckRegistry::default_checks(),
        store.clone(),
        store.clone(),
        settings.task.clone(),
    );

    let outcome = task
        .run(&hostname, site_id, scan_id)
        .await
        .wrap_err("failed to persist scan state")?;

    let results = store.memory().results(scan_id).await;
    let report = match &outcome {
        ScanOutcome::Complete(summary) => json!({
            "hostname": hostname,
            "scan_id": scan_id,
            "state": outcome.state(),
            "summary": summary,
            "results": results,
        }),
        ScanOutcome::Failed(_) => json!({
            "hostname": hostname,
            "scan_id": scan_id,
            "state": outcome.state(),
            "error": outcome.reason(),
            "results": results,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(path = %store.path_for(scan_id).display(), "Scan document saved.");

    Ok(())
}
