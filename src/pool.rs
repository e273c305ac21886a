//! Worker pool: independent per-shard workers behind a join barrier.
//!
//! One pre-flight single-threaded pass runs the interactive
//! [`SessionManager::establish`] flow and refreshes the shared session-state
//! file. After that, one tokio task per non-empty shard runs to completion
//! in full parallel: each task owns its own [`RenderSurface`] (via the
//! factory), resumes the persisted session read-only, and walks its shard
//! strictly in chronological order. Workers share no mutable state —
//! coordination is the state file (written once, before they start) and the
//! output directory, whose filenames are disjoint across shards by
//! construction — so the only synchronisation point is the final join.
//!
//! A worker that cannot resume the session records its failure in the
//! [`RunSummary`] without disturbing the others; a pre-flight
//! authentication failure aborts the whole run, since no worker could
//! possibly succeed.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::document::SinkFactory;
use crate::error::FetchError;
use crate::pipeline::issue::IssueDownloader;
use crate::range::WorkItem;
use crate::session::{OtpPrompt, SessionManager};
use crate::surface::SurfaceFactory;

/// Aggregated outcome of a pool run.
#[derive(Debug)]
pub struct RunSummary {
    /// Issues whose PDF was saved.
    pub completed: usize,
    /// Issues skipped after exhausting their download retries.
    pub skipped: Vec<WorkItem>,
    /// Workers that aborted before finishing their shard.
    pub worker_failures: Vec<(usize, FetchError)>,
}

impl RunSummary {
    /// True when every issue was saved and every worker finished.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.worker_failures.is_empty()
    }
}

struct WorkerReport {
    worker: usize,
    completed: usize,
    skipped: Vec<WorkItem>,
    failure: Option<FetchError>,
}

/// Run the pool: pre-flight session refresh, then one worker per non-empty
/// shard, joined before returning.
pub async fn run(
    config: Arc<FetchConfig>,
    shards: Vec<Vec<WorkItem>>,
    surfaces: Arc<dyn SurfaceFactory>,
    sinks: Arc<dyn SinkFactory>,
    otp: Arc<dyn OtpPrompt>,
) -> Result<RunSummary, FetchError> {
    std::fs::create_dir_all(&config.output_dir).map_err(|e| FetchError::OutputDir {
        path: config.output_dir.clone(),
        source: e,
    })?;

    // ── Pre-flight: establish/refresh the shared session state ───────────
    {
        let surface = surfaces.create().await?;
        let manager = SessionManager::new(&config.state_path, config.default_timeout);
        let state = manager
            .establish(surface.as_ref(), &config.credentials, otp.as_ref())
            .await?;
        info!(
            "Pre-flight sign-in complete ({} cookies); launching workers",
            state.len()
        );
    }

    // ── Workers ──────────────────────────────────────────────────────────
    let mut handles = Vec::new();
    for (worker, shard) in shards.into_iter().enumerate() {
        if shard.is_empty() {
            debug!("Worker {worker}: empty shard, not launched");
            continue;
        }
        let config = Arc::clone(&config);
        let surfaces = Arc::clone(&surfaces);
        let sinks = Arc::clone(&sinks);
        handles.push(tokio::spawn(run_worker(worker, config, shard, surfaces, sinks)));
    }

    let mut summary = RunSummary {
        completed: 0,
        skipped: Vec::new(),
        worker_failures: Vec::new(),
    };
    for (index, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
        match joined {
            Ok(report) => {
                summary.completed += report.completed;
                summary.skipped.extend(report.skipped);
                if let Some(failure) = report.failure {
                    summary.worker_failures.push((report.worker, failure));
                }
            }
            Err(e) => {
                summary
                    .worker_failures
                    .push((index, FetchError::Internal(format!("worker task panicked: {e}"))));
            }
        }
    }

    info!(
        "Run finished: {} issues saved, {} skipped, {} worker failures",
        summary.completed,
        summary.skipped.len(),
        summary.worker_failures.len()
    );
    Ok(summary)
}

/// One worker: own surface, read-only session resume, shard in order.
async fn run_worker(
    worker: usize,
    config: Arc<FetchConfig>,
    shard: Vec<WorkItem>,
    surfaces: Arc<dyn SurfaceFactory>,
    sinks: Arc<dyn SinkFactory>,
) -> WorkerReport {
    let fail = |failure: FetchError| WorkerReport {
        worker,
        completed: 0,
        skipped: Vec::new(),
        failure: Some(failure),
    };

    debug!(
        "Worker {worker}: {} issues ({} … {})",
        shard.len(),
        shard[0],
        shard[shard.len() - 1]
    );

    let surface = match surfaces.create().await {
        Ok(surface) => surface,
        Err(e) => {
            warn!("Worker {worker}: could not create a surface — {e}");
            return fail(e);
        }
    };

    // Workers never run the interactive flow; a stale state file surfaces
    // as an auth failure here and the other workers keep going.
    let manager = SessionManager::new(&config.state_path, config.default_timeout);
    if let Err(e) = manager.resume(surface.as_ref()).await {
        warn!("Worker {worker}: session resume failed — {e}");
        return fail(e);
    }

    let downloader = IssueDownloader::new(&config);
    let mut completed = 0;
    let mut skipped = Vec::new();
    for item in shard {
        match downloader
            .download_with_retry(surface.as_ref(), sinks.as_ref(), item)
            .await
        {
            Some(_path) => completed += 1,
            None => skipped.push(item),
        }
    }

    info!(
        "Worker {worker} finished: {completed} saved, {} skipped",
        skipped.len()
    );
    if let Some(cb) = &config.progress_callback {
        cb.on_worker_finished(worker, completed, skipped.len());
    }

    WorkerReport {
        worker,
        completed,
        skipped,
        failure: None,
    }
}
