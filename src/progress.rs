//! Progress-callback trait for per-issue download events.
//!
//! Inject an [`Arc<dyn FetchProgressCallback>`] via
//! [`crate::config::FetchConfigBuilder::progress_callback`] to receive
//! real-time events as workers process their shards.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a terminal progress bar, a log file, or a metrics
//! pipeline without the library knowing anything about how the host
//! application communicates. The trait is `Send + Sync` because workers run
//! on independent tokio tasks and fire events concurrently.

use std::path::Path;
use std::sync::Arc;

use crate::range::WorkItem;

/// Called by workers as issues and pages make progress.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Methods for different issues may be called
/// concurrently from different workers; implementations must protect shared
/// mutable state.
pub trait FetchProgressCallback: Send + Sync {
    /// An issue download started; `total_pages` is the viewer's page count.
    fn on_issue_start(&self, item: WorkItem, total_pages: u64) {
        let _ = (item, total_pages);
    }

    /// Progress advanced by `units` single pages (1 for a lone page,
    /// 2 for a stitched spread).
    fn on_pages_advanced(&self, item: WorkItem, units: u64) {
        let _ = (item, units);
    }

    /// A whole spread was dropped because its left capture was lost.
    fn on_spread_skipped(&self, item: WorkItem, canvas_index: u32) {
        let _ = (item, canvas_index);
    }

    /// A single page capture was lost (absent cover or right-hand page).
    fn on_page_missing(&self, item: WorkItem, canvas_index: u32) {
        let _ = (item, canvas_index);
    }

    /// The issue's document was saved.
    fn on_issue_complete(&self, item: WorkItem, path: &Path) {
        let _ = (item, path);
    }

    /// A download attempt failed and will be retried.
    fn on_issue_retry(&self, item: WorkItem, attempt: u32, error: &str) {
        let _ = (item, attempt, error);
    }

    /// Every attempt failed; the issue is skipped and the shard continues.
    fn on_issue_failed(&self, item: WorkItem, attempts: u32, error: &str) {
        let _ = (item, attempts, error);
    }

    /// A worker finished its shard.
    fn on_worker_finished(&self, worker: usize, completed: usize, skipped: usize) {
        let _ = (worker, completed, skipped);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl FetchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FetchConfig`].
pub type ProgressCallback = Arc<dyn FetchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingCallback {
        units: AtomicU64,
        skips: AtomicU64,
    }

    impl FetchProgressCallback for CountingCallback {
        fn on_pages_advanced(&self, _item: WorkItem, units: u64) {
            self.units.fetch_add(units, Ordering::SeqCst);
        }

        fn on_spread_skipped(&self, _item: WorkItem, _canvas_index: u32) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let item = WorkItem { year: 2024, month: 0 };
        cb.on_issue_start(item, 120);
        cb.on_pages_advanced(item, 2);
        cb.on_spread_skipped(item, 4);
        cb.on_page_missing(item, 5);
        cb.on_issue_retry(item, 1, "boom");
        cb.on_issue_failed(item, 3, "boom");
        cb.on_issue_complete(item, Path::new("natgeo-2024-01.pdf"));
        cb.on_worker_finished(0, 3, 1);
    }

    #[test]
    fn counting_callback_accumulates_units() {
        let cb = CountingCallback {
            units: AtomicU64::new(0),
            skips: AtomicU64::new(0),
        };
        let item = WorkItem { year: 2024, month: 5 };
        cb.on_pages_advanced(item, 1);
        cb.on_pages_advanced(item, 2);
        cb.on_spread_skipped(item, 8);
        assert_eq!(cb.units.load(Ordering::SeqCst), 3);
        assert_eq!(cb.skips.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_issue_start(WorkItem { year: 1970, month: 11 }, 10);
    }
}
