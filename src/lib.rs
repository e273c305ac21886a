//! # natgeo-fetch
//!
//! Download National Geographic archive issues into one PDF per issue.
//!
//! ## Why this crate?
//!
//! The archive serves each issue page-by-page through a browser-only
//! flipbook viewer behind an authenticated session — there is no bulk
//! export. This crate drives that viewer: it establishes (and persists) the
//! signed-in session, captures every rendered page canvas with bounded
//! retries, stitches facing pages into spreads, and streams the result into
//! a paged PDF, one issue per (month, year) across an inclusive date range,
//! fanned out over independent parallel workers.
//!
//! ## Pipeline Overview
//!
//! ```text
//! date range
//!  │
//!  ├─ 1. Range      expand MM-YYYY--MM-YYYY into (month, year) work items
//!  ├─ 2. Partition  split the items into N contiguous, near-equal shards
//!  ├─ 3. Session    pre-flight sign-in (cookie replay / e-mail / OTP), persisted
//!  ├─ 4. Workers    one browser per shard, session resumed read-only
//!  ├─ 5. Capture    per-canvas extraction with fixed-delay bounded retries
//!  ├─ 6. Assemble   lone pages pass through, facing pages stitch on white
//!  └─ 7. Document   each page appended to natgeo-<year>-<month>.pdf
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use natgeo_fetch::{
//!     parse_range, partition, pool, time_range, ChromiumFactory, FetchConfig,
//!     NonInteractive, PdfSinkFactory,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(FetchConfig::from_toml_path("config.toml")?);
//!     let (start, end) = parse_range("01-2024--06-2024")?;
//!     let shards = partition(&time_range(start, end)?, 3);
//!
//!     let surfaces = Arc::new(ChromiumFactory::new(
//!         config.viewport_width,
//!         config.viewport_height,
//!         config.default_timeout,
//!     ));
//!     let summary = pool::run(
//!         config,
//!         shards,
//!         surfaces,
//!         Arc::new(PdfSinkFactory),
//!         Arc::new(NonInteractive),
//!     )
//!     .await?;
//!     eprintln!("saved {} issues", summary.completed);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature    | Default | Description |
//! |------------|---------|-------------|
//! | `cli`      | on      | Enables the `natgeo-fetch` binary (clap + anyhow + indicatif + tracing-subscriber) |
//! | `chromium` | on      | The chromiumoxide-backed [`surface::RenderSurface`] implementation |
//!
//! Disable both to use only the library against your own browser backend:
//! ```toml
//! natgeo-fetch = { version = "0.3", default-features = false }
//! ```
//!
//! Workers share nothing at runtime: coordination is the persisted
//! session-state file (written once, by the pre-flight sign-in) and the
//! output directory, where filenames derived from (year, month) are
//! disjoint across shards by construction.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod range;
pub mod session;
pub mod surface;

#[cfg(feature = "chromium")]
pub mod chromium;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Credentials, FetchConfig, FetchConfigBuilder, ImageFormat};
pub use document::{DocumentSink, PdfSinkFactory, PdfWriter, SinkFactory};
pub use error::{DocumentError, FetchError, IssueError};
pub use pipeline::assemble::{DocumentPage, SpreadAssembler, SpreadOutcome};
pub use pipeline::capture::{capture, PageCapture};
pub use pipeline::issue::{issue_filename, issue_url, IssueDownloader};
pub use pool::RunSummary;
pub use progress::{FetchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use range::{parse_range, partition, time_range, WorkItem};
pub use session::{NonInteractive, OtpPrompt, SessionManager, SessionState};
pub use surface::{
    CookieRecord, ElementHandle, ElementState, RenderSurface, SurfaceError, SurfaceFactory,
    SurfaceResult, WaitSignal,
};

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumFactory, ChromiumSurface};
