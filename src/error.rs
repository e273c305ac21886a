//! Error types for the natgeo-fetch library.
//!
//! Three distinct error types reflect three distinct failure scopes:
//!
//! * [`FetchError`] — **Fatal for the invoking scope**: the run (or one
//!   worker) cannot proceed at all — malformed date range, unreadable
//!   config, a browser context that will not launch, or a sign-in flow that
//!   never reached the authenticated archive.
//!
//! * [`IssueError`] — **Scoped to one issue**: something structural went
//!   wrong while downloading a single magazine issue (navigation, viewer
//!   controls, corrupt image data, document write). Consumed by the
//!   issue-level retry wrapper; a single bad issue never aborts the batch.
//!
//! * [`DocumentError`] — failures inside the output document writer,
//!   wrapped into [`IssueError::Document`] by callers.
//!
//! Per-interaction soft failures (a click or fill that timed out) are not
//! errors at this level at all — they are [`crate::surface::SurfaceError`]
//! values that callers branch on explicitly.

use std::path::PathBuf;
use thiserror::Error;

use crate::range::WorkItem;

/// All fatal errors returned by the natgeo-fetch library.
///
/// Issue-level failures use [`IssueError`] and are retried/skipped rather
/// than propagated here.
#[derive(Debug, Error)]
pub enum FetchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The date or date-range string could not be parsed or is out of bounds.
    #[error("Invalid date range '{input}': {reason}\nExpected MM-YYYY--MM-YYYY, e.g. 01-2020--12-2024.")]
    InvalidDateRange { input: String, reason: String },

    /// Builder or config-file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The config file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file was read but is not valid TOML.
    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    // ── Session errors ────────────────────────────────────────────────────
    /// The persisted session-state file exists but could not be read.
    #[error("Failed to read session state '{path}': {source}")]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The session-state file is not a JSON array of cookie records.
    #[error("Session state '{path}' is not a valid cookie file: {source}\nDelete it to force a fresh sign-in.")]
    StateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Writing the session-state file failed.
    #[error("Failed to persist session state to '{path}': {detail}")]
    StatePersist { path: PathBuf, detail: String },

    /// The sign-in flow never reached the authenticated archive.
    #[error(
        "Sign-in did not reach the authenticated archive within {timeout_ms}ms.\n\n\
As a remedy, sign in to https://archive.nationalgeographic.com in a clean\n\
browser session (private mode), export all cookies of that session in JSON\n\
format with a cookie manager (e.g. 'Cookie Quick Manager' for Firefox), place\n\
the file at the configured session-state path, and retry. If that does not\n\
solve it there is a deeper issue — the archive may no longer redirect the way\n\
it used to."
    )]
    Auth { timeout_ms: u64 },

    // ── Environment errors ────────────────────────────────────────────────
    /// The browser backend could not be launched or lost its context.
    #[error("Browser context failure: {0}")]
    Surface(String),

    /// Could not create the output directory.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure scoped to one issue download.
///
/// Consumed by `download_with_retry`: the issue is re-attempted up to the
/// configured bound, then skipped with a warning while the shard continues.
#[derive(Debug, Error)]
pub enum IssueError {
    /// Navigation to the issue's canonical address failed.
    #[error("Issue {item}: navigation to '{url}' failed: {detail}")]
    Navigation {
        item: WorkItem,
        url: String,
        detail: String,
    },

    /// A viewer control (fullscreen, next-spread, readiness wait) failed.
    #[error("Issue {item}: viewer step '{step}' failed: {detail}")]
    Viewer {
        item: WorkItem,
        step: &'static str,
        detail: String,
    },

    /// The total page count could not be read from the rendered viewer.
    #[error("Issue {item}: no '{selector}' elements found — page count unknown")]
    PageCount {
        item: WorkItem,
        selector: &'static str,
    },

    /// A captured image was present but could not be decoded.
    #[error("Canvas {index}: captured image data could not be decoded: {detail}")]
    Image { index: u32, detail: String },

    /// The output document writer failed.
    #[error("Document write failed: {0}")]
    Document(#[from] DocumentError),
}

/// Failures inside a [`crate::document::DocumentSink`] implementation.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Page bytes could not be decoded/transcoded for embedding.
    #[error("Image encode error: {0}")]
    Encode(#[from] image::ImageError),

    /// The sink was driven out of order (e.g. `show_page` with no image).
    #[error("Document writer protocol violation: {0}")]
    Protocol(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_carries_remediation() {
        let e = FetchError::Auth { timeout_ms: 5000 };
        let msg = e.to_string();
        assert!(msg.contains("5000ms"), "got: {msg}");
        assert!(msg.contains("Cookie Quick Manager"));
    }

    #[test]
    fn date_range_error_display() {
        let e = FetchError::InvalidDateRange {
            input: "13-2024--01-2025".into(),
            reason: "month must be 01-12".into(),
        };
        assert!(e.to_string().contains("13-2024--01-2025"));
        assert!(e.to_string().contains("MM-YYYY--MM-YYYY"));
    }

    #[test]
    fn issue_error_names_the_issue() {
        let e = IssueError::PageCount {
            item: WorkItem { year: 1999, month: 0 },
            selector: "div[class='spreaditem-div']",
        };
        let msg = e.to_string();
        assert!(msg.contains("01/1999"), "got: {msg}");
        assert!(msg.contains("spreaditem-div"));
    }
}
