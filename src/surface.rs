//! The browser collaborator contract.
//!
//! The download core never talks to a browser library directly: every
//! navigation, wait, click, fill and script evaluation goes through
//! [`RenderSurface`], and element interactions go through the lazy
//! [`ElementHandle`] locators it hands out. The chromiumoxide adapter in
//! [`crate::chromium`] is the default implementation; tests drive the core
//! with scripted in-memory surfaces.
//!
//! Interaction failures are values, not exceptions: a click that timed out
//! comes back as [`SurfaceError::Timeout`] and callers branch on it
//! explicitly (the sign-in flow treats it as a soft `false`, the capture
//! loop swallows it, the issue downloader escalates it). Nothing in this
//! module panics or retries on its own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::FetchError;

/// Result alias for surface interactions.
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Why a single surface interaction did not produce a value.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// The interaction did not complete within its bounded wait.
    #[error("'{op}' timed out after {ms}ms")]
    Timeout { op: String, ms: u64 },

    /// No element matched the selector.
    #[error("no element matches '{selector}'")]
    NotFound { selector: String },

    /// Script evaluation failed or returned an unusable value.
    #[error("script evaluation failed: {detail}")]
    Script { detail: String },

    /// The underlying browser backend reported an error.
    #[error("backend error: {detail}")]
    Backend { detail: String },
}

impl SurfaceError {
    pub fn timeout(op: impl Into<String>, timeout: Duration) -> Self {
        SurfaceError::Timeout {
            op: op.into(),
            ms: timeout.as_millis() as u64,
        }
    }

    pub fn script(detail: impl Into<String>) -> Self {
        SurfaceError::Script {
            detail: detail.into(),
        }
    }

    pub fn backend(detail: impl Into<String>) -> Self {
        SurfaceError::Backend {
            detail: detail.into(),
        }
    }
}

/// A page-level readiness signal to wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitSignal {
    /// The DOM finished parsing (`document.readyState` past `loading`).
    DomContentLoaded,
    /// The page finished loading and the network went quiet.
    NetworkIdle,
    /// The current URL starts with the given prefix.
    UrlPrefix(String),
}

/// An element state a locator can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Present in the DOM.
    Attached,
    /// Present and occupying layout space.
    Visible,
}

/// A lazy locator for one selector on a [`RenderSurface`].
///
/// Locators resolve at interaction time, not at creation time, so a locator
/// for an element that has not rendered yet is fine — the interaction itself
/// waits (bounded) and reports `Timeout` on failure.
#[async_trait]
pub trait ElementHandle: Send + Sync {
    /// Click the first matching element within `timeout`.
    async fn click(&self, timeout: Duration) -> SurfaceResult<()>;

    /// Fill the first matching input with `text` within `timeout`.
    async fn fill(&self, text: &str, timeout: Duration) -> SurfaceResult<()>;

    /// Number of elements currently matching the selector.
    async fn count(&self) -> SurfaceResult<usize>;

    /// Wait until the first matching element reaches `state`.
    async fn wait_for(&self, state: ElementState, timeout: Duration) -> SurfaceResult<()>;
}

/// A controllable browser page: the narrow contract the core consumes.
///
/// Implementations must be `Send + Sync`; one surface is owned by exactly
/// one worker and never shared, but the worker itself runs on a tokio task.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Navigate to `url` and wait for the navigation to commit.
    async fn navigate(&self, url: &str) -> SurfaceResult<()>;

    /// Wait for a page-level readiness signal.
    async fn wait_for(&self, signal: WaitSignal, timeout: Duration) -> SurfaceResult<()>;

    /// Build a lazy locator for `selector`.
    fn locate<'a>(&'a self, selector: &str) -> Box<dyn ElementHandle + 'a>;

    /// Extract the rendered canvas with DOM id `canvas_id` as a base64
    /// image payload.
    ///
    /// This is the one parameterised script-evaluation capability the core
    /// relies on; the implementation composites an opaque white background
    /// behind the canvas before serialising, so transparent regions never
    /// leak into the output.
    async fn capture_canvas(&self, canvas_id: u32) -> SurfaceResult<String>;

    /// Snapshot the browsing context's cookies.
    async fn cookies(&self) -> SurfaceResult<Vec<CookieRecord>>;

    /// Install cookies into the browsing context.
    async fn set_cookies(&self, cookies: &[CookieRecord]) -> SurfaceResult<()>;

    /// The page's current URL.
    async fn current_url(&self) -> SurfaceResult<String>;
}

/// Creates one independent [`RenderSurface`] per worker.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn RenderSurface>, FetchError>;
}

/// One persisted cookie.
///
/// The serialized form is what lands in the session-state file (a JSON
/// array of these). Field aliases accept the shapes produced by common
/// cookie-export extensions so a manually exported file loads unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Expiry as seconds since the epoch; absent for session cookies.
    #[serde(
        rename = "expiry",
        alias = "expires",
        alias = "expirationDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(
        rename = "httpOnly",
        alias = "http_only",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub http_only: Option<bool>,
    #[serde(
        rename = "sameSite",
        alias = "same_site",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub same_site: Option<String>,
}

impl CookieRecord {
    /// A minimal cookie with just a name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        CookieRecord {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expiry: None,
            secure: None,
            http_only: None,
            same_site: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_round_trips_through_json() {
        let mut cookie = CookieRecord::new("sid", "abc123");
        cookie.domain = Some(".nationalgeographic.com".into());
        cookie.path = Some("/".into());
        cookie.expiry = Some(1893456000.0);
        cookie.http_only = Some(true);

        let json = serde_json::to_string(&cookie).unwrap();
        let back: CookieRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cookie);
        assert!(json.contains("\"expiry\""));
        assert!(json.contains("\"httpOnly\""));
    }

    #[test]
    fn cookie_accepts_exported_field_names() {
        // Shape produced by browser cookie-export extensions.
        let json = r#"{
            "name": "sid",
            "value": "abc",
            "domain": "archive.nationalgeographic.com",
            "path": "/",
            "expirationDate": 1893456000.5,
            "secure": true,
            "http_only": false
        }"#;
        let cookie: CookieRecord = serde_json::from_str(json).unwrap();
        assert_eq!(cookie.expiry, Some(1893456000.5));
        assert_eq!(cookie.http_only, Some(false));
    }

    #[test]
    fn surface_error_display() {
        let e = SurfaceError::timeout("click a.loginGraybutton", Duration::from_millis(1500));
        assert_eq!(e.to_string(), "'click a.loginGraybutton' timed out after 1500ms");
    }
}
