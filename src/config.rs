//! Configuration types for an archive fetch run.
//!
//! All behaviour is controlled through [`FetchConfig`], built via its
//! [`FetchConfigBuilder`] or loaded from a TOML file with
//! [`FetchConfig::from_toml_path`]. Keeping every knob in one struct makes
//! it trivial to hand a read-only copy to each worker and to diff two runs
//! to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest; the TOML loader goes through the
//! same validation.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::FetchError;
use crate::progress::ProgressCallback;

/// Account credentials for the archive.
///
/// The secret is never logged; `Debug` reports only its length.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &format_args!("<{} chars>", self.password.len()))
            .finish()
    }
}

/// Encoding applied when a stitched spread is re-serialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG at the configured quality. (default — matches what the viewer's
    /// canvases hand back, so single pages and spreads stay consistent)
    #[default]
    Jpeg,
    /// Lossless PNG; quality is ignored.
    Png,
}

/// Configuration for a fetch run.
///
/// Built via [`FetchConfig::builder()`] or [`FetchConfig::from_toml_path`].
///
/// # Example
/// ```rust
/// use natgeo_fetch::FetchConfig;
///
/// let config = FetchConfig::builder()
///     .email("reader@example.com")
///     .password("hunter2")
///     .output_dir("downloads")
///     .capture_retries(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct FetchConfig {
    /// Archive account credentials.
    pub credentials: Credentials,

    /// Directory receiving one PDF per issue. Default: `downloads`.
    pub output_dir: PathBuf,

    /// Path of the persisted session-state (cookie) file. Default:
    /// `cookies.json`.
    pub state_path: PathBuf,

    /// Bounded wait applied to every single browser interaction and every
    /// page-readiness wait. Default: 5 s.
    ///
    /// This is deliberately per-operation, not a global deadline: a slow
    /// archive page stalls one step, never the whole run.
    pub default_timeout: Duration,

    /// Capture attempts per canvas before the page is recorded as lost.
    /// Default: 10.
    ///
    /// The viewer renders canvases lazily; right after a spread advance the
    /// canvas often exists but has no pixels yet. Ten attempts at the
    /// default delay rides out the slowest observed renders.
    pub capture_retries: u32,

    /// Fixed delay between capture attempts. Default: 100 ms.
    ///
    /// Kept fixed rather than exponential: capture failures here are local
    /// render latency, not server pushback.
    pub capture_retry_delay: Duration,

    /// Download attempts per issue before it is skipped. Default: 3.
    pub issue_retries: u32,

    /// Browser viewport width in pixels. Default: 2560.
    pub viewport_width: u32,

    /// Browser viewport height in pixels. Default: 1440.
    ///
    /// The viewer sizes its canvases from the viewport, so the viewport is
    /// effectively the output resolution knob.
    pub viewport_height: u32,

    /// Re-encode format for stitched spreads. Default: JPEG.
    pub image_format: ImageFormat,

    /// JPEG quality 1–100 for stitched spreads. Default: 90.
    pub image_quality: u8,

    /// Receives per-issue and per-page progress events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials {
                email: String::new(),
                password: String::new(),
            },
            output_dir: PathBuf::from("downloads"),
            state_path: PathBuf::from("cookies.json"),
            default_timeout: Duration::from_secs(5),
            capture_retries: 10,
            capture_retry_delay: Duration::from_millis(100),
            issue_retries: 3,
            viewport_width: 2560,
            viewport_height: 1440,
            image_format: ImageFormat::Jpeg,
            image_quality: 90,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("credentials", &self.credentials)
            .field("output_dir", &self.output_dir)
            .field("state_path", &self.state_path)
            .field("default_timeout", &self.default_timeout)
            .field("capture_retries", &self.capture_retries)
            .field("capture_retry_delay", &self.capture_retry_delay)
            .field("issue_retries", &self.issue_retries)
            .field("viewport_width", &self.viewport_width)
            .field("viewport_height", &self.viewport_height)
            .field("image_format", &self.image_format)
            .field("image_quality", &self.image_quality)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn FetchProgressCallback>"),
            )
            .finish()
    }
}

impl FetchConfig {
    /// Create a new builder for `FetchConfig`.
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load and validate a config file.
    ///
    /// Sections: `[credentials]`, `[storage]`, `[timeouts]`, `[capture]`,
    /// `[issue]`, `[viewport]`, `[image]`. Every field outside
    /// `[credentials]` has a default.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self, FetchError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| FetchError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|e| FetchError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut builder = Self::builder()
            .email(file.credentials.email)
            .password(file.credentials.password);

        if let Some(storage) = file.storage {
            if let Some(dir) = storage.output_dir {
                builder = builder.output_dir(dir);
            }
            if let Some(state) = storage.state_path {
                builder = builder.state_path(state);
            }
        }
        if let Some(timeouts) = file.timeouts {
            if let Some(ms) = timeouts.default_ms {
                builder = builder.default_timeout(Duration::from_millis(ms));
            }
        }
        if let Some(capture) = file.capture {
            if let Some(n) = capture.retries {
                builder = builder.capture_retries(n);
            }
            if let Some(ms) = capture.retry_delay_ms {
                builder = builder.capture_retry_delay(Duration::from_millis(ms));
            }
        }
        if let Some(issue) = file.issue {
            if let Some(n) = issue.retries {
                builder = builder.issue_retries(n);
            }
        }
        if let Some(viewport) = file.viewport {
            if let Some(w) = viewport.width {
                builder = builder.viewport_width(w);
            }
            if let Some(h) = viewport.height {
                builder = builder.viewport_height(h);
            }
        }
        if let Some(image) = file.image {
            if let Some(format) = image.format {
                builder = builder.image_format(format);
            }
            if let Some(q) = image.quality {
                builder = builder.image_quality(q);
            }
        }

        builder.build()
    }
}

/// Builder for [`FetchConfig`].
#[derive(Debug)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.config.credentials.email = email.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.credentials.password = password.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.state_path = path.into();
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    pub fn capture_retries(mut self, n: u32) -> Self {
        self.config.capture_retries = n.max(1);
        self
    }

    pub fn capture_retry_delay(mut self, delay: Duration) -> Self {
        self.config.capture_retry_delay = delay;
        self
    }

    pub fn issue_retries(mut self, n: u32) -> Self {
        self.config.issue_retries = n.max(1);
        self
    }

    pub fn viewport_width(mut self, px: u32) -> Self {
        self.config.viewport_width = px;
        self
    }

    pub fn viewport_height(mut self, px: u32) -> Self {
        self.config.viewport_height = px;
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    pub fn image_quality(mut self, quality: u8) -> Self {
        self.config.image_quality = quality;
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FetchConfig, FetchError> {
        let c = &self.config;
        if c.credentials.email.is_empty() {
            return Err(FetchError::InvalidConfig("credentials.email is empty".into()));
        }
        if c.credentials.password.is_empty() {
            return Err(FetchError::InvalidConfig(
                "credentials.password is empty".into(),
            ));
        }
        if c.image_quality == 0 || c.image_quality > 100 {
            return Err(FetchError::InvalidConfig(format!(
                "image quality must be 1-100, got {}",
                c.image_quality
            )));
        }
        if c.viewport_width == 0 || c.viewport_height == 0 {
            return Err(FetchError::InvalidConfig("viewport must be non-zero".into()));
        }
        if c.default_timeout.is_zero() {
            return Err(FetchError::InvalidConfig("default timeout must be non-zero".into()));
        }
        Ok(self.config)
    }
}

// ── TOML file mirror ─────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ConfigFile {
    credentials: Credentials,
    storage: Option<StorageSection>,
    timeouts: Option<TimeoutsSection>,
    capture: Option<CaptureSection>,
    issue: Option<IssueSection>,
    viewport: Option<ViewportSection>,
    image: Option<ImageSection>,
}

#[derive(Deserialize)]
struct StorageSection {
    output_dir: Option<PathBuf>,
    state_path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct TimeoutsSection {
    default_ms: Option<u64>,
}

#[derive(Deserialize)]
struct CaptureSection {
    retries: Option<u32>,
    retry_delay_ms: Option<u64>,
}

#[derive(Deserialize)]
struct IssueSection {
    retries: Option<u32>,
}

#[derive(Deserialize)]
struct ViewportSection {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct ImageSection {
    format: Option<ImageFormat>,
    quality: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal() -> FetchConfigBuilder {
        FetchConfig::builder().email("a@b.c").password("secret")
    }

    #[test]
    fn builder_defaults() {
        let config = minimal().build().unwrap();
        assert_eq!(config.capture_retries, 10);
        assert_eq!(config.capture_retry_delay, Duration::from_millis(100));
        assert_eq!(config.issue_retries, 3);
        assert_eq!(config.image_format, ImageFormat::Jpeg);
        assert_eq!(config.image_quality, 90);
    }

    #[test]
    fn build_rejects_missing_credentials() {
        assert!(FetchConfig::builder().password("x").build().is_err());
        assert!(FetchConfig::builder().email("a@b.c").build().is_err());
    }

    #[test]
    fn build_rejects_bad_quality() {
        assert!(minimal().image_quality(0).build().is_err());
        assert!(minimal().image_quality(101).build().is_err());
        assert!(minimal().image_quality(100).build().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let config = minimal().password("topsecret").build().unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("topsecret"), "got: {rendered}");
        assert!(rendered.contains("<9 chars>"));
    }

    #[test]
    fn from_toml_applies_overrides_and_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[credentials]
email = "reader@example.com"
password = "hunter2"

[storage]
output_dir = "/tmp/natgeo"

[capture]
retries = 4
retry_delay_ms = 250

[image]
format = "png"
"#
        )
        .unwrap();

        let config = FetchConfig::from_toml_path(file.path()).unwrap();
        assert_eq!(config.credentials.email, "reader@example.com");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/natgeo"));
        assert_eq!(config.capture_retries, 4);
        assert_eq!(config.capture_retry_delay, Duration::from_millis(250));
        assert_eq!(config.image_format, ImageFormat::Png);
        // Untouched sections keep their defaults.
        assert_eq!(config.state_path, PathBuf::from("cookies.json"));
        assert_eq!(config.issue_retries, 3);
    }

    #[test]
    fn from_toml_missing_file_is_config_read() {
        let err = FetchConfig::from_toml_path("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, FetchError::ConfigRead { .. }));
    }
}
