//! Chromium-backed [`RenderSurface`] implementation (feature `chromium`).
//!
//! Thin glue over [chromiumoxide]'s Chrome DevTools Protocol client. The
//! core never sees this module: it is constructed by the CLI (or any host
//! application) through [`ChromiumFactory`] and handed in as a
//! `Box<dyn RenderSurface>`.
//!
//! Implementation notes:
//!
//! * Every interaction is wrapped in `tokio::time::timeout`, mapping
//!   expiry to [`SurfaceError::Timeout`] — CDP itself has no per-call
//!   deadline.
//! * Element waits are bounded polls: CDP resolves selectors at call time,
//!   so "wait for visible" is a short query loop, not an event
//!   subscription.
//! * `capture_canvas` evaluates the one parameterised script the core
//!   relies on: composite an opaque white background behind the canvas
//!   (`destination-over`), serialise with `toDataURL("image/jpeg")`, and
//!   return the base64 payload after the comma.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::surface::{
    CookieRecord, ElementHandle, ElementState, RenderSurface, SurfaceError, SurfaceResult,
    SurfaceFactory, WaitSignal,
};

/// Poll interval for bounded element/state waits.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settle time added after the load state reaches `complete` when waiting
/// for network idle; CDP exposes no direct idle signal.
const NETWORK_SETTLE: Duration = Duration::from_millis(500);

/// Creates one headless Chromium browser per worker.
pub struct ChromiumFactory {
    viewport: (u32, u32),
    timeout: Duration,
}

impl ChromiumFactory {
    pub fn new(viewport_width: u32, viewport_height: u32, default_timeout: Duration) -> Self {
        ChromiumFactory {
            viewport: (viewport_width, viewport_height),
            timeout: default_timeout,
        }
    }
}

#[async_trait]
impl SurfaceFactory for ChromiumFactory {
    async fn create(&self) -> Result<Box<dyn RenderSurface>, FetchError> {
        let surface = ChromiumSurface::launch(self.viewport, self.timeout).await?;
        Ok(Box::new(surface))
    }
}

/// One headless browser page implementing the surface contract.
pub struct ChromiumSurface {
    page: Page,
    timeout: Duration,
    // Owns the browser process and its event pump for the page's lifetime.
    _browser: Browser,
    _handler: tokio::task::JoinHandle<()>,
}

impl ChromiumSurface {
    /// Launch a fresh headless browser with its own profile and one page.
    pub async fn launch(
        viewport: (u32, u32),
        default_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let config = BrowserConfig::builder()
            .window_size(viewport.0, viewport.1)
            .build()
            .map_err(FetchError::Surface)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Surface(e.to_string()))?;

        // The handler stream must be pumped for the CDP connection to make
        // progress; it ends when the browser goes away.
        let pump = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Surface(e.to_string()))?;

        debug!("Launched headless browser, viewport {}x{}", viewport.0, viewport.1);
        Ok(ChromiumSurface {
            page,
            timeout: default_timeout,
            _browser: browser,
            _handler: pump,
        })
    }

    /// Evaluate a script and deserialise its completion value.
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> SurfaceResult<T> {
        let result = timeout(self.timeout, self.page.evaluate(script))
            .await
            .map_err(|_| SurfaceError::timeout("evaluate", self.timeout))?
            .map_err(|e| SurfaceError::script(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| SurfaceError::script(e.to_string()))
    }

    /// Bounded poll until `predicate_js` evaluates to true.
    async fn poll_until(
        &self,
        op: &str,
        predicate_js: &str,
        wait: Duration,
    ) -> SurfaceResult<()> {
        let deadline = Instant::now() + wait;
        loop {
            match self.eval::<bool>(predicate_js).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!("'{op}' probe failed: {e}"),
            }
            if Instant::now() >= deadline {
                return Err(SurfaceError::timeout(op, wait));
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

fn visible_js(selector: &str) -> String {
    format!(
        "(() => {{ const e = document.querySelector({selector:?}); \
if (!e) return false; const r = e.getBoundingClientRect(); \
return r.width > 0 && r.height > 0; }})()"
    )
}

fn attached_js(selector: &str) -> String {
    format!("document.querySelector({selector:?}) !== null")
}

#[async_trait]
impl RenderSurface for ChromiumSurface {
    async fn navigate(&self, url: &str) -> SurfaceResult<()> {
        timeout(self.timeout, self.page.goto(url))
            .await
            .map_err(|_| SurfaceError::timeout(format!("navigate {url}"), self.timeout))?
            .map_err(|e| SurfaceError::backend(e.to_string()))?;
        Ok(())
    }

    async fn wait_for(&self, signal: WaitSignal, wait: Duration) -> SurfaceResult<()> {
        match signal {
            WaitSignal::DomContentLoaded => {
                self.poll_until(
                    "dom-content-loaded",
                    "document.readyState !== 'loading'",
                    wait,
                )
                .await
            }
            WaitSignal::NetworkIdle => {
                self.poll_until("network-idle", "document.readyState === 'complete'", wait)
                    .await?;
                sleep(NETWORK_SETTLE).await;
                Ok(())
            }
            WaitSignal::UrlPrefix(prefix) => {
                let deadline = Instant::now() + wait;
                loop {
                    if let Ok(url) = self.current_url().await {
                        if url.starts_with(&prefix) {
                            return Ok(());
                        }
                    }
                    if Instant::now() >= deadline {
                        return Err(SurfaceError::timeout(format!("url-prefix {prefix}"), wait));
                    }
                    sleep(POLL_INTERVAL).await;
                }
            }
        }
    }

    fn locate<'a>(&'a self, selector: &str) -> Box<dyn ElementHandle + 'a> {
        Box::new(ChromiumLocator {
            surface: self,
            selector: selector.to_string(),
        })
    }

    async fn capture_canvas(&self, canvas_id: u32) -> SurfaceResult<String> {
        let script = format!(
            r#"(function() {{
                let canvas = document.getElementById("{canvas_id}");
                const ctx = canvas.getContext("2d");
                ctx.globalCompositeOperation = "destination-over";
                ctx.fillStyle = "white";
                ctx.fillRect(0, 0, canvas.width, canvas.height);
                return canvas.toDataURL("image/jpeg", 0.90).split(',')[1];
            }})()"#
        );
        self.eval::<String>(&script).await
    }

    async fn cookies(&self) -> SurfaceResult<Vec<CookieRecord>> {
        let cookies = timeout(self.timeout, self.page.get_cookies())
            .await
            .map_err(|_| SurfaceError::timeout("get cookies", self.timeout))?
            .map_err(|e| SurfaceError::backend(e.to_string()))?;

        // The CDP cookie type serialises with camelCase field names that
        // CookieRecord already accepts; round-trip through serde_json
        // instead of mapping fields by hand.
        let value =
            serde_json::to_value(&cookies).map_err(|e| SurfaceError::script(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| SurfaceError::script(e.to_string()))
    }

    async fn set_cookies(&self, cookies: &[CookieRecord]) -> SurfaceResult<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone());
            if let Some(domain) = &cookie.domain {
                builder = builder.domain(domain.clone());
            }
            if let Some(path) = &cookie.path {
                builder = builder.path(path.clone());
            }
            if let Some(expiry) = cookie.expiry {
                builder = builder.expires(TimeSinceEpoch::new(expiry));
            }
            if let Some(secure) = cookie.secure {
                builder = builder.secure(secure);
            }
            if let Some(http_only) = cookie.http_only {
                builder = builder.http_only(http_only);
            }
            match builder.build() {
                Ok(param) => params.push(param),
                Err(e) => warn!("Skipping malformed cookie '{}': {e}", cookie.name),
            }
        }

        timeout(self.timeout, self.page.set_cookies(params))
            .await
            .map_err(|_| SurfaceError::timeout("set cookies", self.timeout))?
            .map_err(|e| SurfaceError::backend(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&self) -> SurfaceResult<String> {
        let url = timeout(self.timeout, self.page.url())
            .await
            .map_err(|_| SurfaceError::timeout("current url", self.timeout))?
            .map_err(|e| SurfaceError::backend(e.to_string()))?;
        url.ok_or_else(|| SurfaceError::backend("page has no URL"))
    }
}

/// Lazy locator resolving its selector at interaction time.
struct ChromiumLocator<'a> {
    surface: &'a ChromiumSurface,
    selector: String,
}

impl ChromiumLocator<'_> {
    /// Resolve the selector to an element, polling until the deadline.
    async fn resolve(&self, wait: Duration) -> SurfaceResult<chromiumoxide::element::Element> {
        let deadline = Instant::now() + wait;
        loop {
            if let Ok(element) = self.surface.page.find_element(self.selector.as_str()).await {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(SurfaceError::NotFound {
                    selector: self.selector.clone(),
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl ElementHandle for ChromiumLocator<'_> {
    async fn click(&self, wait: Duration) -> SurfaceResult<()> {
        let op = format!("click {}", self.selector);
        let element = timeout(wait, self.resolve(wait))
            .await
            .map_err(|_| SurfaceError::timeout(op.as_str(), wait))??;
        timeout(wait, element.click())
            .await
            .map_err(|_| SurfaceError::timeout(op.as_str(), wait))?
            .map_err(|e| SurfaceError::backend(e.to_string()))?;
        Ok(())
    }

    async fn fill(&self, text: &str, wait: Duration) -> SurfaceResult<()> {
        let op = format!("fill {}", self.selector);
        let element = timeout(wait, self.resolve(wait))
            .await
            .map_err(|_| SurfaceError::timeout(op.as_str(), wait))??;
        timeout(wait, async {
            element.click().await?;
            element.type_str(text).await
        })
        .await
        .map_err(|_| SurfaceError::timeout(op.as_str(), wait))?
        .map_err(|e| SurfaceError::backend(e.to_string()))?;
        Ok(())
    }

    async fn count(&self) -> SurfaceResult<usize> {
        match self.surface.page.find_elements(self.selector.as_str()).await {
            Ok(elements) => Ok(elements.len()),
            // "No nodes" is a count of zero, not a failure.
            Err(_) => Ok(0),
        }
    }

    async fn wait_for(&self, state: ElementState, wait: Duration) -> SurfaceResult<()> {
        let predicate = match state {
            ElementState::Attached => attached_js(&self.selector),
            ElementState::Visible => visible_js(&self.selector),
        };
        self.surface
            .poll_until(&format!("wait_for {}", self.selector), &predicate, wait)
            .await
    }
}
