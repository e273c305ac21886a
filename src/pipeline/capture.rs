//! Canvas capture with bounded, fixed-delay retries.
//!
//! The viewer renders its canvases lazily: right after navigation or a
//! spread advance, the canvas element exists but may hold no pixels, and
//! the extraction script fails or returns garbage for a few hundred
//! milliseconds. The loop here tolerates that by retrying a bounded number
//! of times with a fixed delay and swallowing every per-attempt failure —
//! a page that never materialises comes back as the Absent marker
//! (`bytes: None`), which the assembler's skip/partial policy consumes.
//! Nothing in this module raises.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::surface::{ElementState, RenderSurface};

/// The viewer's zoom-in control; visible only while the low-resolution
/// display mode is active.
const ZOOM_BUTTON: &str = "button[id='zoomIn']";

/// Short bound for the zoom visibility probe; this is a predicate check,
/// not a wait for the control to appear.
const ZOOM_PROBE: Duration = Duration::from_millis(250);

/// One page's capture result: the 1-based canvas index plus the image
/// bytes, or `None` when every attempt failed.
#[derive(Debug, Clone)]
pub struct PageCapture {
    pub index: u32,
    pub bytes: Option<Vec<u8>>,
}

impl PageCapture {
    pub fn absent(index: u32) -> Self {
        PageCapture { index, bytes: None }
    }

    pub fn is_absent(&self) -> bool {
        self.bytes.is_none()
    }
}

/// Capture the canvas with DOM id `page_id` from the currently loaded page.
///
/// Up to `retries` attempts, separated by `retry_delay`. Each attempt
/// ensures the high-resolution display mode, asks the surface for the
/// base64 canvas payload, and decodes it. Every per-attempt failure is
/// swallowed; exhaustion returns an Absent capture.
///
/// The loop makes no assumption about prior navigation — it operates purely
/// on whatever page the surface currently shows.
pub async fn capture(
    surface: &dyn RenderSurface,
    page_id: u32,
    retries: u32,
    retry_delay: Duration,
) -> PageCapture {
    for attempt in 1..=retries {
        if attempt > 1 {
            sleep(retry_delay).await;
        }

        match try_capture(surface, page_id).await {
            Ok(bytes) => {
                debug!("Canvas {page_id}: {} bytes on attempt {attempt}", bytes.len());
                return PageCapture {
                    index: page_id,
                    bytes: Some(bytes),
                };
            }
            Err(detail) => {
                debug!("Canvas {page_id}: attempt {attempt}/{retries} failed — {detail}");
            }
        }
    }

    warn!("Canvas {page_id}: capture failed after {retries} attempts");
    PageCapture::absent(page_id)
}

/// One capture attempt. Any failure is reported as a string and swallowed
/// by the caller.
async fn try_capture(surface: &dyn RenderSurface, page_id: u32) -> Result<Vec<u8>, String> {
    ensure_zoomed(surface).await;

    let payload = surface
        .capture_canvas(page_id)
        .await
        .map_err(|e| e.to_string())?;
    STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("base64 decode: {e}"))
}

/// Idempotently switch the viewer into its zoomed (high-resolution) mode.
///
/// The zoom-in control is only visible while the viewer is un-zoomed, so
/// its visibility is the predicate: visible means click it, not visible
/// means the viewer is already zoomed and the toggle must not be pressed
/// again.
async fn ensure_zoomed(surface: &dyn RenderSurface) {
    let zoom = surface.locate(ZOOM_BUTTON);
    if zoom.wait_for(ElementState::Visible, ZOOM_PROBE).await.is_ok() {
        if let Err(e) = zoom.click(ZOOM_PROBE).await {
            debug!("Zoom toggle click failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::surface::{
        CookieRecord, ElementHandle, SurfaceError, SurfaceResult, WaitSignal,
    };

    /// A surface whose canvases never render and whose zoom button is
    /// already gone (viewer zoomed).
    struct DeadCanvasSurface {
        attempts: Arc<AtomicU32>,
    }

    struct NoElement;

    #[async_trait]
    impl ElementHandle for NoElement {
        async fn click(&self, timeout: Duration) -> SurfaceResult<()> {
            Err(SurfaceError::timeout("click", timeout))
        }
        async fn fill(&self, _text: &str, timeout: Duration) -> SurfaceResult<()> {
            Err(SurfaceError::timeout("fill", timeout))
        }
        async fn count(&self) -> SurfaceResult<usize> {
            Ok(0)
        }
        async fn wait_for(&self, _state: ElementState, timeout: Duration) -> SurfaceResult<()> {
            Err(SurfaceError::timeout("wait_for", timeout))
        }
    }

    #[async_trait]
    impl RenderSurface for DeadCanvasSurface {
        async fn navigate(&self, _url: &str) -> SurfaceResult<()> {
            Ok(())
        }
        async fn wait_for(&self, _signal: WaitSignal, _timeout: Duration) -> SurfaceResult<()> {
            Ok(())
        }
        fn locate<'a>(&'a self, _selector: &str) -> Box<dyn ElementHandle + 'a> {
            Box::new(NoElement)
        }
        async fn capture_canvas(&self, _canvas_id: u32) -> SurfaceResult<String> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SurfaceError::script("canvas has no pixels yet"))
        }
        async fn cookies(&self) -> SurfaceResult<Vec<CookieRecord>> {
            Ok(Vec::new())
        }
        async fn set_cookies(&self, _cookies: &[CookieRecord]) -> SurfaceResult<()> {
            Ok(())
        }
        async fn current_url(&self) -> SurfaceResult<String> {
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_absent_after_exactly_n_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let surface = DeadCanvasSurface {
            attempts: Arc::clone(&attempts),
        };

        let started = tokio::time::Instant::now();
        let result = capture(&surface, 7, 5, Duration::from_millis(100)).await;

        assert!(result.is_absent());
        assert_eq!(result.index, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        // Four inter-attempt gaps of the fixed delay (paused clock makes
        // this exact).
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn success_decodes_the_base64_payload() {
        struct OneShotSurface;

        #[async_trait]
        impl RenderSurface for OneShotSurface {
            async fn navigate(&self, _url: &str) -> SurfaceResult<()> {
                Ok(())
            }
            async fn wait_for(&self, _signal: WaitSignal, _t: Duration) -> SurfaceResult<()> {
                Ok(())
            }
            fn locate<'a>(&'a self, _selector: &str) -> Box<dyn ElementHandle + 'a> {
                Box::new(NoElement)
            }
            async fn capture_canvas(&self, _canvas_id: u32) -> SurfaceResult<String> {
                Ok(STANDARD.encode(b"jpeg-ish bytes"))
            }
            async fn cookies(&self) -> SurfaceResult<Vec<CookieRecord>> {
                Ok(Vec::new())
            }
            async fn set_cookies(&self, _cookies: &[CookieRecord]) -> SurfaceResult<()> {
                Ok(())
            }
            async fn current_url(&self) -> SurfaceResult<String> {
                Ok(String::new())
            }
        }

        let result = capture(&OneShotSurface, 1, 3, Duration::from_millis(100)).await;
        assert_eq!(result.bytes.as_deref(), Some(&b"jpeg-ish bytes"[..]));
    }
}
