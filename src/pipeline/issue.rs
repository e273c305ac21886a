//! Per-issue download: the Navigated → … → Saved state machine.
//!
//! One call to [`IssueDownloader::download`] drives a single issue end to
//! end: navigate to its canonical flipbook address, enter fullscreen, read
//! the page count, capture the cover, then walk the spreads two canvases
//! at a time, feeding each pair through the assembler and appending the
//! outcome to the document sink immediately — peak memory is one page, not
//! one issue.
//!
//! Structural failures (navigation, viewer controls, corrupt image data,
//! sink writes) propagate as [`IssueError`]; only the capture loop swallows
//! its failures. [`IssueDownloader::download_with_retry`] re-runs the whole
//! sequence with a fresh sink up to the configured bound and then skips the
//! issue with a warning, so one bad issue never takes down a shard.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::document::{DocumentSink, SinkFactory};
use crate::error::IssueError;
use crate::pipeline::assemble::{DocumentPage, SpreadAssembler, SpreadOutcome};
use crate::pipeline::capture::capture;
use crate::range::WorkItem;
use crate::surface::{RenderSurface, WaitSignal};

/// Lowercase month abbreviations as they appear in issue URLs.
pub const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const FULLSCREEN_BUTTON: &str = "button[id='fullscreen']";
const NEXT_BUTTON: &str = "button[id='nextPage']";
const SPREAD_ITEM: &str = "div[class='spreaditem-div']";

/// Canonical flipbook address for an issue.
pub fn issue_url(item: WorkItem) -> String {
    format!(
        "https://archive.nationalgeographic.com/national-geographic/{}-{}/flipbook/1/",
        item.year,
        MONTH_NAMES[item.month as usize]
    )
}

/// Deterministic output filename for an issue.
pub fn issue_filename(item: WorkItem) -> String {
    format!("natgeo-{}-{:02}.pdf", item.year, item.month + 1)
}

/// Downloads issues against one worker's surface and config.
pub struct IssueDownloader<'a> {
    config: &'a FetchConfig,
}

impl<'a> IssueDownloader<'a> {
    pub fn new(config: &'a FetchConfig) -> Self {
        IssueDownloader { config }
    }

    /// Download one issue into `sink`. Errors propagate; nothing is retried
    /// at this level.
    pub async fn download(
        &self,
        surface: &dyn RenderSurface,
        sink: &mut dyn DocumentSink,
        item: WorkItem,
    ) -> Result<(), IssueError> {
        let timeout = self.config.default_timeout;
        let url = issue_url(item);

        // ── Navigate ─────────────────────────────────────────────────────
        surface.navigate(&url).await.map_err(|e| IssueError::Navigation {
            item,
            url: url.clone(),
            detail: e.to_string(),
        })?;
        surface
            .wait_for(WaitSignal::NetworkIdle, timeout)
            .await
            .map_err(|e| viewer_err(item, "wait network-idle", e))?;
        surface
            .wait_for(WaitSignal::DomContentLoaded, timeout)
            .await
            .map_err(|e| viewer_err(item, "wait dom-ready", e))?;

        // ── Enter fullscreen ─────────────────────────────────────────────
        surface
            .locate(FULLSCREEN_BUTTON)
            .click(timeout)
            .await
            .map_err(|e| viewer_err(item, "fullscreen", e))?;

        // ── Read the page count ──────────────────────────────────────────
        let page_count = surface
            .locate(SPREAD_ITEM)
            .count()
            .await
            .map_err(|e| viewer_err(item, "page-count", e))?;
        if page_count == 0 {
            return Err(IssueError::PageCount {
                item,
                selector: SPREAD_ITEM,
            });
        }
        let page_count = page_count as u32;
        info!("Issue {item}: {page_count} pages");
        if let Some(cb) = &self.config.progress_callback {
            cb.on_issue_start(item, u64::from(page_count));
        }

        let assembler = SpreadAssembler::new(self.config.image_format, self.config.image_quality);

        // ── Cover page (canvas 1, always alone) ──────────────────────────
        let cover = capture(
            surface,
            1,
            self.config.capture_retries,
            self.config.capture_retry_delay,
        )
        .await;
        match assembler.first_page(&cover)? {
            Some(page) => write_page(sink, &page)?,
            None => {
                warn!("Issue {item}: cover page lost");
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_page_missing(item, 1);
                }
            }
        }
        if let Some(cb) = &self.config.progress_callback {
            cb.on_pages_advanced(item, 1);
        }

        // ── Remaining spreads, two canvases at a time ────────────────────
        for canvas_id in (2..=page_count).step_by(2) {
            surface
                .wait_for(WaitSignal::NetworkIdle, timeout)
                .await
                .map_err(|e| viewer_err(item, "wait spread", e))?;
            surface
                .locate(NEXT_BUTTON)
                .click(timeout)
                .await
                .map_err(|e| viewer_err(item, "next-spread", e))?;

            let left = capture(
                surface,
                canvas_id,
                self.config.capture_retries,
                self.config.capture_retry_delay,
            )
            .await;
            // For an odd page count the final right capture simply comes
            // back Absent and the left page is committed alone.
            let right = capture(
                surface,
                canvas_id + 1,
                self.config.capture_retries,
                self.config.capture_retry_delay,
            )
            .await;

            let outcome = assembler.pair(&left, &right)?;
            if let Some(cb) = &self.config.progress_callback {
                match &outcome {
                    SpreadOutcome::Skipped => cb.on_spread_skipped(item, canvas_id),
                    SpreadOutcome::Single(_) => cb.on_page_missing(item, canvas_id + 1),
                    SpreadOutcome::Stitched(_) => {}
                }
            }
            let units = outcome.units();
            if let Some(page) = outcome.into_page() {
                write_page(sink, &page)?;
            }
            if units > 0 {
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_pages_advanced(item, units);
                }
            }
        }

        sink.save()?;
        Ok(())
    }

    /// Download with issue-level retries. A failed attempt's partial output
    /// is discarded (the sink cleans up on drop); when every attempt fails
    /// the issue is skipped and `None` returned — never an error, so the
    /// shard continues.
    pub async fn download_with_retry(
        &self,
        surface: &dyn RenderSurface,
        sinks: &dyn SinkFactory,
        item: WorkItem,
    ) -> Option<PathBuf> {
        let path = self.config.output_dir.join(issue_filename(item));
        let retries = self.config.issue_retries;
        let mut last_error = String::from("no attempt ran");

        for attempt in 1..=retries {
            let mut sink = match sinks.create(&path) {
                Ok(sink) => sink,
                Err(e) => {
                    last_error = e.to_string();
                    warn!("Issue {item}: could not open document sink — {last_error}");
                    continue;
                }
            };

            match self.download(surface, sink.as_mut(), item).await {
                Ok(()) => {
                    info!("Issue {item} saved to {}", path.display());
                    if let Some(cb) = &self.config.progress_callback {
                        cb.on_issue_complete(item, &path);
                    }
                    return Some(path);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("Issue {item}: attempt {attempt}/{retries} failed — {last_error}");
                    if attempt < retries {
                        if let Some(cb) = &self.config.progress_callback {
                            cb.on_issue_retry(item, attempt, &last_error);
                        }
                    }
                }
            }
        }

        warn!("Issue {item} skipped after {retries} attempts: {last_error}");
        if let Some(cb) = &self.config.progress_callback {
            cb.on_issue_failed(item, retries, &last_error);
        }
        None
    }
}

fn viewer_err(item: WorkItem, step: &'static str, e: crate::surface::SurfaceError) -> IssueError {
    IssueError::Viewer {
        item,
        step,
        detail: e.to_string(),
    }
}

fn write_page(sink: &mut dyn DocumentSink, page: &DocumentPage) -> Result<(), IssueError> {
    sink.set_page_size(page.width, page.height)?;
    sink.draw_image(&page.bytes, page.width, page.height)?;
    sink.show_page()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(month1: u32, year: i32) -> WorkItem {
        WorkItem {
            year,
            month: month1 - 1,
        }
    }

    #[test]
    fn url_uses_lowercase_month_abbreviation() {
        assert_eq!(
            issue_url(item(2, 2025)),
            "https://archive.nationalgeographic.com/national-geographic/2025-feb/flipbook/1/"
        );
        assert_eq!(
            issue_url(item(12, 1964)),
            "https://archive.nationalgeographic.com/national-geographic/1964-dec/flipbook/1/"
        );
    }

    #[test]
    fn filename_is_year_then_zero_padded_month() {
        assert_eq!(issue_filename(item(2, 2025)), "natgeo-2025-02.pdf");
        assert_eq!(issue_filename(item(11, 1901)), "natgeo-1901-11.pdf");
    }

    #[test]
    fn filenames_are_unique_across_a_range() {
        let range =
            crate::range::time_range(item(1, 2000), item(12, 2005)).unwrap();
        let mut names: Vec<String> = range.into_iter().map(issue_filename).collect();
        let before = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), before);
    }
}
