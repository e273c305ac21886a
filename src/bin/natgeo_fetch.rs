//! CLI binary for natgeo-fetch.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `FetchConfig`, wires the chromium backend and the PDF sink into the
//! worker pool, and renders progress bars.

use anyhow::{Context, Result};
use chrono::Datelike;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use natgeo_fetch::{
    parse_range, partition, pool, time_range, ChromiumFactory, FetchConfig,
    FetchProgressCallback, OtpPrompt, PdfSinkFactory, ProgressCallback, WorkItem,
};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar per in-flight issue under a `MultiProgress`,
/// keyed by (year, month) since workers download different issues
/// concurrently.
struct CliProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<(i32, u32), ProgressBar>>,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        Arc::new(CliProgress {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        })
    }

    fn bar(&self, item: WorkItem) -> Option<ProgressBar> {
        self.bars.lock().unwrap().get(&(item.year, item.month)).cloned()
    }
}

impl FetchProgressCallback for CliProgress {
    fn on_issue_start(&self, item: WorkItem, total_pages: u64) {
        let style = ProgressStyle::with_template(
            "{prefix:.bold}  [{bar:40.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        let bar = self.multi.add(ProgressBar::new(total_pages));
        bar.set_style(style);
        bar.set_prefix(format!("Issue {item}"));
        self.bars.lock().unwrap().insert((item.year, item.month), bar);
    }

    fn on_pages_advanced(&self, item: WorkItem, units: u64) {
        if let Some(bar) = self.bar(item) {
            bar.inc(units);
        }
    }

    fn on_spread_skipped(&self, item: WorkItem, canvas_index: u32) {
        if let Some(bar) = self.bar(item) {
            bar.println(format!(
                "  {} Issue {item}: spread at page {canvas_index} lost",
                red("✗")
            ));
        }
    }

    fn on_page_missing(&self, item: WorkItem, canvas_index: u32) {
        if let Some(bar) = self.bar(item) {
            bar.println(format!(
                "  {} Issue {item}: page {canvas_index} missing",
                red("✗")
            ));
        }
    }

    fn on_issue_complete(&self, item: WorkItem, path: &Path) {
        if let Some(bar) = self.bars.lock().unwrap().remove(&(item.year, item.month)) {
            bar.finish_and_clear();
        }
        let _ = self.multi.println(format!(
            "{} Issue {item}  →  {}",
            green("✔"),
            bold(&path.display().to_string())
        ));
    }

    fn on_issue_retry(&self, item: WorkItem, attempt: u32, error: &str) {
        if let Some(bar) = self.bars.lock().unwrap().remove(&(item.year, item.month)) {
            bar.finish_and_clear();
        }
        let _ = self.multi.println(format!(
            "  {} Issue {item}: attempt {attempt} failed, retrying  {}",
            red("↻"),
            dim(error)
        ));
    }

    fn on_issue_failed(&self, item: WorkItem, attempts: u32, error: &str) {
        if let Some(bar) = self.bars.lock().unwrap().remove(&(item.year, item.month)) {
            bar.abandon();
        }
        let _ = self.multi.println(format!(
            "{} Issue {item} skipped after {attempts} attempts  {}",
            red("✘"),
            dim(error)
        ));
    }
}

// ── Operator prompt for the one-time code ────────────────────────────────────

/// Reads the 6-digit sign-in code from the terminal during the pre-flight
/// sign-in. Workers never prompt; they replay the persisted session.
struct StdinOtpPrompt;

impl OtpPrompt for StdinOtpPrompt {
    fn read_code(&self) -> Option<String> {
        eprint!("Please provide 6-digit OTP: ");
        io::stderr().flush().ok();
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;
        let code = line.trim().to_string();
        if code.is_empty() {
            None
        } else {
            Some(code)
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Download the latest issue (current month)
  natgeo-fetch

  # A single past issue
  natgeo-fetch --date-range 07-1976--07-1976

  # Five years, four parallel browsers
  natgeo-fetch --date-range 01-2020--12-2024 --n-workers 4

  # Alternate config location
  natgeo-fetch --config ~/.config/natgeo-fetch/config.toml

CONFIG FILE (TOML):
  [credentials]
  email = "reader@example.com"
  password = "..."

  [storage]
  output_dir = "downloads"        # one natgeo-<year>-<month>.pdf per issue
  state_path = "cookies.json"     # persisted sign-in session

  [timeouts]
  default_ms = 5000               # per browser interaction

  [capture]
  retries = 10                    # attempts per page canvas
  retry_delay_ms = 100

  [issue]
  retries = 3                     # attempts per issue before skipping it

  [viewport]
  width = 2560                    # canvases render at viewport resolution
  height = 1440

  [image]
  format = "jpeg"                 # or "png" (stitched spreads only)
  quality = 90

SIGN-IN:
  The first run signs in interactively (e-mail, password, 6-digit code) and
  persists the session to the configured state file; later runs and all
  parallel workers replay it. If sign-in keeps failing, export the cookies
  of a signed-in browser session as JSON to the state path and retry.

ENVIRONMENT VARIABLES:
  NATGEO_DATE_RANGE   Override --date-range
  NATGEO_CONFIG       Override --config
  NATGEO_WORKERS      Override --n-workers
"#;

/// Download National Geographic issues from the archive.
#[derive(Parser, Debug)]
#[command(
    name = "natgeo-fetch",
    version,
    about = "Download National Geographic archive issues as per-issue PDFs",
    long_about = "Download National Geographic issues from the archive's flipbook viewer. \
Mostly configured through a TOML file; requires an archive account and a local \
Chromium/Chrome installation.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Inclusive date range in MM-YYYY--MM-YYYY format
    /// (e.g. 01-2020--12-2024, or 01-2025--01-2025 for a single issue).
    /// Default: the latest issue (current month).
    #[arg(long, env = "NATGEO_DATE_RANGE")]
    date_range: Option<String>,

    /// Config file containing account info and output location.
    #[arg(short, long, env = "NATGEO_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Number of parallel workers (one headless browser each).
    #[arg(long, env = "NATGEO_WORKERS", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..))]
    n_workers: u16,

    /// Disable progress bars.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Progress bars carry the per-issue feedback; library INFO logs would
    // fight them for the terminal, so they are filtered down while bars
    // are active.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    // ── Config & date range ──────────────────────────────────────────────
    let mut config = FetchConfig::from_toml_path(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn FetchProgressCallback>)
    } else {
        None
    };
    config.progress_callback = progress;

    let (start, end) = match &cli.date_range {
        Some(range) => parse_range(range)?,
        None => {
            let latest = latest_issue();
            (latest, latest)
        }
    };
    let items = time_range(start, end)?;
    let shards = partition(&items, usize::from(cli.n_workers));

    if !cli.quiet {
        eprintln!(
            "Fetching {} issue(s) from {start} to {end} with {} worker(s)",
            items.len(),
            cli.n_workers
        );
    }

    // ── Run the pool ─────────────────────────────────────────────────────
    let surfaces = Arc::new(ChromiumFactory::new(
        config.viewport_width,
        config.viewport_height,
        config.default_timeout,
    ));
    let output_dir = config.output_dir.clone();
    let summary = pool::run(
        Arc::new(config),
        shards,
        surfaces,
        Arc::new(PdfSinkFactory),
        Arc::new(StdinOtpPrompt),
    )
    .await
    .context("Fetch run failed")?;

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        eprintln!(
            "{}  {}/{} issues saved  →  {}",
            if summary.is_clean() { green("✔") } else { red("⚠") },
            summary.completed,
            items.len(),
            bold(&output_dir.display().to_string()),
        );
        for item in &summary.skipped {
            eprintln!("   {} issue {item} skipped", red("✗"));
        }
        for (worker, error) in &summary.worker_failures {
            eprintln!("   {} worker {worker} failed: {error}", red("✗"));
        }
    }

    if summary.completed == 0 && !items.is_empty() {
        anyhow::bail!("No issues could be downloaded");
    }
    Ok(())
}

/// The archive's newest issue: the current month.
fn latest_issue() -> WorkItem {
    let today = chrono::Local::now().date_naive();
    WorkItem {
        year: today.year(),
        month: today.month0(),
    }
}
