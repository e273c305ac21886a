//! Pipeline stages for turning a rendered issue into a paged document.
//!
//! Each submodule implements exactly one transformation step. Keeping the
//! stages separate makes each independently testable and lets us swap
//! implementations (e.g. a different browser backend) without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! capture ──▶ assemble ──▶ issue
//! (canvas     (spread       (per-issue state machine,
//!  retries)    stitching)    writes pages to the sink)
//! ```
//!
//! 1. [`capture`]  — extract one canvas as image bytes, retrying a bounded
//!    number of times; exhaustion yields the Absent marker, never an error
//! 2. [`assemble`] — fold a (left, right) capture pair into zero or one
//!    document pages: skip, pass-through single, or stitched spread
//! 3. [`issue`]    — drive one issue end-to-end and append each finished
//!    page to the document sink immediately, wrapped in an issue-level
//!    retry

pub mod assemble;
pub mod capture;
pub mod issue;
