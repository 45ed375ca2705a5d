//! Promwatch: Prometheus Health-Check Runner
//!
//! A request-scoped service that runs an allowlisted catalog of
//! monitoring checks against a Prometheus-compatible backend and
//! reduces raw sample matrices into compact, threshold-aware summaries.
//!
//! # Features
//!
//! - **Check Catalog**: predefined, immutable query templates keyed by id
//! - **Environment Resolution**: logical keys (prod, dev, dr, ...) mapped
//!   to backend URLs, with synonym normalization
//! - **Time-Range Resolution**: relative, absolute, and offset windows
//!   with step validation and a sample-volume guard
//! - **Target Filters**: intersect any query with the `up` liveness
//!   series by instance and/or server name
//! - **Summaries**: count/min/max/avg/last per series, plus two-tier
//!   sustained-threshold breach detection for percent checks
//! - **Parallel Fan-Out**: the full catalog through a bounded worker
//!   pool with per-check failure isolation
//! - **Approval Gate**: ad-hoc queries never execute without an explicit
//!   opt-in flag
//!
//! # Example
//!
//! ```
//! use promwatch::catalog::Catalog;
//! use promwatch::promql::{apply_target_filter, render_template};
//!
//! let catalog = Catalog::builtin();
//! let check = catalog.get("cpu_peak_pct").unwrap();
//!
//! // Compose the final query for a 6h window, restricted to one host
//! let query = render_template(check.promql, "6h");
//! let query = apply_target_filter(&query, Some("db01"), None);
//! assert!(query.ends_with("up{server_name=\"db01\"}"));
//! ```

pub mod alerts;
pub mod api;
pub mod catalog;
pub mod client;
pub mod config;
pub mod environment;
pub mod promql;
pub mod runner;
pub mod summarize;
pub mod timerange;

// Re-export commonly used types
pub use catalog::{Catalog, Check, CheckMeta};
pub use config::AppConfig;
pub use runner::{Runner, RunError};
pub use summarize::{Summary, SustainReport, SustainResult};
pub use timerange::{RangeSpec, TimeRange};
