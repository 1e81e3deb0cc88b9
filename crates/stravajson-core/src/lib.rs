//! Core types: activities, datasets, time windows, summaries
//!
//! Everything in this crate is free of network access so it can be tested
//! in isolation.

pub mod activity;
pub mod dataset;
pub mod summary;
pub mod time;
pub mod tracing;

pub use activity::{Activity, ActivityId, RUN_TYPE};
pub use dataset::{Dataset, merge_dedupe};
pub use summary::{Summary, format_pace};
pub use time::{TimeError, TimeResult, TimeWindow, WindowBound, WindowRequest};
pub use tracing::{TracingConfig, TracingError, init_tracing};
