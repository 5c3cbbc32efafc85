//! Metrics for lockbox.
//!
//! Vault code records through the `metrics` crate facade using the names in
//! [`vault`]. Nothing is collected until a binary calls [`init_metrics`]; with
//! the `prometheus` feature the handle renders the Prometheus text format.
//!
//! ```rust,ignore
//! use lockbox_metrics::{counter, vault};
//!
//! counter!(vault::UNLOCK_ATTEMPTS_TOTAL).increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
