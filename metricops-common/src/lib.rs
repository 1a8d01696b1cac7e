//! Shared data model, configuration and formatting for the MetricOps
//! dashboard client.

pub mod config;
pub mod error;
pub mod format;
pub mod types;

pub use config::DashboardConfig;
pub use error::{MetricOpsError, Result};
pub use format::{Grouping, NumberFormat, Signed, Tone, MISSING};
pub use types::*;
