//! HTTP access to the MetricOps API.
//!
//! One async method per endpoint on [`MetricsApi`], implemented over
//! `reqwest` by [`ApiClient`].

pub mod client;
pub mod error;
pub mod query;

pub use client::{ApiClient, MetricsApi};
pub use error::{ApiError, ApiResult};
pub use query::{push_dates, QueryParams, WhyChangedQuery};
