//! Upstream side of the pipeline: the WaterInsights HTTP client, the
//! per-dam [`Fetcher`] with its bounded retry policy, and the [`Collector`]
//! that turns a dam registry into one [`Batch`](damwatch_core::resource::Batch).

pub mod auth;
pub mod client;
pub mod collector;
pub mod error;
pub mod fetcher;
pub mod retry;

pub use client::{ApiConfig, ResourceApi, UpstreamResponse, WaterInsightsClient};
pub use collector::{CollectReport, Collection, Collector, FailedDam};
pub use error::{Error, Result};
pub use fetcher::{FetchOutcome, Fetcher};
pub use retry::RetryPolicy;
