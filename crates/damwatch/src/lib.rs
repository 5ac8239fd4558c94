//! The damwatch pipeline: configuration, the filesystem staging sink, and
//! the collect, load and analyze jobs that tie the fetch and store crates
//! together.

pub mod config;
pub mod error;
pub mod jobs;
pub mod staging;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use jobs::{AnalysisSource, Job, JobReport, JobStatus, Pipeline, Verification};
pub use staging::FsBlobStore;
