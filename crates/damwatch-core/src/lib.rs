//! Core types and trait definitions for the damwatch pipeline.
//!
//! Records, windows and analysis rows live here, along with the store and
//! staging traits the other crates implement. Nothing in this crate performs
//! I/O.

// Implementations use `async fn`; the traits spell out `Send` futures.
#![allow(async_fn_in_trait)]

pub mod analysis;
pub mod error;
pub mod resource;
pub mod staging;
pub mod store;
pub mod window;

pub use error::{Error, Result};
