//! LiveOne push integration module.
//! Mirrors each minutely report to a remote ingestion endpoint over HTTP.

mod client;
mod error;

pub use client::{Client, PushConfig, PushOutcome, PushResponse};
pub use error::{ConfigError, Error, Result, classify_failure};
