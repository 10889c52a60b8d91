//! Fronius Solar API integration module.
//! Talks to the HTTP JSON API every Gen24 inverter exposes on port 80.

mod client;
mod error;
mod schemas;

pub use client::Client;
pub use error::{Error, ErrorClass, Result};
pub use schemas::{DeviceInfo, MeterInfo, MeterLocation, PowerFlow, StorageInfo};
