//! Always-on collector for Fronius Gen24 inverters.
//!
//! The daemon discovers inverters on the local network, polls each of them
//! every two seconds, maintains running energy counters by integrating
//! instantaneous power, fans telemetry out to subscribers, and once per
//! minute composes a compact energy-delta report that can be pushed to a
//! remote ingestion endpoint.

pub mod bus;
pub mod core;
pub mod discovery;
pub mod energy;
pub mod http;
pub mod integration;
pub mod services;
pub mod site;
