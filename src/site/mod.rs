//! The site: the logical collection of inverters on one premises.
//! Owns the inverter set, the rolling history, and the minutely ledger.

mod aggregate;
mod inverter;
mod metrics;
mod minutely;

pub use aggregate::{EnergyTotals, Site};
pub use inverter::{Fault, Inverter, Sample};
pub use metrics::{
    BatteryBlock, DeviceStatus, EnergyReadout, GridBlock, Heartbeat, HeartbeatStatus,
    QuantityBlock, SiteBlock, SiteFault, SiteMetrics,
};
pub use minutely::{MinutelyReport, SnapshotLedger};
