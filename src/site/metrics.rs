//! Wire shapes for per-poll telemetry: heartbeats, site snapshots, and the
//! per-device status blocks.

use crate::core::timefmt::{format_local, serde_local};
use crate::integration::fronius::{DeviceInfo, MeterInfo, StorageInfo};
use crate::site::inverter::{Fault, Inverter};
use chrono::{DateTime, Local};
use serde::Serialize;

/// Running energy counters of one inverter, watt-hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyReadout {
    pub solar_wh: f64,
    pub battery_in_wh: Option<f64>,
    pub battery_out_wh: Option<f64>,
    pub grid_in_wh: Option<f64>,
    pub grid_out_wh: Option<f64>,
}

/// Per-tick liveness of one inverter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub serial: String,
    pub status: HeartbeatStatus,
    #[serde(with = "serde_local")]
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatStatus {
    Online,
    Offline,
}

/// One aggregated snapshot, produced every poll tick and kept in the
/// ten-minute rolling history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteMetrics {
    #[serde(with = "serde_local")]
    pub timestamp: DateTime<Local>,
    pub inverters: Vec<InverterMetrics>,
    pub site: SiteBlock,
}

/// Per-inverter slice of a snapshot: instantaneous powers plus the running
/// energy counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterMetrics {
    pub serial: String,
    pub solar_w: Option<i64>,
    pub battery_w: Option<i64>,
    pub grid_w: Option<i64>,
    pub load_w: Option<i64>,
    pub soc: Option<f64>,
    pub energy: EnergyReadout,
}

impl InverterMetrics {
    pub fn from_inverter(inverter: &Inverter) -> Self {
        let sample = inverter.last_sample();
        InverterMetrics {
            serial: inverter.serial().to_string(),
            solar_w: sample.and_then(|s| s.solar_w),
            battery_w: sample.and_then(|s| s.battery_w),
            grid_w: sample.and_then(|s| s.grid_w),
            load_w: sample.and_then(|s| s.load_w),
            soc: sample.and_then(|s| s.soc),
            energy: inverter.energy(),
        }
    }
}

/// Site-wide aggregate block.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteBlock {
    pub solar: QuantityBlock,
    pub battery: BatteryBlock,
    pub grid: GridBlock,
    pub load: QuantityBlock,
    pub has_fault: bool,
    pub faults: Vec<SiteFault>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityBlock {
    pub power_w: Option<i64>,
    pub energy_wh: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryBlock {
    pub power_w: Option<i64>,
    pub soc: Option<f64>,
    pub in_wh: Option<f64>,
    pub out_wh: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridBlock {
    pub power_w: Option<i64>,
    pub in_wh: Option<f64>,
    pub out_wh: Option<f64>,
}

/// One faulted inverter in a snapshot, ordered by serial.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteFault {
    pub serial: String,
    pub code: String,
    #[serde(with = "serde_local")]
    pub timestamp: DateTime<Local>,
}

impl SiteFault {
    pub fn new(serial: &str, fault: &Fault) -> Self {
        SiteFault {
            serial: serial.to_string(),
            code: fault.code.clone(),
            timestamp: fault.at,
        }
    }
}

/// Full per-device block served by `GET /api/status` and the `siteUpdate`
/// event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub serial: String,
    pub ip: String,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub name: String,
    pub is_master: bool,
    pub online: bool,
    pub capabilities: DeviceInfo,
    pub battery: Option<StorageInfo>,
    pub meter: Option<MeterInfo>,
    pub last_sample: Option<String>,
    pub solar_w: Option<i64>,
    pub battery_w: Option<i64>,
    pub grid_w: Option<i64>,
    pub load_w: Option<i64>,
    pub soc: Option<f64>,
    pub energy: EnergyReadout,
    pub fault_code: Option<String>,
    pub fault_timestamp: Option<String>,
}

impl DeviceStatus {
    pub fn from_inverter(inverter: &Inverter) -> Self {
        let sample = inverter.last_sample();
        DeviceStatus {
            serial: inverter.serial().to_string(),
            ip: inverter.ip().to_string(),
            mac: inverter.mac().map(str::to_string),
            hostname: inverter.hostname().map(str::to_string),
            name: inverter.name().to_string(),
            is_master: inverter.is_master(),
            online: inverter.is_online(),
            capabilities: inverter.info().clone(),
            battery: inverter.battery().cloned(),
            meter: inverter.meter().cloned(),
            last_sample: sample.map(|s| format_local(&s.at.with_timezone(&Local))),
            solar_w: sample.and_then(|s| s.solar_w),
            battery_w: sample.and_then(|s| s.battery_w),
            grid_w: sample.and_then(|s| s.grid_w),
            load_w: sample.and_then(|s| s.load_w),
            soc: sample.and_then(|s| s.soc),
            energy: inverter.energy(),
            fault_code: inverter.fault().map(|f| f.code.clone()),
            fault_timestamp: inverter.fault().map(|f| format_local(&f.at)),
        }
    }
}
