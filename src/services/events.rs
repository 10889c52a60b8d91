//! Event types carried by the bus and the wire shapes of the status
//! surfaces built from them.

use crate::core::timefmt::serde_local;
use crate::site::{DeviceStatus, Heartbeat, MinutelyReport, SiteBlock, SiteFault, SiteMetrics};
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use strum_macros::Display;

/// Everything the collector publishes. History variants only appear in the
/// initial replay a new subscriber receives.
#[derive(Debug, Clone)]
pub enum Event {
    ScanStatus(ScanState),
    SiteUpdate(Arc<StatusSnapshot>),
    SiteMetrics(Arc<SiteMetrics>),
    HiresHistory(Vec<Arc<SiteMetrics>>),
    MinutelyHistory(Vec<Arc<MinutelyReport>>),
    FroniusMinutely(Arc<MinutelyReport>),
    InverterHeartbeat(Heartbeat),
    PushTest(Arc<PushTestResult>),
}

impl Event {
    /// The SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Event::ScanStatus(_) => "scanStatus",
            Event::SiteUpdate(_) => "siteUpdate",
            Event::SiteMetrics(_) => "siteMetrics",
            Event::HiresHistory(_) => "hiresHistory",
            Event::MinutelyHistory(_) => "minutelyHistory",
            Event::FroniusMinutely(_) => "froniusMinutely",
            Event::InverterHeartbeat(_) => "inverterHeartbeat",
            Event::PushTest(_) => "pushTest",
        }
    }

    /// The JSON payload sent on the wire.
    pub fn payload(&self) -> Value {
        let serialized = match self {
            Event::ScanStatus(state) => serde_json::to_value(ScanStatusPayload { state: *state }),
            Event::SiteUpdate(snapshot) => serde_json::to_value(&**snapshot),
            Event::SiteMetrics(metrics) => serde_json::to_value(&**metrics),
            Event::HiresHistory(history) => {
                serde_json::to_value(history.iter().map(|m| &**m).collect::<Vec<_>>())
            }
            Event::MinutelyHistory(history) => {
                serde_json::to_value(history.iter().map(|r| &**r).collect::<Vec<_>>())
            }
            Event::FroniusMinutely(report) => serde_json::to_value(&**report),
            Event::InverterHeartbeat(heartbeat) => serde_json::to_value(heartbeat),
            Event::PushTest(result) => serde_json::to_value(&**result),
        };
        serialized.unwrap_or(Value::Null)
    }
}

/// Scan lifecycle as published on the `scanStatus` topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum ScanState {
    #[strum(serialize = "SCANNING")]
    #[serde(rename = "SCANNING")]
    Scanning,
    #[strum(serialize = "IDLE")]
    #[serde(rename = "IDLE")]
    Idle,
}

#[derive(Debug, Clone, Serialize)]
struct ScanStatusPayload {
    state: ScanState,
}

/// Outcome of the push client's startup self-test.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTestResult {
    pub success: bool,
    /// Classified failure: `dns`, `refused`, `timeout`, `HTTP <code>`, …
    pub error: Option<String>,
    pub message: Option<String>,
    pub display_name: Option<String>,
    #[serde(with = "serde_local")]
    pub timestamp: DateTime<Local>,
}

/// Push client state as exposed on `GET /api/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushStatus {
    pub configured: bool,
    pub enabled: bool,
    pub last_push: Option<String>,
}

/// Full status document: `GET /api/status` and the `siteUpdate` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub device_count: usize,
    pub last_scan: Option<String>,
    pub is_scanning: bool,
    pub devices: Vec<DeviceStatus>,
    pub site: SiteStatus,
    pub push: PushStatus,
}

/// Site-level slice of the status document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStatus {
    pub name: String,
    pub power: SitePower,
    pub energy: SiteEnergy,
    pub has_fault: bool,
    pub faults: Vec<SiteFault>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SitePower {
    pub solar_w: Option<i64>,
    pub battery_w: Option<i64>,
    pub grid_w: Option<i64>,
    pub load_w: Option<i64>,
    pub soc: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEnergy {
    pub solar_wh: Option<f64>,
    pub battery_in_wh: Option<f64>,
    pub battery_out_wh: Option<f64>,
    pub grid_in_wh: Option<f64>,
    pub grid_out_wh: Option<f64>,
    pub load_wh: Option<f64>,
}

impl SiteStatus {
    pub fn new(name: String, site: &SiteBlock) -> Self {
        SiteStatus {
            name,
            power: SitePower {
                solar_w: site.solar.power_w,
                battery_w: site.battery.power_w,
                grid_w: site.grid.power_w,
                load_w: site.load.power_w,
                soc: site.battery.soc,
            },
            energy: SiteEnergy {
                solar_wh: site.solar.energy_wh,
                battery_in_wh: site.battery.in_wh,
                battery_out_wh: site.battery.out_wh,
                grid_in_wh: site.grid.in_wh,
                grid_out_wh: site.grid.out_wh,
                load_wh: site.load.energy_wh,
            },
            has_fault: site.has_fault,
            faults: site.faults.clone(),
        }
    }
}

/// One `GET /api/history` row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySample {
    pub timestamp: String,
    pub solar: Option<i64>,
    pub battery: Option<i64>,
    pub grid: Option<i64>,
    pub load: Option<i64>,
    pub soc: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_status_payload() {
        let event = Event::ScanStatus(ScanState::Scanning);
        assert_eq!(event.name(), "scanStatus");
        assert_eq!(event.payload(), serde_json::json!({"state": "SCANNING"}));
        let event = Event::ScanStatus(ScanState::Idle);
        assert_eq!(event.payload(), serde_json::json!({"state": "IDLE"}));
    }

    #[test]
    fn test_scan_state_display() {
        assert_eq!(ScanState::Scanning.to_string(), "SCANNING");
        assert_eq!(ScanState::Idle.to_string(), "IDLE");
    }

    #[test]
    fn test_heartbeat_payload() {
        use crate::site::{Heartbeat, HeartbeatStatus};
        let event = Event::InverterHeartbeat(Heartbeat {
            serial: "X123".to_string(),
            status: HeartbeatStatus::Online,
            timestamp: Local::now(),
        });
        assert_eq!(event.name(), "inverterHeartbeat");
        let payload = event.payload();
        assert_eq!(payload["serial"], "X123");
        assert_eq!(payload["status"], "online");
        assert!(payload["timestamp"].is_string());
    }
}
