//! Per-host probe: confirm a candidate speaks the Solar API, then resolve
//! its identity, role, and capability records.

use super::arp::ArpEntry;
use crate::integration::fronius::{self, DeviceInfo, MeterInfo, StorageInfo};
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

/// One reachable Fronius device, as handed to `Site::adopt_discovered`.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredDevice {
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    /// Factory serial; the stable key of the device.
    pub serial: String,
    /// True when the power-flow response carries a non-null `P_Load`:
    /// load monitoring is definitionally the master.
    pub is_master: bool,
    pub info: DeviceInfo,
    pub battery: Option<StorageInfo>,
    pub meter: Option<MeterInfo>,
}

/// Retry strategy for the idempotent capability probes. The polling path
/// never retries; discovery can afford two quick attempts.
fn probe_retry() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(100).map(jitter).take(2)
}

/// Probes one ARP candidate. `None` when the host is not a Fronius device
/// or went away mid-probe.
pub async fn probe_host(http: &reqwest::Client, entry: &ArpEntry) -> Option<DiscoveredDevice> {
    let client = fronius::Client::for_device(http.clone(), entry.ip);
    match client.probe_api_version().await {
        Ok(true) => {}
        Ok(false) => return None,
        Err(error) => {
            log::debug!("Host {}: no Solar API ({error})", entry.ip);
            return None;
        }
    }
    log::debug!("Host {}: Solar API confirmed", entry.ip);

    let (info, power_flow, storage, meter) = tokio::join!(
        Retry::spawn(probe_retry(), || client.get_inverter_info()),
        client.get_power_flow(),
        Retry::spawn(probe_retry(), || client.get_storage()),
        Retry::spawn(probe_retry(), || client.get_meter()),
    );

    let info = match info {
        Ok(info) => info,
        Err(error) => {
            log::warn!("Host {}: inverter info probe failed: {error}", entry.ip);
            DeviceInfo {
                model: "Unknown".to_string(),
                ..DeviceInfo::default()
            }
        }
    };
    let serial = info
        .unique_id
        .clone()
        .unwrap_or_else(|| fallback_serial(&entry.mac));
    let is_master = power_flow
        .map(|flow| flow.p_load.is_some())
        .unwrap_or(false);
    let battery = match storage {
        Ok(storage) => storage,
        Err(error) => {
            log::warn!("Host {}: storage probe failed: {error}", entry.ip);
            None
        }
    };
    let meter = match meter {
        Ok(meter) => meter,
        Err(error) => {
            log::warn!("Host {}: meter probe failed: {error}", entry.ip);
            None
        }
    };

    Some(DiscoveredDevice {
        ip: entry.ip,
        mac: Some(entry.mac.clone()),
        hostname: entry.hostname.clone(),
        serial,
        is_master,
        info,
        battery,
        meter,
    })
}

/// Deterministic stand-in serial for devices that report none.
pub fn fallback_serial(mac: &str) -> String {
    format!("UNKNOWN_{}", mac.replace(':', ""))
}
