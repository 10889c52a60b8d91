//! Device discovery: prime the ARP cache with a subnet sweep, read the ARP
//! table, and probe every candidate for the Solar API.

mod arp;
mod error;
mod probe;

pub use arp::{ArpEntry, normalize_mac};
pub use error::{Error, Result};
pub use probe::DiscoveredDevice;

use std::time::Duration;

/// Settle time between the sweep and the ARP table read.
const ARP_SETTLE: Duration = Duration::from_secs(2);

/// Sweeps every locally attached /24 and returns the reachable Fronius
/// devices with their roles and capability records.
///
/// A completely failed run (the ARP table itself is unreadable) is an
/// error; an empty network is simply an empty result.
pub async fn discover(http: &reqwest::Client) -> Result<Vec<DiscoveredDevice>> {
    let addresses = arp::local_ipv4_addresses().await;
    if addresses.is_empty() {
        log::warn!("No usable IPv4 interface found, relying on the existing ARP cache");
    } else {
        log::info!(
            "Sweeping {} subnet(s): {}",
            addresses.len(),
            addresses
                .iter()
                .map(|address| format!("{address}/24"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        futures::future::join_all(addresses.iter().map(|address| arp::prime_subnet(*address)))
            .await;
        tokio::time::sleep(ARP_SETTLE).await;
    }

    let entries = arp::read_arp_table().await?;
    log::info!("ARP table yielded {} candidate host(s)", entries.len());

    let probes = entries.iter().map(|entry| probe::probe_host(http, entry));
    let mut devices: Vec<DiscoveredDevice> = Vec::new();
    for device in futures::future::join_all(probes).await.into_iter().flatten() {
        if devices.iter().any(|known| known.serial == device.serial) {
            log::warn!("Duplicate serial {} in scan, keeping the first", device.serial);
            continue;
        }
        devices.push(device);
    }
    log::info!("Discovery finished: {} Fronius device(s)", devices.len());
    Ok(devices)
}
