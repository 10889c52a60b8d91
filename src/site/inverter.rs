//! One physical Fronius Gen24 device: identity, capability records,
//! integrators, and the latest sample.

use crate::core::timefmt::serde_local;
use crate::discovery::DiscoveredDevice;
use crate::energy::{BidirectionalIntegrator, EnergyIntegrator};
use crate::integration::fronius::{self, DeviceInfo, ErrorClass, MeterInfo, PowerFlow, StorageInfo};
use crate::site::metrics::EnergyReadout;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::net::Ipv4Addr;

/// Device status code reported by a healthy inverter.
const STATUS_RUNNING: u32 = 7;

/// One per-poll reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub at: DateTime<Utc>,
    /// Solar production, watts, never negative.
    pub solar_w: Option<i64>,
    /// Battery flow, watts: positive = discharge, negative = charge.
    pub battery_w: Option<i64>,
    /// Grid flow, watts: positive = import, negative = export. Master only.
    pub grid_w: Option<i64>,
    /// Load reported by the device. Displayed, never integrated.
    pub load_w: Option<i64>,
    /// Battery state of charge, percent, one decimal.
    pub soc: Option<f64>,
}

impl Sample {
    fn from_power_flow(flow: &PowerFlow, at: DateTime<Utc>) -> Self {
        Sample {
            at,
            solar_w: flow.p_pv.map(|w| (w.round() as i64).max(0)),
            battery_w: flow.p_akku.map(|w| w.round() as i64),
            grid_w: flow.p_grid.map(|w| w.round() as i64),
            load_w: flow.p_load.map(|w| w.round() as i64),
            soc: flow.soc.map(|soc| (soc * 10.0).round() / 10.0),
        }
    }
}

/// A latched fault: a device status code or a transport error class.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fault {
    pub code: String,
    #[serde(with = "serde_local")]
    pub at: DateTime<Local>,
}

pub struct Inverter {
    serial: String,
    ip: Ipv4Addr,
    mac: Option<String>,
    hostname: Option<String>,
    is_master: bool,
    info: DeviceInfo,
    battery: Option<StorageInfo>,
    meter: Option<MeterInfo>,
    client: fronius::Client,
    solar: EnergyIntegrator,
    battery_flow: Option<BidirectionalIntegrator>,
    grid_flow: Option<BidirectionalIntegrator>,
    last_sample: Option<Sample>,
    fault: Option<Fault>,
    online: bool,
}

impl Inverter {
    /// Builds an inverter from a discovery result.
    ///
    /// The solar integrator always exists; the battery integrator only when
    /// a battery record was probed; the grid integrator only on the master.
    pub fn new(http: reqwest::Client, device: DiscoveredDevice) -> Self {
        let client = fronius::Client::for_device(http, device.ip);
        let battery_flow = device.battery.is_some().then(BidirectionalIntegrator::new);
        let grid_flow = device.is_master.then(BidirectionalIntegrator::new);
        Inverter {
            serial: device.serial,
            ip: device.ip,
            mac: device.mac,
            hostname: device.hostname,
            is_master: device.is_master,
            info: device.info,
            battery: device.battery,
            meter: device.meter,
            client,
            solar: EnergyIntegrator::new(),
            battery_flow,
            grid_flow,
            last_sample: None,
            fault: None,
            online: false,
        }
    }

    /// Updates mutable identity from a rescan, keeping integrators and
    /// history. Capability records are discovery-time facts and are
    /// refreshed wholesale; energy state is not.
    pub fn update_from(&mut self, http: reqwest::Client, device: DiscoveredDevice) {
        debug_assert_eq!(self.serial, device.serial);
        if self.ip != device.ip {
            log::info!("Inverter {}: address changed {} -> {}", self.serial, self.ip, device.ip);
            self.client = fronius::Client::for_device(http, device.ip);
            self.ip = device.ip;
        }
        self.mac = device.mac;
        self.hostname = device.hostname;
        if self.is_master != device.is_master {
            log::info!(
                "Inverter {}: role changed to {}",
                self.serial,
                if device.is_master { "master" } else { "slave" }
            );
        }
        self.is_master = device.is_master;
        self.info = device.info;
        self.battery = device.battery;
        self.meter = device.meter;
        if self.battery.is_some() && self.battery_flow.is_none() {
            self.battery_flow = Some(BidirectionalIntegrator::new());
        }
        if self.is_master && self.grid_flow.is_none() {
            self.grid_flow = Some(BidirectionalIntegrator::new());
        }
    }

    /// Polls the device once and feeds the integrators.
    ///
    /// Returns `true` when the device answered with a usable reading.
    /// Transport failures latch a fault code; protocol failures (unexpected
    /// body shape) fail softly without one. Either way the stale sample is
    /// dropped so the device falls out of the site aggregates.
    pub async fn poll(&mut self) -> bool {
        let now = Utc::now();
        let result = self.client.get_power_flow().await;
        match result {
            Ok(flow) => {
                self.ingest(&flow, now);
                true
            }
            Err(error) if error.is_protocol() => {
                log::warn!("Inverter {}: unexpected response: {error}", self.serial);
                self.last_sample = None;
                self.online = false;
                false
            }
            Err(error) => {
                let class = ErrorClass::classify(&error);
                log::warn!("Inverter {}: poll failed: {class} ({error})", self.serial);
                self.set_fault(class.to_string());
                self.last_sample = None;
                self.online = false;
                false
            }
        }
    }

    /// Applies one successful power-flow reading: feeds the integrators,
    /// latches or clears the device fault, and stores the sample.
    pub(crate) fn ingest(&mut self, flow: &PowerFlow, at: DateTime<Utc>) {
        let sample = Sample::from_power_flow(flow, at);
        self.solar.update(sample.solar_w.map(|w| w as f64), at);
        if let Some(battery) = &mut self.battery_flow {
            battery.update(sample.battery_w.map(|w| w as f64), at);
        }
        if let Some(grid) = &mut self.grid_flow {
            grid.update(sample.grid_w.map(|w| w as f64), at);
        }
        match flow.status_code {
            Some(code) if code != STATUS_RUNNING => self.set_fault(code.to_string()),
            _ => self.fault = None,
        }
        self.last_sample = Some(sample);
        self.online = true;
    }

    /// Latches a fault code, keeping the original timestamp while the same
    /// code persists.
    fn set_fault(&mut self, code: String) {
        match &self.fault {
            Some(fault) if fault.code == code => {}
            _ => {
                self.fault = Some(Fault {
                    code,
                    at: Local::now(),
                })
            }
        }
    }

    /// Running energy counters in watt-hours.
    pub fn energy(&self) -> EnergyReadout {
        EnergyReadout {
            solar_wh: self.solar.value_wh(),
            // Battery: positive flow is discharge (out), negative is charge (in).
            battery_in_wh: self.battery_flow.as_ref().map(|b| b.negative_wh()),
            battery_out_wh: self.battery_flow.as_ref().map(|b| b.positive_wh()),
            // Grid: positive flow is import (in), negative is export (out).
            grid_in_wh: self.grid_flow.as_ref().map(|g| g.positive_wh()),
            grid_out_wh: self.grid_flow.as_ref().map(|g| g.negative_wh()),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn mac(&self) -> Option<&str> {
        self.mac.as_deref()
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Display name: the configured custom name, else the serial.
    pub fn name(&self) -> &str {
        self.info.custom_name.as_deref().unwrap_or(&self.serial)
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn battery(&self) -> Option<&StorageInfo> {
        self.battery.as_ref()
    }

    pub fn meter(&self) -> Option<&MeterInfo> {
        self.meter.as_ref()
    }

    pub fn last_sample(&self) -> Option<&Sample> {
        self.last_sample.as_ref()
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    pub fn is_online(&self) -> bool {
        self.online
    }
}
