//! The `Site` aggregate: owns the inverter set and derives everything the
//! collector publishes from it.

use crate::discovery::DiscoveredDevice;
use crate::site::inverter::Inverter;
use crate::site::metrics::{
    BatteryBlock, GridBlock, Heartbeat, HeartbeatStatus, InverterMetrics, QuantityBlock,
    SiteBlock, SiteFault, SiteMetrics,
};
use crate::site::minutely::{CurrentTotals, MinutelyReport, SnapshotLedger, kwh_total};
use chrono::{Local, TimeDelta};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Rolling-history window.
const HISTORY_WINDOW: TimeDelta = TimeDelta::minutes(10);
/// Snapshot count cap: ten minutes at one snapshot every two seconds.
const HISTORY_CAPACITY: usize = 300;
/// Retained minutely reports.
const MINUTELY_CAPACITY: usize = 20;

/// Site-wide cumulative energy counters, `None` where the hardware to
/// measure a quantity is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyTotals {
    pub solar_wh: Option<f64>,
    pub battery_in_wh: Option<f64>,
    pub battery_out_wh: Option<f64>,
    pub grid_in_wh: Option<f64>,
    pub grid_out_wh: Option<f64>,
    pub load_wh: Option<f64>,
}

pub struct Site {
    name: String,
    http: reqwest::Client,
    inverters: BTreeMap<String, Inverter>,
    history: std::collections::VecDeque<Arc<SiteMetrics>>,
    minutely_history: std::collections::VecDeque<Arc<MinutelyReport>>,
    ledger: Option<SnapshotLedger>,
    session_id: String,
    sequence: u64,
    last_metrics: Option<Arc<SiteMetrics>>,
}

impl Site {
    pub fn new(name: String, http: reqwest::Client) -> Self {
        Site {
            name,
            http,
            inverters: BTreeMap::new(),
            history: std::collections::VecDeque::new(),
            minutely_history: std::collections::VecDeque::new(),
            ledger: None,
            session_id: Self::session_id(),
            sequence: 0,
            last_metrics: None,
        }
    }

    /// Four uppercase hex digits identifying this process in sequences.
    fn session_id() -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos())
            .unwrap_or(0);
        format!("{:04X}", (std::process::id() ^ nanos) & 0xFFFF)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inverters(&self) -> impl Iterator<Item = &Inverter> {
        self.inverters.values()
    }

    pub fn device_count(&self) -> usize {
        self.inverters.len()
    }

    pub fn last_metrics(&self) -> Option<Arc<SiteMetrics>> {
        self.last_metrics.clone()
    }

    pub fn history(&self) -> Vec<Arc<SiteMetrics>> {
        self.history.iter().cloned().collect()
    }

    pub fn minutely_history(&self) -> Vec<Arc<MinutelyReport>> {
        self.minutely_history.iter().cloned().collect()
    }

    /// Atomic replacement of the device set from a finished scan.
    ///
    /// Known serials keep their integrators and history and only refresh
    /// mutable identity; unknown serials become new inverters; serials that
    /// vanished from the scan are removed.
    pub fn adopt_discovered(&mut self, mut devices: Vec<DiscoveredDevice>) {
        devices.sort_by(|a, b| a.serial.cmp(&b.serial));
        let mut master_serial: Option<String> = None;
        for device in &mut devices {
            if device.is_master {
                if let Some(master) = &master_serial {
                    log::warn!(
                        "Multiple masters reported; keeping {master}, demoting {}",
                        device.serial
                    );
                    device.is_master = false;
                } else {
                    master_serial = Some(device.serial.clone());
                }
            }
        }

        let keep: HashSet<&str> = devices.iter().map(|d| d.serial.as_str()).collect();
        self.inverters.retain(|serial, _| {
            let stays = keep.contains(serial.as_str());
            if !stays {
                log::info!("Inverter {serial} no longer reachable, removed");
            }
            stays
        });

        for device in devices {
            match self.inverters.get_mut(&device.serial) {
                Some(inverter) => inverter.update_from(self.http.clone(), device),
                None => {
                    log::info!(
                        "Adopted inverter {} at {}{}",
                        device.serial,
                        device.ip,
                        if device.is_master { " (master)" } else { "" }
                    );
                    self.inverters
                        .insert(device.serial.clone(), Inverter::new(self.http.clone(), device));
                }
            }
        }
    }

    /// One polling round: fan out to every inverter, wait for all to
    /// settle, then snapshot the aggregate into the rolling history.
    pub async fn poll(&mut self) -> (Arc<SiteMetrics>, Vec<Heartbeat>) {
        let polls: Vec<_> = self
            .inverters
            .values_mut()
            .map(|inverter| inverter.poll())
            .collect();
        futures::future::join_all(polls).await;

        let now = Local::now();
        let heartbeats = self
            .inverters
            .values()
            .map(|inverter| Heartbeat {
                serial: inverter.serial().to_string(),
                status: if inverter.is_online() {
                    HeartbeatStatus::Online
                } else {
                    HeartbeatStatus::Offline
                },
                timestamp: now,
            })
            .collect();

        let metrics = Arc::new(self.build_site_metrics());
        self.history.push_back(metrics.clone());
        let cutoff = now - HISTORY_WINDOW;
        while self
            .history
            .front()
            .is_some_and(|snapshot| snapshot.timestamp < cutoff)
        {
            self.history.pop_front();
        }
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.last_metrics = Some(metrics.clone());
        (metrics, heartbeats)
    }

    /// Builds one aggregated snapshot from the current inverter states.
    pub fn build_site_metrics(&self) -> SiteMetrics {
        let inverters: Vec<InverterMetrics> = self
            .inverters
            .values()
            .map(InverterMetrics::from_inverter)
            .collect();

        let solar_w = Self::sum_present(self.inverters.values().map(|inverter| {
            inverter.last_sample().and_then(|sample| sample.solar_w)
        }));
        let battery_w = Self::sum_present(self.inverters.values().map(|inverter| {
            if inverter.battery().is_some() {
                inverter.last_sample().and_then(|sample| sample.battery_w)
            } else {
                None
            }
        }));
        let grid_w = self
            .master()
            .and_then(|master| master.last_sample())
            .and_then(|sample| sample.grid_w);
        let soc = Self::mean_soc(self.inverters.values());

        // Load by conservation of energy: missing terms count as zero, but
        // at least one term has to exist for load to mean anything.
        let load_w = if solar_w.is_some() || battery_w.is_some() || grid_w.is_some() {
            Some((solar_w.unwrap_or(0) + battery_w.unwrap_or(0) + grid_w.unwrap_or(0)).max(0))
        } else {
            None
        };

        let totals = self.energy_totals();
        let faults: Vec<SiteFault> = self
            .inverters
            .values()
            .filter_map(|inverter| {
                inverter
                    .fault()
                    .map(|fault| SiteFault::new(inverter.serial(), fault))
            })
            .collect();

        SiteMetrics {
            timestamp: Local::now(),
            inverters,
            site: SiteBlock {
                solar: QuantityBlock {
                    power_w: solar_w,
                    energy_wh: totals.solar_wh,
                },
                battery: BatteryBlock {
                    power_w: battery_w,
                    soc,
                    in_wh: totals.battery_in_wh,
                    out_wh: totals.battery_out_wh,
                },
                grid: GridBlock {
                    power_w: grid_w,
                    in_wh: totals.grid_in_wh,
                    out_wh: totals.grid_out_wh,
                },
                load: QuantityBlock {
                    power_w: load_w,
                    energy_wh: totals.load_wh,
                },
                has_fault: !faults.is_empty(),
                faults,
            },
        }
    }

    /// Cumulative site energy. Grid counts only the master's integrator.
    pub fn energy_totals(&self) -> EnergyTotals {
        let mut totals = EnergyTotals::default();
        for inverter in self.inverters.values() {
            let energy = inverter.energy();
            totals.solar_wh = Some(totals.solar_wh.unwrap_or(0.0) + energy.solar_wh);
            if let Some(battery_in) = energy.battery_in_wh {
                totals.battery_in_wh = Some(totals.battery_in_wh.unwrap_or(0.0) + battery_in);
            }
            if let Some(battery_out) = energy.battery_out_wh {
                totals.battery_out_wh = Some(totals.battery_out_wh.unwrap_or(0.0) + battery_out);
            }
            if inverter.is_master() {
                totals.grid_in_wh = energy.grid_in_wh;
                totals.grid_out_wh = energy.grid_out_wh;
            }
        }
        if totals.solar_wh.is_some()
            || totals.grid_in_wh.is_some()
            || totals.battery_out_wh.is_some()
        {
            let load = totals.solar_wh.unwrap_or(0.0) + totals.grid_in_wh.unwrap_or(0.0)
                + totals.battery_out_wh.unwrap_or(0.0)
                - totals.grid_out_wh.unwrap_or(0.0)
                - totals.battery_in_wh.unwrap_or(0.0);
            totals.load_wh = Some(load.max(0.0));
        }
        totals
    }

    /// Minute-boundary tick: emit the next report, or `None` while there is
    /// nothing to report (no devices, or the bootstrap interval).
    pub fn tick_minutely(&mut self) -> Option<Arc<MinutelyReport>> {
        let report = self.generate_minutely()?;
        let report = Arc::new(report);
        self.minutely_history.push_back(report.clone());
        while self.minutely_history.len() > MINUTELY_CAPACITY {
            self.minutely_history.pop_front();
        }
        Some(report)
    }

    fn generate_minutely(&mut self) -> Option<MinutelyReport> {
        let totals = self.energy_totals();
        if totals.solar_wh.is_none() && totals.grid_in_wh.is_none() {
            return None;
        }
        let current = CurrentTotals {
            solar_wh: totals.solar_wh.unwrap_or(0.0),
            battery_in_wh: totals.battery_in_wh.unwrap_or(0.0),
            battery_out_wh: totals.battery_out_wh.unwrap_or(0.0),
            grid_in_wh: totals.grid_in_wh.unwrap_or(0.0),
            grid_out_wh: totals.grid_out_wh.unwrap_or(0.0),
            load_wh: totals.load_wh.unwrap_or(0.0),
        };

        let Some(ledger) = &mut self.ledger else {
            self.ledger = Some(SnapshotLedger::bootstrap(&current));
            return None;
        };

        let master_w = Self::sum_present(self.inverters.values().filter(|i| i.is_master()).map(
            |inverter| inverter.last_sample().and_then(|sample| sample.solar_w),
        ));
        let slave_w = Self::sum_present(self.inverters.values().filter(|i| !i.is_master()).map(
            |inverter| inverter.last_sample().and_then(|sample| sample.solar_w),
        ));
        let deltas = ledger.advance(&current, master_w.unwrap_or(0), slave_w.unwrap_or(0));
        let ledger = *ledger;

        self.sequence += 1;
        let metrics = self.build_site_metrics();
        let first_fault = metrics.site.faults.first();

        Some(MinutelyReport {
            timestamp: Local::now(),
            sequence: format!("{}/{}", self.session_id, self.sequence),
            solar_w: metrics.site.solar.power_w,
            solar_interval_wh: deltas.solar,
            solar_local_w: master_w,
            solar_local_interval_wh: deltas.solar_local,
            solar_remote_w: slave_w,
            solar_remote_interval_wh: deltas.solar_remote,
            load_w: metrics.site.load.power_w,
            load_interval_wh: deltas.load,
            battery_w: metrics.site.battery.power_w,
            battery_in_interval_wh: deltas.battery_in,
            battery_out_interval_wh: deltas.battery_out,
            grid_w: metrics.site.grid.power_w,
            grid_in_interval_wh: deltas.grid_in,
            grid_out_interval_wh: deltas.grid_out,
            battery_soc: metrics.site.battery.soc,
            fault_code: first_fault.map(|fault| fault.code.clone()),
            fault_timestamp: first_fault
                .map(|fault| crate::core::timefmt::format_local(&fault.timestamp)),
            generator_status: None,
            solar_kwh_total: totals.solar_wh.is_some().then(|| kwh_total(ledger.solar_wh)),
            load_kwh_total: totals.load_wh.is_some().then(|| kwh_total(ledger.load_wh)),
            battery_in_kwh_total: totals
                .battery_in_wh
                .is_some()
                .then(|| kwh_total(ledger.battery_in_wh)),
            battery_out_kwh_total: totals
                .battery_out_wh
                .is_some()
                .then(|| kwh_total(ledger.battery_out_wh)),
            grid_in_kwh_total: totals
                .grid_in_wh
                .is_some()
                .then(|| kwh_total(ledger.grid_in_wh)),
            grid_out_kwh_total: totals
                .grid_out_wh
                .is_some()
                .then(|| kwh_total(ledger.grid_out_wh)),
        })
    }

    fn master(&self) -> Option<&Inverter> {
        self.inverters.values().find(|inverter| inverter.is_master())
    }

    fn sum_present(values: impl Iterator<Item = Option<i64>>) -> Option<i64> {
        values.flatten().fold(None, |acc, value| {
            Some(acc.unwrap_or(0) + value)
        })
    }

    fn mean_soc<'a>(inverters: impl Iterator<Item = &'a Inverter>) -> Option<f64> {
        let socs: Vec<f64> = inverters
            .filter_map(|inverter| inverter.last_sample().and_then(|sample| sample.soc))
            .collect();
        if socs.is_empty() {
            return None;
        }
        let mean = socs.iter().sum::<f64>() / socs.len() as f64;
        Some((mean * 10.0).round() / 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::fronius::{DeviceInfo, PowerFlow, StorageInfo};
    use chrono::{TimeDelta, Utc};

    fn device(serial: &str, is_master: bool, with_battery: bool) -> DiscoveredDevice {
        DiscoveredDevice {
            ip: "192.168.1.10".parse().unwrap(),
            mac: Some("aa:bb:cc:dd:ee:01".to_string()),
            hostname: None,
            serial: serial.to_string(),
            is_master,
            info: DeviceInfo {
                unique_id: Some(serial.to_string()),
                model: "Gen24".to_string(),
                pv_power_w: Some(5000),
                custom_name: None,
            },
            battery: with_battery.then(StorageInfo::default),
            meter: None,
        }
    }

    fn site_with(devices: Vec<DiscoveredDevice>) -> Site {
        let mut site = Site::new("Test".to_string(), reqwest::Client::new());
        site.adopt_discovered(devices);
        site
    }

    fn flow(pv: f64, grid: Option<f64>, akku: Option<f64>, load: Option<f64>) -> PowerFlow {
        PowerFlow {
            p_pv: Some(pv),
            p_grid: grid,
            p_akku: akku,
            p_load: load,
            soc: None,
            status_code: Some(7),
        }
    }

    /// Drives one inverter through a steady minute of two-second samples.
    fn feed_steady(site: &mut Site, serial: &str, flow: &PowerFlow, seconds: i64) {
        let start = Utc::now();
        let inverter = site.inverters.get_mut(serial).unwrap();
        for tick in 0..=(seconds / 2) {
            inverter.ingest(flow, start + TimeDelta::seconds(tick * 2));
        }
    }

    #[test]
    fn test_empty_site_aggregates_to_nulls() {
        let site = site_with(vec![]);
        let metrics = site.build_site_metrics();
        assert_eq!(metrics.site.solar.power_w, None);
        assert_eq!(metrics.site.battery.power_w, None);
        assert_eq!(metrics.site.grid.power_w, None);
        assert_eq!(metrics.site.load.power_w, None);
        assert_eq!(metrics.site.solar.energy_wh, None);
        assert!(!metrics.site.has_fault);
        assert!(metrics.site.faults.is_empty());
    }

    #[test]
    fn test_empty_site_never_reports() {
        let mut site = site_with(vec![]);
        assert!(site.tick_minutely().is_none());
        assert!(site.tick_minutely().is_none());
    }

    #[test]
    fn test_aggregation_master_and_slave() {
        let mut site = site_with(vec![
            device("MASTER1", true, true),
            device("SLAVE1", false, false),
        ]);
        let now = Utc::now();
        site.inverters
            .get_mut("MASTER1")
            .unwrap()
            .ingest(&flow(2000.0, Some(-500.0), Some(0.0), Some(-2500.0)), now);
        site.inverters
            .get_mut("SLAVE1")
            .unwrap()
            .ingest(&flow(1000.0, None, None, None), now);

        let metrics = site.build_site_metrics();
        assert_eq!(metrics.site.solar.power_w, Some(3000));
        assert_eq!(metrics.site.grid.power_w, Some(-500));
        assert_eq!(metrics.site.battery.power_w, Some(0));
        // load = max(0, solar + grid + battery)
        assert_eq!(metrics.site.load.power_w, Some(2500));
        assert_eq!(metrics.inverters.len(), 2);
    }

    #[test]
    fn test_load_energy_balance() {
        let mut site = site_with(vec![device("MASTER1", true, true)]);
        feed_steady(&mut site, "MASTER1", &flow(3000.0, Some(-500.0), Some(0.0), Some(-2500.0)), 60);

        let totals = site.energy_totals();
        let solar = totals.solar_wh.unwrap();
        let expected_load = solar + totals.grid_in_wh.unwrap() + totals.battery_out_wh.unwrap()
            - totals.grid_out_wh.unwrap()
            - totals.battery_in_wh.unwrap();
        assert_eq!(totals.load_wh.unwrap(), expected_load.max(0.0));
        assert!((solar - 50.0).abs() < 1e-6);
        assert!((totals.grid_out_wh.unwrap() - 500.0 * 60.0 / 3600.0).abs() < 1e-6);
    }

    #[test]
    fn test_minutely_bootstrap_then_first_report() {
        let mut site = site_with(vec![device("MASTER1", true, false)]);
        feed_steady(&mut site, "MASTER1", &flow(3000.0, Some(-500.0), None, Some(-2500.0)), 60);

        // Bootstrap interval stores the snapshot and reports nothing.
        assert!(site.tick_minutely().is_none());
        feed_steady(&mut site, "MASTER1", &flow(3000.0, Some(-500.0), None, Some(-2500.0)), 60);

        let report = site.tick_minutely().expect("second tick must report");
        assert!(report.sequence.ends_with("/1"));
        assert_eq!(report.solar_w, Some(3000));
        assert_eq!(report.solar_interval_wh, 50);
        assert_eq!(report.grid_w, Some(-500));
        assert_eq!(report.grid_out_interval_wh, 8);
        assert_eq!(report.grid_in_interval_wh, 0);
        assert_eq!(report.load_w, Some(2500));
        assert_eq!(report.load_interval_wh, 42);
        assert!(report.battery_soc.is_none());
        assert!(report.generator_status.is_none());
    }

    #[test]
    fn test_sequence_is_monotonic_with_constant_session() {
        let mut site = site_with(vec![device("MASTER1", true, false)]);
        feed_steady(&mut site, "MASTER1", &flow(1000.0, Some(0.0), None, Some(-1000.0)), 60);
        assert!(site.tick_minutely().is_none());

        let mut session = None;
        for n in 1..=5 {
            feed_steady(&mut site, "MASTER1", &flow(1000.0, Some(0.0), None, Some(-1000.0)), 60);
            let report = site.tick_minutely().unwrap();
            let (prefix, counter) = report.sequence.split_once('/').unwrap();
            assert_eq!(prefix.len(), 4);
            assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(counter.parse::<u64>().unwrap(), n);
            match &session {
                None => session = Some(prefix.to_string()),
                Some(existing) => assert_eq!(existing, prefix),
            }
        }
        assert_eq!(site.minutely_history().len(), 5);
    }

    #[test]
    fn test_master_slave_split_proportional_to_power() {
        let mut site = site_with(vec![
            device("MASTER1", true, false),
            device("SLAVE1", false, false),
        ]);
        feed_steady(&mut site, "MASTER1", &flow(2000.0, Some(0.0), None, Some(-2000.0)), 60);
        feed_steady(&mut site, "SLAVE1", &flow(1000.0, None, None, None), 60);
        assert!(site.tick_minutely().is_none());
        feed_steady(&mut site, "MASTER1", &flow(2000.0, Some(0.0), None, Some(-2000.0)), 60);
        feed_steady(&mut site, "SLAVE1", &flow(1000.0, None, None, None), 60);

        let report = site.tick_minutely().unwrap();
        assert_eq!(report.solar_local_w, Some(2000));
        assert_eq!(report.solar_remote_w, Some(1000));
        assert_eq!(
            report.solar_local_interval_wh + report.solar_remote_interval_wh,
            report.solar_interval_wh
        );
        // 2:1 power ratio: round(50 * 2/3) = 33, remainder to the slave.
        assert_eq!(report.solar_interval_wh, 50);
        assert_eq!(report.solar_local_interval_wh, 33);
        assert_eq!(report.solar_remote_interval_wh, 17);
    }

    #[test]
    fn test_adopt_keeps_energy_across_role_flip() {
        let mut site = site_with(vec![
            device("MASTER1", true, false),
            device("SLAVE1", false, false),
        ]);
        feed_steady(&mut site, "SLAVE1", &flow(1000.0, None, None, None), 60);
        let before = site.inverters.get("SLAVE1").unwrap().energy().solar_wh;
        assert!(before > 0.0);

        // Old master disappears; the remaining inverter is promoted.
        site.adopt_discovered(vec![device("SLAVE1", true, false)]);
        assert_eq!(site.device_count(), 1);
        let promoted = site.inverters.get("SLAVE1").unwrap();
        assert!(promoted.is_master());
        assert_eq!(promoted.energy().solar_wh, before);
        // Promotion brings a grid integrator with it.
        assert!(promoted.energy().grid_in_wh.is_some());
    }

    #[test]
    fn test_adopt_demotes_duplicate_masters() {
        let site = site_with(vec![
            device("B", true, false),
            device("A", true, false),
        ]);
        let masters: Vec<_> = site
            .inverters()
            .filter(|inverter| inverter.is_master())
            .map(|inverter| inverter.serial().to_string())
            .collect();
        assert_eq!(masters, vec!["A".to_string()]);
    }

    #[test]
    fn test_mean_soc_rounding() {
        let mut site = site_with(vec![
            device("A", true, true),
            device("B", false, true),
        ]);
        let now = Utc::now();
        let mut flow_a = flow(0.0, Some(0.0), Some(0.0), Some(0.0));
        flow_a.soc = Some(50.0);
        let mut flow_b = flow(0.0, None, Some(0.0), None);
        flow_b.soc = Some(75.5);
        site.inverters.get_mut("A").unwrap().ingest(&flow_a, now);
        site.inverters.get_mut("B").unwrap().ingest(&flow_b, now);
        let metrics = site.build_site_metrics();
        assert_eq!(metrics.site.battery.soc, Some(62.8));
    }

    #[test]
    fn test_faults_listed_in_serial_order() {
        let mut site = site_with(vec![
            device("B", true, false),
            device("A", false, false),
        ]);
        let now = Utc::now();
        let mut faulty = flow(0.0, Some(0.0), None, Some(0.0));
        faulty.status_code = Some(3);
        site.inverters.get_mut("B").unwrap().ingest(&faulty, now);
        let mut faulty = flow(0.0, None, None, None);
        faulty.status_code = Some(9);
        site.inverters.get_mut("A").unwrap().ingest(&faulty, now);

        let metrics = site.build_site_metrics();
        assert!(metrics.site.has_fault);
        let codes: Vec<_> = metrics
            .site
            .faults
            .iter()
            .map(|fault| (fault.serial.as_str(), fault.code.as_str()))
            .collect();
        assert_eq!(codes, vec![("A", "9"), ("B", "3")]);
    }
}
