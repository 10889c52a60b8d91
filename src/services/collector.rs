//! The collector: drives the two-second polling tick, the minutely report
//! timer, and the scan trigger, and publishes everything to the bus.

use crate::bus::{EventBus, Subscription};
use crate::core::timefmt::format_local;
use crate::discovery;
use crate::services::events::{Event, HistorySample, ScanState, SiteStatus, StatusSnapshot};
use crate::services::push::PushState;
use crate::site::{DeviceStatus, Site, SiteMetrics};
use chrono::{DateTime, Local, TimeDelta, Timelike};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Polling cadence.
const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Scan-status republish cadence while a scan runs.
const SCAN_STATUS_PERIOD: Duration = Duration::from_secs(1);
/// Offset past the minute boundary for the report tick. Skews away from
/// the measurements inverters refresh at :00.
const MINUTELY_OFFSET_S: i64 = 5;

pub struct Collector {
    site: Arc<tokio::sync::Mutex<Site>>,
    bus: Arc<EventBus<Event>>,
    http: reqwest::Client,
    push_state: Arc<PushState>,
    scanning: AtomicBool,
    scan_requests: Notify,
    last_scan: Mutex<Option<DateTime<Local>>>,
    latest_update: Mutex<Option<Arc<StatusSnapshot>>>,
    latest_metrics: Mutex<Option<Arc<SiteMetrics>>>,
}

impl Collector {
    pub fn new(
        site: Arc<tokio::sync::Mutex<Site>>,
        bus: Arc<EventBus<Event>>,
        http: reqwest::Client,
        push_state: Arc<PushState>,
    ) -> Self {
        log::info!(
            "Collector starting: poll every {}s, reports at :{:02} past the minute",
            POLL_INTERVAL.as_secs(),
            MINUTELY_OFFSET_S
        );
        Collector {
            site,
            bus,
            http,
            push_state,
            scanning: AtomicBool::new(false),
            scan_requests: Notify::new(),
            last_scan: Mutex::new(None),
            latest_update: Mutex::new(None),
            latest_metrics: Mutex::new(None),
        }
    }

    /// Runs the three scheduler loops until shutdown. An initial discovery
    /// is queued before the loops start, so it fires at the first
    /// cooperative yield, after the HTTP surface had its chance to bind.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.scan_requests.notify_one();
        tokio::join!(
            self.polling_loop(shutdown.clone()),
            self.minutely_loop(shutdown.clone()),
            self.scan_loop(shutdown.clone()),
        );
        log::info!("Collector stopped");
    }

    /// Non-blocking rescan request. At most one scan runs at a time; a
    /// request during a running scan only republishes the state.
    pub fn request_scan(&self) {
        if self.scanning.load(Ordering::Acquire) {
            self.bus.publish(Event::ScanStatus(ScanState::Scanning));
            return;
        }
        self.scan_requests.notify_one();
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    /// Registers a subscriber and composes its initial replay.
    pub async fn subscribe(&self) -> (Vec<Event>, Subscription<Event>) {
        let subscription = self.bus.subscribe();
        let mut initial = Vec::new();
        if let Some(update) = self
            .latest_update
            .lock()
            .expect("collector state poisoned")
            .clone()
        {
            initial.push(Event::SiteUpdate(update));
        }
        if let Some(metrics) = self
            .latest_metrics
            .lock()
            .expect("collector state poisoned")
            .clone()
        {
            initial.push(Event::SiteMetrics(metrics));
        }
        let site = self.site.lock().await;
        initial.push(Event::HiresHistory(site.history()));
        initial.push(Event::MinutelyHistory(site.minutely_history()));
        drop(site);
        if let Some(test) = self.push_state.last_test() {
            initial.push(Event::PushTest(test));
        }
        (initial, subscription)
    }

    /// Builds the full status document served by `GET /api/status`.
    pub async fn status_snapshot(&self) -> StatusSnapshot {
        let site = self.site.lock().await;
        let metrics = site.build_site_metrics();
        let devices: Vec<DeviceStatus> =
            site.inverters().map(DeviceStatus::from_inverter).collect();
        let name = site.name().to_string();
        drop(site);
        StatusSnapshot {
            device_count: devices.len(),
            last_scan: self
                .last_scan
                .lock()
                .expect("collector state poisoned")
                .map(|at| format_local(&at)),
            is_scanning: self.is_scanning(),
            devices,
            site: SiteStatus::new(name, &metrics.site),
            push: self.push_state.status(),
        }
    }

    /// Pivots the rolling history into per-serial sample series for
    /// `GET /api/history`.
    pub async fn history_by_serial(&self) -> BTreeMap<String, Vec<HistorySample>> {
        let site = self.site.lock().await;
        let history = site.history();
        drop(site);
        let mut by_serial: BTreeMap<String, Vec<HistorySample>> = BTreeMap::new();
        for snapshot in history {
            let timestamp = format_local(&snapshot.timestamp);
            for inverter in &snapshot.inverters {
                by_serial
                    .entry(inverter.serial.clone())
                    .or_default()
                    .push(HistorySample {
                        timestamp: timestamp.clone(),
                        solar: inverter.solar_w,
                        battery: inverter.battery_w,
                        grid: inverter.grid_w,
                        load: inverter.load_w,
                        soc: inverter.soc,
                    });
            }
        }
        by_serial
    }

    async fn polling_loop(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // Skip the tick when the previous round (or a scan adopt) still
            // holds the site. Latency beats coverage at this cadence.
            let Ok(mut site) = self.site.try_lock() else {
                log::debug!("Poll tick skipped, site busy");
                continue;
            };
            let (metrics, heartbeats) = site.poll().await;
            drop(site);
            // Heartbeats of a tick always precede its siteMetrics.
            for heartbeat in heartbeats {
                self.bus.publish(Event::InverterHeartbeat(heartbeat));
            }
            *self
                .latest_metrics
                .lock()
                .expect("collector state poisoned") = Some(metrics.clone());
            self.bus.publish(Event::SiteMetrics(metrics));
        }
    }

    async fn minutely_loop(&self, shutdown: CancellationToken) {
        loop {
            let delay = Self::next_minutely_delay(Local::now());
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            let report = self.site.lock().await.tick_minutely();
            if let Some(report) = report {
                log::info!("Minutely report {}", report.sequence);
                self.bus.publish(Event::FroniusMinutely(report));
            }
        }
    }

    /// Delay until the next minute boundary plus the report offset.
    fn next_minutely_delay(now: DateTime<Local>) -> Duration {
        let minute = now
            .with_second(0)
            .and_then(|at| at.with_nanosecond(0))
            .unwrap_or(now);
        let target = minute + TimeDelta::seconds(60 + MINUTELY_OFFSET_S);
        (target - now)
            .to_std()
            .unwrap_or(Duration::from_secs(60))
    }

    async fn scan_loop(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.scan_requests.notified() => {}
            }
            self.scanning.store(true, Ordering::Release);
            self.bus.publish(Event::ScanStatus(ScanState::Scanning));
            log::info!("Scan started");

            let scan = discovery::discover(&self.http);
            tokio::pin!(scan);
            let mut republish = tokio::time::interval(SCAN_STATUS_PERIOD);
            republish.tick().await;
            let outcome = loop {
                tokio::select! {
                    outcome = &mut scan => break outcome,
                    _ = republish.tick() => {
                        self.bus.publish(Event::ScanStatus(ScanState::Scanning));
                    }
                }
            };

            match outcome {
                Ok(devices) => {
                    let mut site = self.site.lock().await;
                    site.adopt_discovered(devices);
                    drop(site);
                    *self.last_scan.lock().expect("collector state poisoned") =
                        Some(Local::now());
                }
                Err(error) => log::error!("Scan failed: {error}"),
            }

            self.scanning.store(false, Ordering::Release);
            log::info!("Scan finished");
            self.bus.publish(Event::ScanStatus(ScanState::Idle));
            let snapshot = Arc::new(self.status_snapshot().await);
            *self
                .latest_update
                .lock()
                .expect("collector state poisoned") = Some(snapshot.clone());
            self.bus.publish(Event::SiteUpdate(snapshot));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_minutely_delay_targets_boundary_plus_offset() {
        let now = Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 3).unwrap();
        assert_eq!(Collector::next_minutely_delay(now), Duration::from_secs(62));

        let now = Local.with_ymd_and_hms(2025, 6, 1, 12, 0, 58).unwrap();
        assert_eq!(Collector::next_minutely_delay(now), Duration::from_secs(7));

        // Firing exactly at the offset re-arms for the next minute.
        let now = Local.with_ymd_and_hms(2025, 6, 1, 12, 1, 5).unwrap();
        assert_eq!(Collector::next_minutely_delay(now), Duration::from_secs(60));
    }
}
