//! Push background service.
//! Mirrors every minutely report to the configured LiveOne endpoint, fed by
//! the event bus so a slow POST can never delay the polling path.

use crate::bus::EventBus;
use crate::core::config::Config;
use crate::integration::liveone::{self, PushConfig, PushOutcome, classify_failure};
use crate::services::events::{Event, PushStatus, PushTestResult};
use crate::site::MinutelyReport;
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Shared, observable push-client state.
pub struct PushState {
    configured: bool,
    enabled: AtomicBool,
    last_push: Mutex<Option<DateTime<Local>>>,
    last_test: Mutex<Option<Arc<PushTestResult>>>,
}

impl PushState {
    fn new(configured: bool, enabled: bool) -> Self {
        PushState {
            configured,
            enabled: AtomicBool::new(enabled),
            last_push: Mutex::new(None),
            last_test: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Latches the client off for the rest of this process.
    fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    fn record_push(&self, at: DateTime<Local>) {
        *self.last_push.lock().expect("push state poisoned") = Some(at);
    }

    fn record_test(&self, result: Arc<PushTestResult>) {
        *self.last_test.lock().expect("push state poisoned") = Some(result);
    }

    pub fn last_test(&self) -> Option<Arc<PushTestResult>> {
        self.last_test.lock().expect("push state poisoned").clone()
    }

    pub fn status(&self) -> PushStatus {
        PushStatus {
            configured: self.configured,
            enabled: self.is_enabled(),
            last_push: self
                .last_push
                .lock()
                .expect("push state poisoned")
                .map(|at| crate::core::timefmt::format_local(&at)),
        }
    }
}

pub struct PushService {
    client: Option<liveone::Client>,
    state: Arc<PushState>,
    bus: Arc<EventBus<Event>>,
}

impl PushService {
    /// Builds the service from the raw `LIVEONE_*` trio.
    ///
    /// Unset trio: silently absent. Invalid: configuration errors are
    /// logged once and the client stays disabled. Valid but
    /// `enabled=false`: present in status, never posts.
    pub fn new(http: &reqwest::Client, config: &Config, bus: Arc<EventBus<Event>>) -> Self {
        let (client, state) = match PushConfig::from_values(
            config.liveone_api_key.as_deref(),
            config.liveone_server.as_deref(),
            config.liveone_enabled.as_deref(),
        ) {
            None => {
                log::debug!("Push client not configured");
                (None, PushState::new(false, false))
            }
            Some(Err(issues)) => {
                for issue in &issues {
                    log::error!("Push configuration: {issue}");
                }
                log::error!("Push client disabled: invalid configuration");
                (None, PushState::new(true, false))
            }
            Some(Ok(push_config)) if !push_config.enabled => {
                log::info!("Push client configured but disabled");
                (None, PushState::new(true, false))
            }
            Some(Ok(push_config)) => {
                log::info!("Push client enabled, endpoint {}", push_config.endpoint());
                (
                    Some(liveone::Client::new(http.clone(), &push_config)),
                    PushState::new(true, true),
                )
            }
        };
        PushService {
            client,
            state: Arc::new(state),
            bus,
        }
    }

    pub fn state(&self) -> Arc<PushState> {
        self.state.clone()
    }

    /// Self-test once, then forward every minutely report until shutdown.
    pub async fn run(&self, shutdown: CancellationToken) {
        let Some(client) = &self.client else {
            return;
        };
        self.self_test(client).await;
        let mut subscription = self.bus.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = subscription.recv() => match event {
                    Some(Event::FroniusMinutely(report)) => self.push_report(client, &report).await,
                    Some(_) => {}
                    None => break,
                },
            }
        }
    }

    async fn self_test(&self, client: &liveone::Client) {
        let result = match client.test().await {
            Ok(response) if response.success => {
                log::info!(
                    "Push self-test ok{}",
                    response
                        .display_name
                        .as_deref()
                        .map(|name| format!(" ({name})"))
                        .unwrap_or_default()
                );
                PushTestResult {
                    success: true,
                    error: None,
                    message: response.message,
                    display_name: response.display_name,
                    timestamp: Local::now(),
                }
            }
            Ok(response) => {
                log::warn!("Push self-test rejected: {:?}", response.message);
                PushTestResult {
                    success: false,
                    error: Some("rejected".to_string()),
                    message: response.message,
                    display_name: response.display_name,
                    timestamp: Local::now(),
                }
            }
            Err(error) => {
                let class = classify_failure(&error);
                log::warn!("Push self-test failed: {class} ({error})");
                PushTestResult {
                    success: false,
                    error: Some(class),
                    message: None,
                    display_name: None,
                    timestamp: Local::now(),
                }
            }
        };
        let result = Arc::new(result);
        self.state.record_test(result.clone());
        self.bus.publish(Event::PushTest(result));
    }

    async fn push_report(&self, client: &liveone::Client, report: &MinutelyReport) {
        if !self.state.is_enabled() {
            return;
        }
        let value = match serde_json::to_value(report) {
            Ok(value) => value,
            Err(error) => {
                log::error!("Cannot serialize minutely report: {error}");
                return;
            }
        };
        match client.store(&value).await {
            Ok(PushOutcome::Stored(response)) => {
                self.state.record_push(report.timestamp);
                log::info!(
                    "Pushed minutely {}{}",
                    report.sequence,
                    response
                        .display_name
                        .as_deref()
                        .map(|name| format!(" ({name})"))
                        .unwrap_or_default()
                );
            }
            Ok(PushOutcome::Refused(response)) => {
                log::warn!("Push {} refused: {:?}", report.sequence, response.message);
            }
            Ok(PushOutcome::BadRequest) => {
                log::error!("Push {} rejected: HTTP 400", report.sequence);
            }
            Ok(PushOutcome::Unauthorized) => {
                log::error!("Push unauthorized (HTTP 401), disabling for the rest of this run");
                self.state.disable();
            }
            Ok(PushOutcome::NotFound) => {
                log::error!("Push endpoint missing (HTTP 404), disabling for the rest of this run");
                self.state.disable();
            }
            Ok(PushOutcome::Duplicate) => {
                log::info!("Push {} duplicate timestamp (HTTP 409)", report.sequence);
            }
            Ok(PushOutcome::HttpError(code)) => {
                log::warn!("Push {} failed: HTTP {code}", report.sequence);
            }
            Err(error) => {
                log::warn!("Push {} failed: {}", report.sequence, classify_failure(&error));
            }
        }
    }
}
