//! Dependency injection container for froniusd.

use std::sync::Arc;
use std::time::Duration;

use super::config::Config;
use crate::bus::{self, EventBus};
use crate::services::events::Event;
use crate::services::{Collector, PushService};
use crate::site::Site;

/// Container for application dependencies.
pub struct Container {
    config: Arc<Config>,
    http: reqwest::Client,
    bus: Arc<EventBus<Event>>,
    site: Arc<tokio::sync::Mutex<Site>>,
    collector: Arc<Collector>,
    push_service: Arc<PushService>,
}

impl Container {
    /// Creates a new instance of the dependency injection container.
    pub fn new(config: &Config) -> Self {
        let config = Arc::new(config.clone());

        // One shared connection pool; per-call timeouts differ, so no
        // client-wide timeout is set here.
        let http = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(2)
            .build()
            .expect("Failed to create HTTP client");

        let bus = EventBus::new(bus::DEFAULT_CAPACITY);
        let site = Arc::new(tokio::sync::Mutex::new(Site::new(
            config.site_name.clone(),
            http.clone(),
        )));

        let push_service = Arc::new(PushService::new(&http, &config, bus.clone()));
        let collector = Arc::new(Collector::new(
            site.clone(),
            bus.clone(),
            http.clone(),
            push_service.state(),
        ));

        Self {
            config,
            http,
            bus,
            site,
            collector,
            push_service,
        }
    }

    /// Returns a reference to the application config.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a reference to the collector.
    pub fn collector(&self) -> Arc<Collector> {
        Arc::clone(&self.collector)
    }

    /// Returns a reference to the push service.
    pub fn push_service(&self) -> Arc<PushService> {
        Arc::clone(&self.push_service)
    }

    /// Returns a reference to the site.
    pub fn site(&self) -> Arc<tokio::sync::Mutex<Site>> {
        Arc::clone(&self.site)
    }

    /// Returns the shared HTTP client.
    pub fn http(&self) -> reqwest::Client {
        self.http.clone()
    }

    /// Shutdown the container: close every subscriber queue.
    pub fn shutdown(&self) {
        self.bus.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            app_name: "froniusd".into(),
            app_version: "0.0.0".into(),
            port: 8080,
            site_name: "Test Site".into(),
            liveone_api_key: None,
            liveone_server: None,
            liveone_enabled: None,
        }
    }

    #[tokio::test]
    async fn test_container_init() {
        let config = config();
        let container = Container::new(&config);

        assert_eq!(container.config().site_name, "Test Site");
        assert!(Arc::ptr_eq(&container.collector(), &container.collector()));
        assert!(Arc::ptr_eq(&container.push_service(), &container.push_service()));
        assert!(Arc::ptr_eq(&container.site(), &container.site()));
        assert_eq!(container.site().lock().await.device_count(), 0);

        container.shutdown();
    }
}
