//! Fronius Solar API client.
//! One instance per device; all requests go to `http://<ip>/solar_api/…`.

use super::schemas::{DeviceInfo, MeterInfo, MeterLocation, PowerFlow, StorageInfo, model_from_device_type};
use super::{Error, Result};
use reqwest::Url;
use serde_json::Value;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Timeout for the 2-second-cadence power-flow poll.
pub const POWER_FLOW_TIMEOUT: Duration = Duration::from_secs(3);
/// Timeout for the discovery-time probes (API version, capabilities).
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Client {
    http: reqwest::Client,
    base_url: Url,
}

impl Client {
    /// Creates a new instance of `Client` for the given base URL, sharing
    /// the process-wide connection pool.
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Client { http, base_url }
    }

    /// Client for the device at `ip`; every Gen24 serves on plain port 80.
    pub fn for_device(http: reqwest::Client, ip: Ipv4Addr) -> Self {
        let base_url =
            Url::parse(&format!("http://{ip}/")).expect("cannot build device base URL");
        Self::new(http, base_url)
    }

    /// Checks whether the host speaks the Solar API.
    ///
    /// Returns `Ok(false)` when the host answered with something that is not
    /// a Solar API version document; transport failures are errors.
    pub async fn probe_api_version(&self) -> Result<bool> {
        let text = self
            .request_text("solar_api/GetAPIVersion.cgi", PROBE_TIMEOUT)
            .await?;
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            return Ok(false);
        };
        Ok(Self::is_api_version_document(&value))
    }

    /// Fetches one instantaneous power-flow reading.
    pub async fn get_power_flow(&self) -> Result<PowerFlow> {
        let value = self
            .request_json("solar_api/v1/GetPowerFlowRealtimeData.fcgi", POWER_FLOW_TIMEOUT)
            .await?;
        Self::extract_power_flow(&value)
    }

    /// Fetches static inverter capabilities. Discovery-time only.
    pub async fn get_inverter_info(&self) -> Result<DeviceInfo> {
        let value = self
            .request_json("solar_api/v1/GetInverterInfo.cgi", PROBE_TIMEOUT)
            .await?;
        Self::extract_device_info(&value)
    }

    /// Fetches the battery capability record, `None` when the device has no
    /// storage. Discovery-time only.
    pub async fn get_storage(&self) -> Result<Option<StorageInfo>> {
        let value = self
            .request_json("solar_api/v1/GetStorageRealtimeData.cgi", PROBE_TIMEOUT)
            .await?;
        Ok(Self::extract_storage(&value))
    }

    /// Fetches the grid-meter capability record, `None` when no meter is
    /// attached. Discovery-time only.
    pub async fn get_meter(&self) -> Result<Option<MeterInfo>> {
        let value = self
            .request_json(
                "solar_api/v1/GetMeterRealtimeData.cgi?Scope=System",
                PROBE_TIMEOUT,
            )
            .await?;
        Ok(Self::extract_meter(&value))
    }

    async fn request_text(&self, path: &str, timeout: Duration) -> Result<String> {
        let url = self
            .base_url
            .join(path)
            .expect("cannot build solar api URL");
        log::debug!("GET {url}");
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        log::debug!("Response: {text}");
        Ok(text)
    }

    async fn request_json(&self, path: &str, timeout: Duration) -> Result<Value> {
        let text = self.request_text(path, timeout).await?;
        serde_json::from_str(&text).map_err(Error::ResponseJsonError)
    }

    /// A Solar API version document carries at least one of these keys.
    fn is_api_version_document(value: &Value) -> bool {
        value.get("APIVersion").is_some()
            || value.get("BaseURL").is_some()
            || value.get("Body").is_some()
    }

    /// Extracts the site power flow plus the first inverter's SOC and status.
    fn extract_power_flow(value: &Value) -> Result<PowerFlow> {
        let site = value
            .pointer("/Body/Data/Site")
            .ok_or_else(|| Error::ValueParseError("Missing Body.Data.Site".to_string()))?;
        let first_inverter = value
            .pointer("/Body/Data/Inverters")
            .and_then(Self::first_entry);
        Ok(PowerFlow {
            p_pv: site.get("P_PV").and_then(Value::as_f64),
            p_grid: site.get("P_Grid").and_then(Value::as_f64),
            p_akku: site.get("P_Akku").and_then(Value::as_f64),
            p_load: site.get("P_Load").and_then(Value::as_f64),
            soc: first_inverter
                .and_then(|inverter| inverter.get("SOC"))
                .and_then(Value::as_f64),
            status_code: first_inverter
                .and_then(|inverter| inverter.pointer("/DeviceStatus/StatusCode"))
                .and_then(Value::as_u64)
                .map(|code| code as u32),
        })
    }

    fn extract_device_info(value: &Value) -> Result<DeviceInfo> {
        let entry = value
            .pointer("/Body/Data")
            .and_then(Self::first_entry)
            .ok_or_else(|| Error::ValueParseError("Missing Body.Data inverter entry".to_string()))?;
        let dt = entry.get("DT").and_then(Value::as_i64);
        Ok(DeviceInfo {
            unique_id: Self::string_or_number(entry.get("UniqueID")),
            model: model_from_device_type(dt),
            pv_power_w: entry.get("PVPower").and_then(Value::as_i64),
            custom_name: entry
                .get("CustomName")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        })
    }

    /// The storage controller appears as `Body.Data["0"].Controller` on some
    /// firmware revisions and as `Body.Data.Controller[0]` on others.
    fn extract_storage(value: &Value) -> Option<StorageInfo> {
        let controller = value
            .pointer("/Body/Data/0/Controller")
            .or_else(|| value.pointer("/Body/Data/Controller/0"))?;
        if !controller.is_object() {
            return None;
        }
        let details = controller.get("Details");
        Some(StorageInfo {
            manufacturer: Self::detail(details, "Manufacturer"),
            model: Self::detail(details, "Model"),
            serial: details.and_then(|d| Self::string_or_number(d.get("Serial"))),
            capacity_wh: controller.get("Capacity_Maximum").and_then(Value::as_f64),
            enabled: Self::flag(controller.get("Enable")),
        })
    }

    fn extract_meter(value: &Value) -> Option<MeterInfo> {
        let entry = value.pointer("/Body/Data").and_then(Self::first_entry)?;
        if !entry.is_object() {
            return None;
        }
        let details = entry.get("Details");
        let model = Self::detail(details, "Model");
        // CCS-branded meters misreport the manufacturer field.
        let manufacturer = if model.as_deref().is_some_and(|m| m.starts_with("CCS")) {
            Some("Continental Control Systems".to_string())
        } else {
            Self::detail(details, "Manufacturer")
        };
        let location = entry
            .get("Meter_Location_Current")
            .and_then(Value::as_i64)
            .map(MeterLocation::from_code)
            .unwrap_or_default();
        Some(MeterInfo {
            manufacturer,
            model,
            serial: details.and_then(|d| Self::string_or_number(d.get("Serial"))),
            location,
            enabled: Self::flag(entry.get("Enable")),
        })
    }

    /// First value of an object or array node.
    fn first_entry(value: &Value) -> Option<&Value> {
        match value {
            Value::Object(map) => map.values().next(),
            Value::Array(items) => items.first(),
            _ => None,
        }
    }

    fn detail(details: Option<&Value>, key: &str) -> Option<String> {
        details
            .and_then(|d| d.get(key))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }

    fn string_or_number(value: Option<&Value>) -> Option<String> {
        match value? {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }

    /// Device `Enable` flags arrive as 0/1 numbers or booleans.
    fn flag(value: Option<&Value>) -> bool {
        match value {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0) != 0.0,
            _ => false,
        }
    }
}
