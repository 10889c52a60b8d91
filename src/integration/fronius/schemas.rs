//! Parsed shapes of the Solar API responses the collector consumes.

use serde::Serialize;
use strum_macros::Display;

/// One `GetPowerFlowRealtimeData.fcgi` reading, powers in watts as reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerFlow {
    pub p_pv: Option<f64>,
    pub p_grid: Option<f64>,
    pub p_akku: Option<f64>,
    pub p_load: Option<f64>,
    /// State of charge of the first inverter's battery, percent.
    pub soc: Option<f64>,
    /// `DeviceStatus.StatusCode` of the first inverter, when reported.
    pub status_code: Option<u32>,
}

/// Static inverter capabilities from `GetInverterInfo.cgi`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    /// Model resolved from the `DT` device-type field.
    pub model: String,
    /// PV-array nameplate watts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pv_power_w: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_name: Option<String>,
}

/// Battery capability record from `GetStorageRealtimeData.cgi`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Nameplate capacity in watt-hours.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_wh: Option<f64>,
    pub enabled: bool,
}

/// Grid-meter capability record from `GetMeterRealtimeData.cgi`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    pub location: MeterLocation,
    pub enabled: bool,
}

/// Classification of the `Meter_Location_Current` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MeterLocation {
    #[strum(serialize = "grid")]
    Grid,
    #[strum(serialize = "load")]
    Load,
    #[strum(serialize = "external generator")]
    ExternalGenerator,
    #[strum(serialize = "subload")]
    Subload,
    #[strum(serialize = "EV charger")]
    EvCharger,
    #[strum(serialize = "storage")]
    Storage,
    #[default]
    #[strum(serialize = "unknown")]
    Unknown,
}

impl MeterLocation {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => MeterLocation::Grid,
            1 => MeterLocation::Load,
            3 => MeterLocation::ExternalGenerator,
            256..=511 => MeterLocation::Subload,
            512..=768 => MeterLocation::EvCharger,
            769..=1023 => MeterLocation::Storage,
            _ => MeterLocation::Unknown,
        }
    }
}

/// Resolves the `DT` device-type code to a model name.
pub fn model_from_device_type(dt: Option<i64>) -> String {
    match dt {
        Some(1) => "Gen24".to_string(),
        Some(other) => format!("DT {other}"),
        None => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, MeterLocation::Grid)]
    #[case(1, MeterLocation::Load)]
    #[case(3, MeterLocation::ExternalGenerator)]
    #[case(256, MeterLocation::Subload)]
    #[case(511, MeterLocation::Subload)]
    #[case(512, MeterLocation::EvCharger)]
    #[case(768, MeterLocation::EvCharger)]
    #[case(769, MeterLocation::Storage)]
    #[case(1023, MeterLocation::Storage)]
    #[case(2, MeterLocation::Unknown)]
    #[case(4096, MeterLocation::Unknown)]
    fn test_meter_location_from_code(#[case] code: i64, #[case] expected: MeterLocation) {
        assert_eq!(MeterLocation::from_code(code), expected);
    }

    #[test]
    fn test_model_from_device_type() {
        assert_eq!(model_from_device_type(Some(1)), "Gen24");
        assert_eq!(model_from_device_type(Some(99)), "DT 99");
        assert_eq!(model_from_device_type(None), "Unknown");
    }
}
