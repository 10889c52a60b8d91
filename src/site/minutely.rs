//! The minutely report and the drift-correcting snapshot ledger behind it.

use crate::core::timefmt::serde_local;
use chrono::{DateTime, Local};
use serde::Serialize;

/// Compact energy-delta record emitted once per minute.
///
/// Field names and casing are an external contract; a downstream ingestion
/// service relies on them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinutelyReport {
    #[serde(with = "serde_local")]
    pub timestamp: DateTime<Local>,
    /// `XXXX/N`: per-process session id and a counter starting at 1.
    pub sequence: String,

    pub solar_w: Option<i64>,
    pub solar_interval_wh: i64,
    pub solar_local_w: Option<i64>,
    pub solar_local_interval_wh: i64,
    pub solar_remote_w: Option<i64>,
    pub solar_remote_interval_wh: i64,

    pub load_w: Option<i64>,
    pub load_interval_wh: i64,

    pub battery_w: Option<i64>,
    pub battery_in_interval_wh: i64,
    pub battery_out_interval_wh: i64,

    pub grid_w: Option<i64>,
    pub grid_in_interval_wh: i64,
    pub grid_out_interval_wh: i64,

    #[serde(rename = "batterySOC")]
    pub battery_soc: Option<f64>,

    pub fault_code: Option<String>,
    pub fault_timestamp: Option<String>,
    /// Reserved; always null.
    pub generator_status: Option<serde_json::Value>,

    pub solar_kwh_total: Option<f64>,
    pub load_kwh_total: Option<f64>,
    pub battery_in_kwh_total: Option<f64>,
    pub battery_out_kwh_total: Option<f64>,
    pub grid_in_kwh_total: Option<f64>,
    pub grid_out_kwh_total: Option<f64>,
}

/// Cumulative watt-hour totals at one instant, absent quantities as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CurrentTotals {
    pub solar_wh: f64,
    pub battery_in_wh: f64,
    pub battery_out_wh: f64,
    pub grid_in_wh: f64,
    pub grid_out_wh: f64,
    pub load_wh: f64,
}

/// Integer watt-hour deltas of one reporting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalDeltas {
    pub solar: i64,
    pub battery_in: i64,
    pub battery_out: i64,
    pub grid_in: i64,
    pub grid_out: i64,
    pub load: i64,
    pub solar_local: i64,
    pub solar_remote: i64,
}

/// Last-snapshot ledger backing the minutely deltas.
///
/// The ledger advances by the *rounded* delta instead of being replaced by
/// the raw cumulative, so rounding error cannot accumulate and the sum of
/// reported deltas always equals the reported cumulative exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapshotLedger {
    pub solar_wh: f64,
    pub battery_in_wh: f64,
    pub battery_out_wh: f64,
    pub grid_in_wh: f64,
    pub grid_out_wh: f64,
    pub load_wh: f64,
    pub solar_local_wh: f64,
    pub solar_remote_wh: f64,
}

impl SnapshotLedger {
    /// First snapshot: remember the raw cumulative and report nothing.
    pub fn bootstrap(current: &CurrentTotals) -> Self {
        SnapshotLedger {
            solar_wh: current.solar_wh,
            battery_in_wh: current.battery_in_wh,
            battery_out_wh: current.battery_out_wh,
            grid_in_wh: current.grid_in_wh,
            grid_out_wh: current.grid_out_wh,
            load_wh: current.load_wh,
            solar_local_wh: 0.0,
            solar_remote_wh: 0.0,
        }
    }

    /// Computes the interval deltas against `current` and advances the
    /// ledger by them.
    ///
    /// The solar delta is split between master (`local`) and the remaining
    /// inverters (`remote`) in proportion to their instantaneous power at
    /// report time.
    pub fn advance(
        &mut self,
        current: &CurrentTotals,
        master_w: i64,
        slave_w: i64,
    ) -> IntervalDeltas {
        let solar = (current.solar_wh - self.solar_wh).round() as i64;
        let battery_in = (current.battery_in_wh - self.battery_in_wh).round() as i64;
        let battery_out = (current.battery_out_wh - self.battery_out_wh).round() as i64;
        let grid_in = (current.grid_in_wh - self.grid_in_wh).round() as i64;
        let grid_out = (current.grid_out_wh - self.grid_out_wh).round() as i64;
        let load = (current.load_wh - self.load_wh).round() as i64;

        let (solar_local, solar_remote) = if master_w + slave_w > 0 && solar > 0 {
            let ratio = master_w as f64 / (master_w + slave_w) as f64;
            let local = (solar as f64 * ratio).round() as i64;
            (local, solar - local)
        } else {
            (0, 0)
        };

        self.solar_wh += solar as f64;
        self.battery_in_wh += battery_in as f64;
        self.battery_out_wh += battery_out as f64;
        self.grid_in_wh += grid_in as f64;
        self.grid_out_wh += grid_out as f64;
        self.load_wh += load as f64;
        self.solar_local_wh += solar_local as f64;
        self.solar_remote_wh += solar_remote as f64;

        IntervalDeltas {
            solar,
            battery_in,
            battery_out,
            grid_in,
            grid_out,
            load,
            solar_local,
            solar_remote,
        }
    }
}

/// Rounds a watt-hour total to kWh with watt-hour precision.
pub fn kwh_total(wh: f64) -> f64 {
    wh.round() / 1000.0
}
