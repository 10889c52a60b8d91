//! Running energy counters derived by integrating instantaneous power.
//!
//! Counters accumulate in double-precision watt-hours using the trapezoidal
//! rule between consecutive valid samples. Continuity between two samples is
//! only trusted when they are at most [`MAX_SAMPLE_GAP`] apart; anything
//! older is discarded and the new sample starts a fresh series.

use chrono::{DateTime, TimeDelta, Utc};

/// Maximum wall-clock gap between two samples that still integrates.
pub const MAX_SAMPLE_GAP: TimeDelta = TimeDelta::seconds(10);

/// Trapezoidal integral of a power series, in watt-hours.
#[derive(Debug, Clone, Default)]
pub struct EnergyIntegrator {
    total_wh: f64,
    last: Option<(f64, DateTime<Utc>)>,
}

impl EnergyIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample into the integrator.
    ///
    /// A `None` power breaks continuity: the accumulator is left unchanged
    /// and the next valid sample is treated as the first of a new series.
    pub fn update(&mut self, power_w: Option<f64>, at: DateTime<Utc>) {
        let Some(power_w) = power_w else {
            self.last = None;
            return;
        };
        if let Some((prev_power, prev_at)) = self.last {
            let gap = at - prev_at;
            if gap > TimeDelta::zero() && gap <= MAX_SAMPLE_GAP {
                let seconds = gap.num_milliseconds() as f64 / 1000.0;
                self.total_wh += (power_w + prev_power) / 2.0 * seconds / 3600.0;
            }
        }
        self.last = Some((power_w, at));
    }

    /// Accumulated energy in watt-hours.
    pub fn value_wh(&self) -> f64 {
        self.total_wh
    }

    /// Clears the accumulator and the continuity anchor.
    pub fn reset(&mut self) {
        self.total_wh = 0.0;
        self.last = None;
    }
}

/// Pair of integrators splitting positive and negative flow.
///
/// Both sub-accumulators are fed on every valid sample so they share a
/// common timeline: while the sign is steady the opposite side integrates
/// zeros instead of stalling, which keeps a later sign change from pairing
/// against a stale anchor.
#[derive(Debug, Clone, Default)]
pub struct BidirectionalIntegrator {
    positive: EnergyIntegrator,
    negative: EnergyIntegrator,
}

impl BidirectionalIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, power_w: Option<f64>, at: DateTime<Utc>) {
        let Some(power_w) = power_w else {
            self.positive.update(None, at);
            self.negative.update(None, at);
            return;
        };
        if power_w > 0.0 {
            self.positive.update(Some(power_w), at);
            self.negative.update(Some(0.0), at);
        } else if power_w < 0.0 {
            self.negative.update(Some(-power_w), at);
            self.positive.update(Some(0.0), at);
        } else {
            self.positive.update(Some(0.0), at);
            self.negative.update(Some(0.0), at);
        }
    }

    /// Energy accumulated while the signed power was positive, in watt-hours.
    pub fn positive_wh(&self) -> f64 {
        self.positive.value_wh()
    }

    /// Energy accumulated while the signed power was negative, in watt-hours.
    pub fn negative_wh(&self) -> f64 {
        self.negative.value_wh()
    }

    pub fn reset(&mut self) {
        self.positive.reset();
        self.negative.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        t0() + TimeDelta::seconds(seconds)
    }

    #[test]
    fn test_constant_power_integrates_exactly() {
        // P constant over N samples => P * (t_N - t_1) / 3600 Wh.
        let mut integrator = EnergyIntegrator::new();
        let power = 3000.0;
        for k in 0..=30 {
            integrator.update(Some(power), at(k * 2));
        }
        let expected = power * 60.0 / 3600.0;
        assert!((integrator.value_wh() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_first_sample_contributes_nothing() {
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(5000.0), t0());
        assert_eq!(integrator.value_wh(), 0.0);
    }

    #[test]
    fn test_trapezoid_between_two_samples() {
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(1000.0), at(0));
        integrator.update(Some(2000.0), at(2));
        // (1000 + 2000) / 2 * 2s / 3600 = 5/6 Wh
        assert!((integrator.value_wh() - 1500.0 * 2.0 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn test_absent_sample_breaks_continuity() {
        // Two absent samples followed by a valid one produce no step.
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(1000.0), at(0));
        integrator.update(None, at(2));
        integrator.update(None, at(4));
        integrator.update(Some(1000.0), at(6));
        assert_eq!(integrator.value_wh(), 0.0);
        // The valid sample anchors the next trapezoid again.
        integrator.update(Some(1000.0), at(8));
        assert!((integrator.value_wh() - 1000.0 * 2.0 / 3600.0).abs() < 1e-12);
    }

    #[rstest]
    #[case(10, true)]
    #[case(11, false)]
    fn test_gap_ceiling(#[case] gap_s: i64, #[case] integrates: bool) {
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(1000.0), at(0));
        integrator.update(Some(1000.0), at(gap_s));
        if integrates {
            assert!(integrator.value_wh() > 0.0);
        } else {
            assert_eq!(integrator.value_wh(), 0.0);
        }
    }

    #[test]
    fn test_non_increasing_timestamp_is_ignored() {
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(1000.0), at(2));
        integrator.update(Some(1000.0), at(2));
        integrator.update(Some(1000.0), at(0));
        assert_eq!(integrator.value_wh(), 0.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut integrator = EnergyIntegrator::new();
        integrator.update(Some(1000.0), at(0));
        integrator.update(Some(1000.0), at(2));
        assert!(integrator.value_wh() > 0.0);
        integrator.reset();
        assert_eq!(integrator.value_wh(), 0.0);
        integrator.update(Some(1000.0), at(4));
        assert_eq!(integrator.value_wh(), 0.0);
    }

    #[test]
    fn test_bidirectional_splits_by_sign() {
        let mut integrator = BidirectionalIntegrator::new();
        integrator.update(Some(500.0), at(0));
        integrator.update(Some(500.0), at(2));
        integrator.update(Some(-500.0), at(4));
        integrator.update(Some(-500.0), at(6));
        // Positive side: 500 W for 2 s, then ramp 500 -> 0 over the crossing.
        let positive = 500.0 * 2.0 / 3600.0 + 250.0 * 2.0 / 3600.0;
        let negative = 250.0 * 2.0 / 3600.0 + 500.0 * 2.0 / 3600.0;
        assert!((integrator.positive_wh() - positive).abs() < 1e-12);
        assert!((integrator.negative_wh() - negative).abs() < 1e-12);
    }

    #[test]
    fn test_bidirectional_opposite_side_keeps_timeline() {
        // Steady positive flow: the negative side keeps integrating zeros so
        // a later sign change does not pair with a stale anchor.
        let mut integrator = BidirectionalIntegrator::new();
        for k in 0..10 {
            integrator.update(Some(1000.0), at(k * 2));
        }
        integrator.update(Some(-1000.0), at(20));
        // Only the crossing trapezoid (0 -> 1000 over 2 s) lands negative.
        assert!((integrator.negative_wh() - 500.0 * 2.0 / 3600.0).abs() < 1e-12);
    }

    #[test]
    fn test_bidirectional_monotonic_non_decreasing() {
        let mut integrator = BidirectionalIntegrator::new();
        let samples = [300.0, -200.0, 0.0, 450.0, -450.0, 1200.0, 0.0, -5.0];
        let mut prev = (0.0, 0.0);
        for (k, power) in samples.iter().enumerate() {
            integrator.update(Some(*power), at(k as i64 * 2));
            let now = (integrator.positive_wh(), integrator.negative_wh());
            assert!(now.0 >= prev.0);
            assert!(now.1 >= prev.1);
            assert!(now.0 >= 0.0 && now.1 >= 0.0);
            prev = now;
        }
    }

    #[test]
    fn test_bidirectional_absent_breaks_both_sides() {
        let mut integrator = BidirectionalIntegrator::new();
        integrator.update(Some(1000.0), at(0));
        integrator.update(None, at(2));
        integrator.update(Some(1000.0), at(4));
        assert_eq!(integrator.positive_wh(), 0.0);
        assert_eq!(integrator.negative_wh(), 0.0);
    }
}
