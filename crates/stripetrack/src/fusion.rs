//! Running angle estimate, unit conversion and stripe-width tracking.

use tracing::warn;

use crate::config::{FusionConfig, WheelGeometry};
use crate::crossing::{crossing_positions, estimate_stripe_width_px, StripeWidth, WidthSource};
use crate::fragment::Fragment;
use crate::signal::median_in_place;

/// What [`FusionEngine::apply_delta`] did with a delta.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeltaOutcome {
    /// First frame: estimate set to zero.
    Initialized,
    /// No delta available this frame.
    Skipped,
    /// Delta added to the estimate.
    Accepted { delta_arcsec: f64 },
    /// Outlier replaced by the last accepted delta.
    Substituted { rejected_arcsec: f64, applied_arcsec: f64 },
}

impl DeltaOutcome {
    /// Delta actually added to the estimate.
    pub fn applied_arcsec(&self) -> f64 {
        match *self {
            Self::Accepted { delta_arcsec } => delta_arcsec,
            Self::Substituted { applied_arcsec, .. } => applied_arcsec,
            Self::Initialized | Self::Skipped => 0.0,
        }
    }
}

/// Accumulates incremental deltas and absolute corrections.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    estimate: Option<f64>,
    sensitivity_threshold_as: f64,
    last_accepted: f64,
    anchor_weight: f64,
}

impl FusionEngine {
    pub fn new(cfg: &FusionConfig) -> Self {
        Self {
            estimate: None,
            sensitivity_threshold_as: cfg.sensitivity_threshold_as,
            last_accepted: 0.0,
            anchor_weight: cfg.anchor_weight,
        }
    }

    /// Current estimate in arcseconds (zero before the first frame).
    pub fn estimate(&self) -> f64 {
        self.estimate.unwrap_or(0.0)
    }

    pub fn is_initialized(&self) -> bool {
        self.estimate.is_some()
    }

    pub fn last_accepted_delta(&self) -> f64 {
        self.last_accepted
    }

    /// Add one frame's delta (arcsec).
    ///
    /// Deltas at or above the sensitivity threshold are treated as outliers
    /// and replaced by the last accepted delta, which keeps the estimate
    /// moving at the recent rate.
    pub fn apply_delta(&mut self, delta: Option<f64>) -> DeltaOutcome {
        let Some(estimate) = self.estimate else {
            self.estimate = Some(0.0);
            return DeltaOutcome::Initialized;
        };
        let Some(delta) = delta.filter(|d| d.is_finite()) else {
            return DeltaOutcome::Skipped;
        };
        if delta.abs() < self.sensitivity_threshold_as {
            self.estimate = Some(estimate + delta);
            self.last_accepted = delta;
            DeltaOutcome::Accepted {
                delta_arcsec: delta,
            }
        } else {
            warn!(
                rejected_arcsec = delta,
                applied_arcsec = self.last_accepted,
                "outlier delta substituted"
            );
            self.estimate = Some(estimate + self.last_accepted);
            DeltaOutcome::Substituted {
                rejected_arcsec: delta,
                applied_arcsec: self.last_accepted,
            }
        }
    }

    /// Blend an absolute reading into the estimate; returns the new estimate.
    pub fn apply_anchor_correction(&mut self, value_arcsec: f64) -> f64 {
        let w = self.anchor_weight;
        let next = match self.estimate {
            Some(e) => (1.0 - w) * e + w * value_arcsec,
            None => value_arcsec,
        };
        self.estimate = Some(next);
        next
    }
}

/// Convert a pixel shift to arcseconds of wheel rotation.
pub fn px_to_arcsec(dx_px: f64, stripe_width_px: f64, geometry: &WheelGeometry) -> f64 {
    let um_per_px = geometry.stripe_width_um / stripe_width_px;
    um_per_px * dx_px * geometry.arcsec_per_um()
}

/// Per-frame stripe width with a sanity prior carried across frames.
///
/// The prior is the previous frame's width. Before any width is known the
/// unfiltered median of the frame's crossing widths bootstraps it, and the
/// longest flat fragment stands in when no crossing pair exists at all.
#[derive(Debug, Clone)]
pub struct StripeWidthTracker {
    tolerance: f64,
    last: Option<f64>,
}

impl StripeWidthTracker {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            last: None,
        }
    }

    pub fn last_width_px(&self) -> Option<f64> {
        self.last
    }

    /// Measure the stripe width of `window`. `None` until some prior exists.
    pub fn update(
        &mut self,
        window: &[f64],
        thresholds: &[f64],
        fragment: Option<Fragment>,
    ) -> Option<StripeWidth> {
        let prior = self
            .last
            .or_else(|| bootstrap_width(window, thresholds))
            .or_else(|| fragment.filter(|f| !f.is_empty()).map(|f| f.len() as f64))?;
        let width = estimate_stripe_width_px(window, thresholds, prior, self.tolerance);
        if width.source == WidthSource::Sane {
            warn!(prior_px = prior, "no sane stripe width sample; using prior");
        }
        self.last = Some(width.px);
        Some(width)
    }
}

fn bootstrap_width(window: &[f64], thresholds: &[f64]) -> Option<f64> {
    let mut samples: Vec<f64> = crossing_positions(window, thresholds)
        .iter()
        .flat_map(|row| row.windows(2).map(|w| w[1].0 - w[0].0))
        .collect();
    median_in_place(&mut samples)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::test_utils::stripe_profile;

    fn engine() -> FusionEngine {
        FusionEngine::new(&FusionConfig::default())
    }

    #[test]
    fn first_delta_initializes_to_zero() {
        let mut f = engine();
        assert!(!f.is_initialized());
        assert_eq!(f.apply_delta(Some(42.0)), DeltaOutcome::Initialized);
        assert_eq!(f.estimate(), 0.0);
        assert_eq!(f.apply_delta(None), DeltaOutcome::Skipped);
        assert_eq!(f.estimate(), 0.0);
    }

    #[test]
    fn outlier_is_replaced_by_last_accepted_delta() {
        let mut f = engine();
        f.apply_delta(None);
        assert_eq!(
            f.apply_delta(Some(2.5)),
            DeltaOutcome::Accepted { delta_arcsec: 2.5 }
        );
        let out = f.apply_delta(Some(250.0));
        assert_eq!(
            out,
            DeltaOutcome::Substituted {
                rejected_arcsec: 250.0,
                applied_arcsec: 2.5
            }
        );
        assert_eq!(out.applied_arcsec(), 2.5);
        assert_abs_diff_eq!(f.estimate(), 5.0, epsilon = 1e-12);
        // The substitute does not become the new reference delta.
        f.apply_delta(Some(-300.0));
        assert_abs_diff_eq!(f.estimate(), 7.5, epsilon = 1e-12);
        assert_eq!(f.last_accepted_delta(), 2.5);
    }

    #[test]
    fn threshold_is_exclusive() {
        let mut f = engine();
        f.apply_delta(None);
        assert!(matches!(
            f.apply_delta(Some(100.0)),
            DeltaOutcome::Substituted { .. }
        ));
        assert!(matches!(
            f.apply_delta(Some(-99.9)),
            DeltaOutcome::Accepted { .. }
        ));
    }

    #[test]
    fn anchor_overwrites_by_default_and_blends_with_weight() {
        let mut f = engine();
        f.apply_delta(None);
        f.apply_delta(Some(10.0));
        assert_eq!(f.apply_anchor_correction(360.0), 360.0);

        let mut cfg = FusionConfig::default();
        cfg.anchor_weight = 0.9;
        let mut f = FusionEngine::new(&cfg);
        f.apply_delta(None);
        f.apply_delta(Some(50.0));
        assert_abs_diff_eq!(f.apply_anchor_correction(40.0), 41.0, epsilon = 1e-12);
    }

    #[test]
    fn unit_conversion_matches_closed_form() {
        let g = WheelGeometry::default();
        // 12 px per 64 um stripe, 128 um per 360 arcsec: 15 arcsec per px.
        assert_abs_diff_eq!(px_to_arcsec(1.0, 12.0, &g), 15.0, epsilon = 1e-9);
        assert_abs_diff_eq!(px_to_arcsec(-0.4, 12.0, &g), -6.0, epsilon = 1e-9);

        let g = WheelGeometry {
            stripe_count: 100,
            wheel_radius_um: 50_000.0,
            stripe_width_um: 200.0,
        };
        let expected = (200.0 / 8.0) * 3.0 * 1_296_000.0 / (2.0 * std::f64::consts::PI * 50_000.0);
        assert_abs_diff_eq!(px_to_arcsec(3.0, 8.0, &g), expected, epsilon = 1e-9);
    }

    #[test]
    fn width_tracker_bootstraps_then_filters() {
        let thresholds = [0.3, 0.4, 0.5, 0.6, 0.7];
        let mut t = StripeWidthTracker::new(0.8);
        let w = t
            .update(&stripe_profile(97, 24.0, 2.3, 1.5), &thresholds, None)
            .unwrap();
        assert_eq!(w.source, WidthSource::Measured);
        assert_abs_diff_eq!(w.px, 12.0, epsilon = 0.5);

        // A flat frame keeps the previous width.
        let w = t.update(&[0.5; 97], &thresholds, None).unwrap();
        assert_eq!(w.source, WidthSource::Sane);
        assert_abs_diff_eq!(w.px, t.last_width_px().unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn width_tracker_falls_back_to_fragment_length() {
        let mut t = StripeWidthTracker::new(0.8);
        assert!(t.update(&[0.5; 40], &[0.5], None).is_none());
        let w = t
            .update(&[0.5; 40], &[0.5], Some(Fragment { begin: 4, end: 14 }))
            .unwrap();
        assert_eq!(w.source, WidthSource::Sane);
        assert_eq!(w.px, 10.0);
    }
}
