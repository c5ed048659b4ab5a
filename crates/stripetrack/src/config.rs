//! Estimator configuration.
//!
//! Every group deserializes with `#[serde(default)]`, so a JSON file only
//! needs the fields it overrides.

use std::path::Path;

use crate::error::EstimatorError;
use crate::signal::SmoothingKernel;

/// Arcseconds in a full turn.
pub const ARCSEC_PER_TURN: f64 = 1_296_000.0;

/// How raw intensities are mapped into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationPolicy {
    /// Use the calibration bounds `(amin, amax)`.
    FixedBounds,
    /// Use each frame's own min/max.
    PerFrameRange,
}

/// Intensity calibration of the sensor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Raw value mapped to 0.
    pub amin: f64,
    /// Raw value mapped to 1.
    pub amax: f64,
    /// Normalization policy.
    pub normalization: NormalizationPolicy,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            amin: 0.0,
            amax: 3600.0,
            normalization: NormalizationPolicy::FixedBounds,
        }
    }
}

/// Wheel constants needed for unit conversion.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WheelGeometry {
    /// Number of stripes on the wheel.
    pub stripe_count: usize,
    /// Radius at the stripe track, micrometers.
    pub wheel_radius_um: f64,
    /// Width of one dark stripe on the rim, micrometers.
    pub stripe_width_um: f64,
}

impl Default for WheelGeometry {
    fn default() -> Self {
        let stripe_count = 3600usize;
        let period_um = 128.0;
        Self {
            stripe_count,
            wheel_radius_um: period_um * stripe_count as f64 / (2.0 * std::f64::consts::PI),
            stripe_width_um: 0.5 * period_um,
        }
    }
}

impl WheelGeometry {
    /// Angular width of one stripe period (`pasek_as`).
    pub fn period_arcsec(&self) -> f64 {
        ARCSEC_PER_TURN / self.stripe_count as f64
    }

    /// Arcseconds per micrometer of travel along the rim.
    pub fn arcsec_per_um(&self) -> f64 {
        ARCSEC_PER_TURN / (2.0 * std::f64::consts::PI * self.wheel_radius_um)
    }
}

/// Sensor size and the working window used by all trackers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Number of sensor elements per readout.
    pub sensor_pixels: usize,
    /// First pixel of the working window.
    pub begin: usize,
    /// Window length in pixels.
    pub len: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sensor_pixels: 128,
            begin: 15,
            len: 97,
        }
    }
}

impl WindowConfig {
    /// Window bounds `[begin, end)` in sensor pixels.
    pub fn bounds(&self) -> [usize; 2] {
        [self.begin, self.begin + self.len]
    }
}

/// Multi-threshold crossing detection.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CrossingConfig {
    /// Smoothing applied to the normalized window before any scan.
    pub kernels: Vec<SmoothingKernel>,
    /// Threshold sweep, ascending, inside `(0, 1)`.
    pub thresholds: Vec<f64>,
    /// Largest frame-to-frame displacement of one crossing (pixels).
    pub max_match_px: f64,
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self {
            kernels: vec![SmoothingKernel::Binomial { order: 4 }],
            thresholds: crate::crossing::evenly_spaced_thresholds(5, 0.3, 0.7),
            max_match_px: 3.0,
        }
    }
}

/// Longest-flat-fragment segmentation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FragmentParams {
    /// Derivative order used for the flatness test (1 or 2).
    pub derivative_order: usize,
    /// Flatness threshold is `(max - min) / divisor` of the derivative.
    pub divisor: f64,
    /// Samples trimmed from each end before segmentation.
    pub margin: usize,
}

impl Default for FragmentParams {
    fn default() -> Self {
        Self {
            derivative_order: 2,
            divisor: 10.0,
            margin: 4,
        }
    }
}

/// Correlation tracker settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Up-sampling factor applied before correlation.
    pub upsample: usize,
    /// Trimmed margin on each side, in sensor pixels. Bounds the largest
    /// measurable shift.
    pub margin_px: usize,
    /// Shift (pixels) against the reference that triggers a re-anchor.
    pub re_anchor_px: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            upsample: 10,
            margin_px: 5,
            re_anchor_px: 2.0,
        }
    }
}

/// Absolute phase anchor settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// Enable absolute re-anchoring.
    pub enable: bool,
    /// Crossing threshold on the smoothed window.
    pub threshold: f64,
    /// Accepted timing error as a fraction of one period.
    pub tolerance: f64,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            enable: true,
            threshold: 0.5,
            tolerance: 0.2,
        }
    }
}

/// Fusion and outlier-rejection settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Deltas at or above this magnitude (arcsec) are replaced by the last
    /// accepted delta.
    pub sensitivity_threshold_as: f64,
    /// Candidates further than this from the candidate median are dropped (pixels).
    pub candidate_tolerance_px: f64,
    /// Blend weight of an anchor correction; 1 overwrites the estimate.
    pub anchor_weight: f64,
    /// Relative tolerance of measured stripe widths against the sane prior.
    pub stripe_width_tolerance: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            sensitivity_threshold_as: 100.0,
            candidate_tolerance_px: 0.5,
            anchor_weight: 1.0,
            stripe_width_tolerance: 0.8,
        }
    }
}

/// Top-level estimator configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Intensity calibration.
    pub calibration: CalibrationConfig,
    /// Wheel geometry.
    pub geometry: WheelGeometry,
    /// Sensor window.
    pub window: WindowConfig,
    /// Crossing detection.
    pub crossing: CrossingConfig,
    /// Flat-fragment segmentation.
    pub fragment: FragmentParams,
    /// Correlation tracking.
    pub correlation: CorrelationConfig,
    /// Absolute anchor.
    pub anchor: AnchorConfig,
    /// Fusion.
    pub fusion: FusionConfig,
    /// Keep per-frame crossing lists and density profiles in diagnostics.
    pub store_crossings: bool,
}

impl EstimatorConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), EstimatorError> {
        let fail = |msg: String| -> Result<(), EstimatorError> {
            Err(EstimatorError::InvalidConfig(msg))
        };

        let w = &self.window;
        if w.len < 8 {
            return fail(format!("window.len must be >= 8, got {}", w.len));
        }
        if w.begin + w.len > w.sensor_pixels {
            return fail(format!(
                "window [{}, {}) exceeds sensor of {} pixels",
                w.begin,
                w.begin + w.len,
                w.sensor_pixels
            ));
        }

        let g = &self.geometry;
        if g.stripe_count == 0 {
            return fail("geometry.stripe_count must be positive".to_string());
        }
        if !(g.wheel_radius_um > 0.0 && g.stripe_width_um > 0.0) {
            return fail("geometry radius and stripe width must be positive".to_string());
        }

        let c = &self.crossing;
        if c.thresholds.is_empty() {
            return fail("crossing.thresholds must not be empty".to_string());
        }
        if c.thresholds.iter().any(|t| !(*t > 0.0 && *t < 1.0)) {
            return fail("crossing.thresholds must lie in (0, 1)".to_string());
        }
        if c.thresholds.windows(2).any(|p| p[1] <= p[0]) {
            return fail("crossing.thresholds must be strictly ascending".to_string());
        }
        if c.max_match_px <= 0.0 {
            return fail("crossing.max_match_px must be positive".to_string());
        }

        let f = &self.fragment;
        if !(1..=2).contains(&f.derivative_order) {
            return fail(format!(
                "fragment.derivative_order must be 1 or 2, got {}",
                f.derivative_order
            ));
        }
        if f.divisor <= 0.0 {
            return fail("fragment.divisor must be positive".to_string());
        }

        let k = &self.correlation;
        if k.upsample == 0 {
            return fail("correlation.upsample must be positive".to_string());
        }
        if k.re_anchor_px <= 0.0 || k.re_anchor_px >= k.margin_px as f64 {
            return fail(format!(
                "correlation.re_anchor_px ({}) must lie in (0, margin_px = {})",
                k.re_anchor_px, k.margin_px
            ));
        }
        if 2 * k.margin_px + 2 > w.len {
            return fail(format!(
                "correlation.margin_px {} too large for window of {} pixels",
                k.margin_px, w.len
            ));
        }

        let a = &self.anchor;
        if !(a.threshold > 0.0 && a.threshold < 1.0) {
            return fail("anchor.threshold must lie in (0, 1)".to_string());
        }
        if !(a.tolerance > 0.0 && a.tolerance < 0.5) {
            return fail("anchor.tolerance must lie in (0, 0.5)".to_string());
        }

        let fu = &self.fusion;
        if fu.sensitivity_threshold_as <= 0.0 || fu.candidate_tolerance_px <= 0.0 {
            return fail("fusion thresholds must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&fu.anchor_weight) {
            return fail("fusion.anchor_weight must lie in [0, 1]".to_string());
        }
        if fu.stripe_width_tolerance <= 0.0 {
            return fail("fusion.stripe_width_tolerance must be positive".to_string());
        }
        Ok(())
    }
}
