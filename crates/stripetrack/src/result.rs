//! Per-frame diagnostics and whole-run tracking results.

use crate::anchor::AnchorOutcome;
use crate::crossing::{CrossingEvent, StripeWidth};
use crate::fragment::{Fragment, LineFit};
use crate::fusion::DeltaOutcome;
use crate::motion::{FusedShift, MotionCandidate};

/// Everything the estimator observed while processing one frame.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FrameDiagnostics {
    /// Zero-based frame counter.
    pub frame_index: usize,
    /// Crossings over all thresholds of the sweep.
    pub n_crossings: usize,
    /// Crossing list, only with `store_crossings`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossings: Option<Vec<CrossingEvent>>,
    /// Crossings per window index, only with `store_crossings`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crossing_density: Option<Vec<u32>>,
    /// Longest flat fragment of the smoothed window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<Fragment>,
    /// Line fitted over the fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_fit: Option<LineFit>,
    /// Stripe width used for unit conversion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_width: Option<StripeWidth>,
    pub candidates: Vec<MotionCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fused: Option<FusedShift>,
    /// Converted delta offered to the fusion engine (arcsec).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_arcsec: Option<f64>,
    pub delta: DeltaOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<AnchorOutcome>,
    /// The correlation tracker replaced its reference this frame.
    pub correlation_re_anchored: bool,
}

/// Estimate after one frame together with its diagnostics.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FrameReport {
    pub estimate_arcsec: f64,
    pub diagnostics: FrameDiagnostics,
}

/// Estimate error against ground-truth angles.
///
/// Both series are taken relative to their first sample, since the
/// estimator starts at zero.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorSummary {
    pub n: usize,
    pub mean_abs_arcsec: f64,
    pub rms_arcsec: f64,
    pub max_abs_arcsec: f64,
    pub final_error_arcsec: f64,
}

impl ErrorSummary {
    /// Compare estimates with ground truth over their common prefix.
    pub fn from_series(estimates: &[f64], truth_arcsec: &[f64]) -> Option<Self> {
        let n = estimates.len().min(truth_arcsec.len());
        if n == 0 {
            return None;
        }
        let t0 = truth_arcsec[0];
        let errors: Vec<f64> = estimates[..n]
            .iter()
            .zip(&truth_arcsec[..n])
            .map(|(e, t)| e - (t - t0))
            .collect();
        let nf = n as f64;
        Some(Self {
            n,
            mean_abs_arcsec: errors.iter().map(|e| e.abs()).sum::<f64>() / nf,
            rms_arcsec: (errors.iter().map(|e| e * e).sum::<f64>() / nf).sqrt(),
            max_abs_arcsec: errors.iter().fold(0.0, |m, e| m.max(e.abs())),
            final_error_arcsec: errors[n - 1],
        })
    }
}

/// Result of tracking a whole frame sequence.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TrackingResult {
    pub frames: Vec<FrameReport>,
    pub final_estimate_arcsec: f64,
    /// Frames whose delta was replaced by the previous accepted delta.
    pub substituted_deltas: usize,
    /// Frames where the absolute anchor corrected the estimate.
    pub anchor_corrections: usize,
    /// Correlation reference replacements.
    pub correlation_re_anchors: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
}

impl TrackingResult {
    /// Summarize processed frames; `truth_arcsec` enables the error summary.
    pub fn from_reports(frames: Vec<FrameReport>, truth_arcsec: Option<&[f64]>) -> Self {
        let estimates: Vec<f64> = frames.iter().map(|f| f.estimate_arcsec).collect();
        Self {
            final_estimate_arcsec: estimates.last().copied().unwrap_or(0.0),
            substituted_deltas: frames
                .iter()
                .filter(|f| matches!(f.diagnostics.delta, DeltaOutcome::Substituted { .. }))
                .count(),
            anchor_corrections: frames
                .iter()
                .filter(|f| {
                    f.diagnostics
                        .anchor
                        .is_some_and(|a| a.correction.is_some())
                })
                .count(),
            correlation_re_anchors: frames
                .iter()
                .filter(|f| f.diagnostics.correlation_re_anchored)
                .count(),
            error: truth_arcsec.and_then(|t| ErrorSummary::from_series(&estimates, t)),
            frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn error_summary_is_relative_to_first_truth_sample() {
        let est = [0.0, 10.0, 21.0, 29.0];
        let truth = [100.0, 110.0, 120.0, 130.0];
        let s = ErrorSummary::from_series(&est, &truth).unwrap();
        assert_eq!(s.n, 4);
        assert_abs_diff_eq!(s.mean_abs_arcsec, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(s.max_abs_arcsec, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.final_error_arcsec, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.rms_arcsec, (0.5f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn error_summary_uses_common_prefix() {
        let s = ErrorSummary::from_series(&[0.0, 1.0, 2.0], &[5.0, 6.0]).unwrap();
        assert_eq!(s.n, 2);
        assert!(ErrorSummary::from_series(&[], &[1.0]).is_none());
    }
}
