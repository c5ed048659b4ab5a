//! Per-frame orchestration of the estimation pipeline.

use tracing::{debug, warn};

use crate::anchor::AbsolutePhaseAnchor;
use crate::config::EstimatorConfig;
use crate::correlation::CorrelationTracker;
use crate::crossing::{crossing_density_profile, get_multi_threshold_crossings};
use crate::error::EstimatorError;
use crate::fragment::{fit_fragment_line, get_longest_flat_fragment};
use crate::fusion::{px_to_arcsec, DeltaOutcome, FusionEngine, StripeWidthTracker};
use crate::motion::{
    fuse_candidates, CandidateSource, EdgeShiftTracker, MotionCandidate, ThresholdShiftTracker,
};
use crate::result::{FrameDiagnostics, FrameReport};
use crate::signal::{normalize_with, smooth_chain};

/// Supplies readouts, one per call, until exhausted.
pub trait FrameSource {
    fn get_frame(&mut self) -> Option<Vec<f64>>;
}

impl<I: Iterator<Item = Vec<f64>>> FrameSource for I {
    fn get_frame(&mut self) -> Option<Vec<f64>> {
        self.next()
    }
}

/// Receives the estimate after every frame.
pub trait ReportSink {
    fn report(&mut self, estimate_arcsec: f64, diagnostics: &FrameDiagnostics);
}

impl ReportSink for Vec<FrameReport> {
    fn report(&mut self, estimate_arcsec: f64, diagnostics: &FrameDiagnostics) {
        self.push(FrameReport {
            estimate_arcsec,
            diagnostics: diagnostics.clone(),
        });
    }
}

/// Angle estimator for one sensor.
///
/// Owns every piece of cross-frame state. Frames must be fed in capture
/// order.
#[derive(Debug, Clone)]
pub struct PositionEstimator {
    config: EstimatorConfig,
    fusion: FusionEngine,
    correlation: CorrelationTracker,
    anchor: Option<AbsolutePhaseAnchor>,
    thresholds: ThresholdShiftTracker,
    edge: EdgeShiftTracker,
    width: StripeWidthTracker,
    frames: usize,
}

impl PositionEstimator {
    /// Build an estimator; fails on an inconsistent configuration.
    pub fn new(config: EstimatorConfig) -> Result<Self, EstimatorError> {
        config.validate()?;
        let anchor = config.anchor.enable.then(|| {
            AbsolutePhaseAnchor::new(
                &config.anchor,
                &config.window,
                config.geometry.period_arcsec(),
            )
        });
        Ok(Self {
            fusion: FusionEngine::new(&config.fusion),
            correlation: CorrelationTracker::new(&config.correlation),
            anchor,
            thresholds: ThresholdShiftTracker::new(
                &config.crossing.thresholds,
                config.crossing.max_match_px,
            ),
            edge: EdgeShiftTracker::new(config.crossing.max_match_px),
            width: StripeWidthTracker::new(config.fusion.stripe_width_tolerance),
            frames: 0,
            config,
        })
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Current estimate in arcseconds.
    pub fn estimate_arcsec(&self) -> f64 {
        self.fusion.estimate()
    }

    pub fn frames_processed(&self) -> usize {
        self.frames
    }

    /// Process one readout.
    ///
    /// A rejected readout leaves the estimator untouched. On the first
    /// frame a missing anchor crossing is fatal.
    pub fn process(&mut self, readout: &[f64]) -> Result<FrameReport, EstimatorError> {
        let window = self.condition(readout)?;
        let first = self.frames == 0;

        if first {
            if let Some(anchor) = self.anchor.as_mut() {
                anchor.calibrate(&window, 0.0)?;
            }
        }

        let levels = &self.config.crossing.thresholds;
        let events = get_multi_threshold_crossings(&window, levels);
        let fragment = get_longest_flat_fragment(&window, &self.config.fragment);
        let line_fit = fragment.and_then(|f| fit_fragment_line(&window, f));
        let stripe_width = self.width.update(&window, levels, fragment);

        let mut candidates = self.thresholds.update(&window);
        let correlation_dx = self.correlation.get_dx_px(&window);
        let edge_candidate = self.edge.update(&window);
        if !first {
            if let Some(dx_px) = correlation_dx {
                candidates.push(MotionCandidate {
                    source: CandidateSource::Correlation,
                    dx_px,
                });
            }
            candidates.extend(edge_candidate);
        }

        let fused = fuse_candidates(&candidates, self.config.fusion.candidate_tolerance_px);
        let delta_arcsec = match (fused, stripe_width) {
            (Some(f), Some(w)) => Some(px_to_arcsec(f.dx_px, w.px, &self.config.geometry)),
            _ => None,
        };
        let delta = self.fusion.apply_delta(delta_arcsec);
        if delta == DeltaOutcome::Skipped {
            warn!(
                frame = self.frames,
                candidates = candidates.len(),
                has_width = stripe_width.is_some(),
                "no usable shift; frame skipped"
            );
        }

        let anchor = match self.anchor.as_mut() {
            Some(anchor) if !first => {
                let outcome = anchor.update(&window, self.fusion.estimate());
                if let Some(c) = outcome.correction {
                    self.fusion.apply_anchor_correction(c.value_arcsec);
                }
                Some(outcome)
            }
            _ => None,
        };

        let store = self.config.store_crossings;
        let diagnostics = FrameDiagnostics {
            frame_index: self.frames,
            n_crossings: events.len(),
            crossing_density: store.then(|| crossing_density_profile(&events, window.len())),
            crossings: store.then_some(events),
            fragment,
            line_fit,
            stripe_width,
            candidates,
            fused,
            delta_arcsec,
            delta,
            anchor,
            correlation_re_anchored: !first && self.correlation.last_re_anchored(),
        };
        self.frames += 1;

        let estimate_arcsec = self.fusion.estimate();
        debug!(
            frame = diagnostics.frame_index,
            estimate_arcsec,
            dx_px = ?fused.map(|f| f.dx_px),
            width_px = ?stripe_width.map(|w| w.px),
            "frame processed"
        );
        Ok(FrameReport {
            estimate_arcsec,
            diagnostics,
        })
    }

    /// Process one readout and hand the result to `sink`.
    pub fn process_and_report(
        &mut self,
        readout: &[f64],
        sink: &mut dyn ReportSink,
    ) -> Result<f64, EstimatorError> {
        let report = self.process(readout)?;
        sink.report(report.estimate_arcsec, &report.diagnostics);
        Ok(report.estimate_arcsec)
    }

    /// Drain `source` into `sink`; returns the number of frames processed.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn ReportSink,
    ) -> Result<usize, EstimatorError> {
        let mut n = 0;
        while let Some(frame) = source.get_frame() {
            self.process_and_report(&frame, sink)?;
            n += 1;
        }
        Ok(n)
    }

    /// Validate, normalize, cut the working window and smooth it.
    fn condition(&self, readout: &[f64]) -> Result<Vec<f64>, EstimatorError> {
        let w = &self.config.window;
        if readout.len() != w.sensor_pixels {
            return Err(EstimatorError::ReadoutLength {
                expected: w.sensor_pixels,
                got: readout.len(),
            });
        }
        if let Some(index) = readout.iter().position(|v| !v.is_finite()) {
            return Err(EstimatorError::NonFiniteSample { index });
        }
        let normalized = normalize_with(readout, &self.config.calibration);
        let [begin, end] = w.bounds();
        Ok(smooth_chain(
            &normalized[begin..end],
            &self.config.crossing.kernels,
        ))
    }
}
