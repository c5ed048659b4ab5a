//! Frame-to-frame shift by cross-correlation against a reference frame.
//!
//! The reference is replaced whenever the measured shift against it grows
//! past `re_anchor_px`. Between replacements the tracker reports the change
//! of the shift, so the sum of all reported deltas equals the total travel.

use tracing::{debug, trace};

use crate::config::CorrelationConfig;
use crate::signal::mean;

/// Variance below which a frame is considered featureless.
const MIN_VARIANCE: f64 = 1e-12;

/// Quadratic up-sampling by `factor`.
///
/// Each output sample is evaluated on the parabola through the three input
/// samples centred on its nearest input sample. Output length is
/// `(n - 1) * factor + 1`; input samples are reproduced exactly.
pub fn upsample_quadratic(signal: &[f64], factor: usize) -> Vec<f64> {
    let n = signal.len();
    if n < 3 || factor <= 1 {
        return signal.to_vec();
    }
    let f = factor as f64;
    (0..=(n - 1) * factor)
        .map(|j| {
            let x = j as f64 / f;
            let c = (x.round() as usize).clamp(1, n - 2);
            let t = x - c as f64;
            let (ym, y0, yp) = (signal[c - 1], signal[c], signal[c + 1]);
            y0 + 0.5 * t * (yp - ym) + 0.5 * t * t * (yp - 2.0 * y0 + ym)
        })
        .collect()
}

/// Cross-correlation shift tracker.
#[derive(Debug, Clone)]
pub struct CorrelationTracker {
    factor: usize,
    margin: usize,
    re_anchor_px: f64,
    reference: Option<Vec<f64>>,
    accumulated_shift: f64,
    re_anchors: usize,
    last_re_anchored: bool,
}

impl CorrelationTracker {
    pub fn new(cfg: &CorrelationConfig) -> Self {
        let factor = cfg.upsample.max(1);
        Self {
            factor,
            margin: cfg.margin_px * factor,
            re_anchor_px: cfg.re_anchor_px,
            reference: None,
            accumulated_shift: 0.0,
            re_anchors: 0,
            last_re_anchored: false,
        }
    }

    /// Number of reference replacements so far.
    pub fn re_anchor_count(&self) -> usize {
        self.re_anchors
    }

    /// Whether the last call replaced the reference.
    pub fn last_re_anchored(&self) -> bool {
        self.last_re_anchored
    }

    /// Shift already reported against the current reference (pixels).
    pub fn accumulated_shift(&self) -> f64 {
        self.accumulated_shift
    }

    /// Pixel shift of `window` since the previous call.
    ///
    /// The first call stores the reference and returns `Some(0.0)`. A
    /// featureless frame or one whose length differs from the reference
    /// returns `None` and keeps the reference and accumulated shift.
    pub fn get_dx_px(&mut self, window: &[f64]) -> Option<f64> {
        self.last_re_anchored = false;
        let current = self.prepare(window)?;
        if self.reference.is_none() {
            debug!(len = window.len(), "correlation reference initialized");
            self.reference = Some(current);
            self.accumulated_shift = 0.0;
            return Some(0.0);
        }
        let reference = self.reference.as_deref()?;
        if reference.len() != current.len() || current.len() <= 2 * self.margin {
            return None;
        }

        let raw_shift = self.best_lag(reference, &current) as f64 / self.factor as f64;
        let delta = raw_shift - self.accumulated_shift;
        trace!(raw_shift, delta, "correlation shift");

        self.last_re_anchored = raw_shift.abs() > self.re_anchor_px;
        if self.last_re_anchored {
            self.reference = Some(current);
            self.accumulated_shift = 0.0;
            self.re_anchors += 1;
            debug!(raw_shift, count = self.re_anchors, "correlation reference replaced");
        } else {
            self.accumulated_shift += delta;
        }
        Some(delta)
    }

    /// Up-sampled, mean-subtracted copy; `None` when featureless.
    fn prepare(&self, window: &[f64]) -> Option<Vec<f64>> {
        let mut up = upsample_quadratic(window, self.factor);
        let mu = mean(&up)?;
        up.iter_mut().for_each(|v| *v -= mu);
        let var = up.iter().map(|v| v * v).sum::<f64>() / up.len() as f64;
        (var > MIN_VARIANCE).then_some(up)
    }

    /// Lag (fine samples) maximizing `sum cur[j] * ref[j - lag]` over the
    /// trimmed range of `cur`. Ties go to the most negative lag.
    fn best_lag(&self, reference: &[f64], current: &[f64]) -> isize {
        let m = self.margin as isize;
        let len = current.len() as isize;
        let mut best = (-m, f64::NEG_INFINITY);
        for lag in -m..=m {
            let score: f64 = (m..len - m)
                .map(|j| current[j as usize] * reference[(j - lag) as usize])
                .sum();
            if score > best.1 {
                best = (lag, score);
            }
        }
        best.0
    }
}
