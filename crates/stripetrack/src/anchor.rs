//! Absolute phase anchor.
//!
//! Each index of the calibration window remembers the estimate at which a
//! crossing last arrived there. When a crossing of the same direction
//! arrives at the same index again one period later, the wheel has
//! advanced exactly one stripe period since then, and `phase + period` is
//! an absolute reading that does not depend on the incremental trackers.

use tracing::{debug, info};

use crate::config::{AnchorConfig, WindowConfig};
use crate::crossing::{get_crossings, Direction};
use crate::error::EstimatorError;

/// Per-index crossing memory.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySlot {
    Empty,
    Observed {
        direction: Direction,
        /// Estimate when the crossing arrived (arcsec).
        phase_arcsec: f64,
        /// Written during the current update; cleared by the aging pass.
        fresh: bool,
    },
}

/// Absolute reading produced by the anchor.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnchorCorrection {
    /// Mean of all full-period matches of this frame (arcsec).
    pub value_arcsec: f64,
    /// Number of slots that matched.
    pub votes: usize,
}

/// Result of one anchor update.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnchorOutcome {
    /// Crossings that counted as arrivals.
    pub arrivals: usize,
    /// Slots seeded, replaced or refreshed.
    pub written: usize,
    pub correction: Option<AnchorCorrection>,
}

#[derive(Debug, Clone)]
struct PreviousFrame {
    crossings: Vec<(usize, Direction)>,
    estimate_arcsec: f64,
}

/// Per-index history over the calibration window.
#[derive(Debug, Clone)]
pub struct AbsolutePhaseAnchor {
    slots: Vec<HistorySlot>,
    period_arcsec: f64,
    threshold: f64,
    tolerance: f64,
    window: [usize; 2],
    previous: Option<PreviousFrame>,
}

impl AbsolutePhaseAnchor {
    pub fn new(cfg: &AnchorConfig, window: &WindowConfig, period_arcsec: f64) -> Self {
        Self {
            slots: vec![HistorySlot::Empty; window.len],
            period_arcsec,
            threshold: cfg.threshold,
            tolerance: cfg.tolerance,
            window: window.bounds(),
            previous: None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.previous.is_some()
    }

    pub fn slots(&self) -> &[HistorySlot] {
        &self.slots
    }

    /// Scan the first frame.
    ///
    /// Records its crossings as the baseline for arrival detection without
    /// seeding any slot. Returns the number of crossings found.
    pub fn calibrate(&mut self, window: &[f64], estimate_arcsec: f64) -> Result<usize, EstimatorError> {
        let crossings = get_crossings(window, self.threshold);
        if crossings.is_empty() {
            return Err(EstimatorError::NoCalibrationCrossing {
                threshold: self.threshold,
                window: self.window,
            });
        }
        info!(
            crossings = crossings.len(),
            threshold = self.threshold,
            "anchor calibrated"
        );
        self.previous = Some(PreviousFrame {
            crossings: crossings.iter().map(|c| (c.index, c.direction)).collect(),
            estimate_arcsec,
        });
        Ok(crossings.len())
    }

    /// Detect full-period returns in `window` and age the history.
    pub fn update(&mut self, window: &[f64], current: f64) -> AnchorOutcome {
        let crossings = get_crossings(window, self.threshold);
        let tol = self.tolerance * self.period_arcsec;
        let period = self.period_arcsec;

        let stationary_prev = self
            .previous
            .as_ref()
            .filter(|p| (current - p.estimate_arcsec).abs() < tol);

        let mut outcome = AnchorOutcome::default();
        let mut touched = Vec::new();
        let mut pending = Vec::new();

        // Detect.
        for c in &crossings {
            if stationary_prev.is_some_and(|p| p.crossings.contains(&(c.index, c.direction))) {
                continue;
            }
            outcome.arrivals += 1;
            let Some(slot) = self.slots.get_mut(c.index) else {
                continue;
            };
            let observed = HistorySlot::Observed {
                direction: c.direction,
                phase_arcsec: current,
                fresh: true,
            };
            let write = match *slot {
                HistorySlot::Empty | HistorySlot::Observed { fresh: true, .. } => true,
                HistorySlot::Observed {
                    direction,
                    phase_arcsec,
                    ..
                } if direction == c.direction => {
                    if (phase_arcsec + period - current).abs() < tol {
                        pending.push(phase_arcsec + period);
                        true
                    } else if (phase_arcsec - period - current).abs() < tol {
                        pending.push(phase_arcsec - period);
                        true
                    } else {
                        // Stale once the wheel moved past one period without a match.
                        (current - phase_arcsec).abs() > period + tol
                    }
                }
                HistorySlot::Observed { .. } => false,
            };
            if write {
                *slot = observed;
                touched.push(c.index);
                outcome.written += 1;
            }
        }

        // Age.
        for &i in &touched {
            if let HistorySlot::Observed { fresh, .. } = &mut self.slots[i] {
                *fresh = false;
            }
        }

        self.previous = Some(PreviousFrame {
            crossings: crossings.iter().map(|c| (c.index, c.direction)).collect(),
            estimate_arcsec: current,
        });

        if !pending.is_empty() {
            let value = pending.iter().sum::<f64>() / pending.len() as f64;
            info!(
                value_arcsec = value,
                estimate_arcsec = current,
                votes = pending.len(),
                "anchor correction"
            );
            outcome.correction = Some(AnchorCorrection {
                value_arcsec: value,
                votes: pending.len(),
            });
        } else if outcome.arrivals > 0 {
            debug!(arrivals = outcome.arrivals, written = outcome.written, "anchor history updated");
        }
        outcome
    }
}
