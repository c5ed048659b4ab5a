//! Per-frame pixel-shift candidates and their fusion.
//!
//! Every frame produces up to one candidate per threshold, one from the
//! correlation tracker and one from the steepest edge. Candidates far from
//! their median are dropped and the rest are averaged.

use tracing::trace;

use crate::crossing::{crossing_positions, Direction};
use crate::edge::{sub_pixel_extremum, sub_pixel_extremum_in, ExtremumKind};
use crate::signal::{derivative, median_in_place};

/// Origin of a shift candidate.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateSource {
    /// Mean displacement of matched crossings at one threshold.
    Threshold { threshold: f64 },
    /// Cross-correlation tracker.
    Correlation,
    /// Steepest rising edge of the window.
    SteepestEdge,
}

/// One pixel-shift measurement.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MotionCandidate {
    pub source: CandidateSource,
    pub dx_px: f64,
}

/// Result of [`fuse_candidates`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FusedShift {
    pub dx_px: f64,
    pub used: usize,
    pub rejected: usize,
}

/// Matches sub-pixel crossings between consecutive frames, per threshold.
#[derive(Debug, Clone)]
pub struct ThresholdShiftTracker {
    thresholds: Vec<f64>,
    max_match_px: f64,
    previous: Option<Vec<Vec<(f64, Direction)>>>,
}

impl ThresholdShiftTracker {
    pub fn new(thresholds: &[f64], max_match_px: f64) -> Self {
        Self {
            thresholds: thresholds.to_vec(),
            max_match_px,
            previous: None,
        }
    }

    /// One candidate per threshold with at least one matched crossing.
    ///
    /// A crossing matches the nearest previous crossing of the same
    /// direction within `max_match_px`; crossings entering or leaving the
    /// window stay unmatched.
    pub fn update(&mut self, window: &[f64]) -> Vec<MotionCandidate> {
        let current = crossing_positions(window, &self.thresholds);
        let mut out = Vec::new();
        if let Some(previous) = &self.previous {
            for ((&threshold, cur), prev) in self.thresholds.iter().zip(&current).zip(previous) {
                let shifts: Vec<f64> = cur
                    .iter()
                    .filter_map(|&(p, dir)| {
                        prev.iter()
                            .filter(|(_, d)| *d == dir)
                            .map(|&(q, _)| p - q)
                            .filter(|dx| dx.abs() <= self.max_match_px)
                            .min_by(|a, b| a.abs().total_cmp(&b.abs()))
                    })
                    .collect();
                if shifts.is_empty() {
                    continue;
                }
                let dx_px = shifts.iter().sum::<f64>() / shifts.len() as f64;
                out.push(MotionCandidate {
                    source: CandidateSource::Threshold { threshold },
                    dx_px,
                });
            }
        }
        self.previous = Some(current);
        out
    }
}

/// Follows the steepest rising edge of the window.
///
/// Once locked, the edge is searched only near its previous position so
/// that a neighbouring edge of similar slope cannot steal the lock.
#[derive(Debug, Clone)]
pub struct EdgeShiftTracker {
    max_match_px: f64,
    border_px: f64,
    previous: Option<f64>,
}

impl EdgeShiftTracker {
    pub fn new(max_match_px: f64) -> Self {
        Self {
            max_match_px,
            border_px: 3.0,
            previous: None,
        }
    }

    pub fn position(&self) -> Option<f64> {
        self.previous
    }

    pub fn update(&mut self, window: &[f64]) -> Option<MotionCandidate> {
        let d = derivative(window);
        let n = d.len() as f64;
        let near_border = |x: f64| x < self.border_px || x > n - 1.0 - self.border_px;

        let tracked = self.previous.and_then(|q| {
            let reach = self.max_match_px + 1.0;
            let lo = (q - reach).floor().max(0.0) as usize;
            let hi = ((q + reach).ceil() as usize + 1).min(d.len());
            sub_pixel_extremum_in(&d, ExtremumKind::Max, lo..hi)
                .filter(|x| (x - q).abs() <= self.max_match_px && !near_border(*x))
                .map(|x| (q, x))
        });

        match tracked {
            Some((q, x)) => {
                self.previous = Some(x);
                Some(MotionCandidate {
                    source: CandidateSource::SteepestEdge,
                    dx_px: x - q,
                })
            }
            None => {
                self.previous = sub_pixel_extremum(&d, ExtremumKind::Max).filter(|x| !near_border(*x));
                trace!(position = ?self.previous, "steepest edge re-locked");
                None
            }
        }
    }
}

/// Median-gated mean of the candidates.
///
/// Candidates further than `tolerance_px` from the median are dropped.
/// `None` when there is no candidate.
pub fn fuse_candidates(candidates: &[MotionCandidate], tolerance_px: f64) -> Option<FusedShift> {
    let mut values: Vec<f64> = candidates.iter().map(|c| c.dx_px).collect();
    let median = median_in_place(&mut values)?;
    let kept: Vec<f64> = candidates
        .iter()
        .map(|c| c.dx_px)
        .filter(|dx| (dx - median).abs() <= tolerance_px)
        .collect();
    // An even, split set can leave nothing within tolerance.
    let dx_px = if kept.is_empty() {
        median
    } else {
        kept.iter().sum::<f64>() / kept.len() as f64
    };
    for c in candidates {
        trace!(source = ?c.source, dx_px = c.dx_px, median, "motion candidate");
    }
    Some(FusedShift {
        dx_px,
        used: kept.len(),
        rejected: candidates.len() - kept.len(),
    })
}
