//! Threshold crossing detection and stripe-width sampling.
//!
//! A crossing is the first sample on the far side of a threshold. Its
//! sub-pixel position is recovered by linear interpolation between that
//! sample and its predecessor.

use crate::signal::median_in_place;

/// Signal direction at a crossing, in index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Signal goes from below to above the threshold.
    Rising,
    /// Signal goes from above to below the threshold.
    Falling,
}

/// One threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CrossingEvent {
    /// First sample index past the threshold (always `>= 1`).
    pub index: usize,
    /// Threshold that was crossed.
    pub threshold: f64,
    /// Crossing direction.
    pub direction: Direction,
}

/// Where the stripe-width estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidthSource {
    /// Median of sanity-filtered crossing widths.
    Measured,
    /// All samples rejected; the sane prior was used.
    Sane,
}

/// Stripe width in pixels with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StripeWidth {
    pub px: f64,
    pub source: WidthSource,
    /// Number of width samples that passed the sanity filter.
    pub n_samples: usize,
}

/// `n` evenly spaced thresholds over `[lo, hi]` (`n == 1` gives the midpoint).
pub fn evenly_spaced_thresholds(n: usize, lo: f64, hi: f64) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![0.5 * (lo + hi)],
        _ => {
            let step = (hi - lo) / (n as f64 - 1.0);
            (0..n).map(|i| lo + i as f64 * step).collect()
        }
    }
}

/// Scan `signal` for crossings of `threshold`.
///
/// The starting state is "below" when `signal[0] < threshold`. Indices are
/// strictly increasing and directions alternate.
pub fn get_crossings(signal: &[f64], threshold: f64) -> Vec<CrossingEvent> {
    let mut out = Vec::new();
    let Some(&first) = signal.first() else {
        return out;
    };
    let mut below = first < threshold;
    for (i, &p) in signal.iter().enumerate().skip(1) {
        if below && p > threshold {
            below = false;
            out.push(CrossingEvent {
                index: i,
                threshold,
                direction: Direction::Rising,
            });
        } else if !below && p < threshold {
            below = true;
            out.push(CrossingEvent {
                index: i,
                threshold,
                direction: Direction::Falling,
            });
        }
    }
    out
}

/// Crossings for every threshold of an ascending sweep, grouped by threshold.
pub fn get_multi_threshold_crossings(signal: &[f64], thresholds: &[f64]) -> Vec<CrossingEvent> {
    thresholds
        .iter()
        .flat_map(|&t| get_crossings(signal, t))
        .collect()
}

/// Number of crossings landing on each index.
pub fn crossing_density_profile(events: &[CrossingEvent], len: usize) -> Vec<u32> {
    let mut out = vec![0u32; len];
    for e in events {
        if let Some(c) = out.get_mut(e.index) {
            *c += 1;
        }
    }
    out
}

/// Sub-pixel position of a crossing.
///
/// Interpolates linearly between samples `index - 1` and `index`. Samples
/// that sat exactly on the threshold before the crossing are skipped back
/// over, so the result always lies in `[index - 1, index]` relative to the
/// last sample strictly on the starting side.
pub fn crossing_position(signal: &[f64], event: &CrossingEvent) -> f64 {
    let i = event.index;
    if i == 0 || i >= signal.len() {
        return i as f64;
    }
    let y0 = signal[i - 1];
    let y1 = signal[i];
    let dy = y1 - y0;
    if dy.abs() < f64::EPSILON {
        return i as f64;
    }
    let t = ((event.threshold - y0) / dy).clamp(0.0, 1.0);
    (i - 1) as f64 + t
}

/// Sub-pixel crossings per threshold: `(position, direction)`.
pub fn crossing_positions(signal: &[f64], thresholds: &[f64]) -> Vec<Vec<(f64, Direction)>> {
    thresholds
        .iter()
        .map(|&t| {
            get_crossings(signal, t)
                .iter()
                .map(|e| (crossing_position(signal, e), e.direction))
                .collect()
        })
        .collect()
}

/// Estimate the stripe width (pixels) from crossing spacing.
///
/// At every threshold the distance between consecutive (opposite-direction)
/// crossings is one width sample. Samples deviating from `sane_px` by more
/// than `tolerance * sane_px` are rejected and the median of the rest is
/// returned; with no survivors the sane prior is returned.
pub fn estimate_stripe_width_px(
    signal: &[f64],
    thresholds: &[f64],
    sane_px: f64,
    tolerance: f64,
) -> StripeWidth {
    let bound = tolerance * sane_px;
    let mut samples: Vec<f64> = crossing_positions(signal, thresholds)
        .iter()
        .flat_map(|row| row.windows(2).map(|w| w[1].0 - w[0].0))
        .filter(|w| (w - sane_px).abs() <= bound)
        .collect();

    let n_samples = samples.len();
    match median_in_place(&mut samples) {
        Some(px) => StripeWidth {
            px,
            source: WidthSource::Measured,
            n_samples,
        },
        None => StripeWidth {
            px: sane_px,
            source: WidthSource::Sane,
            n_samples: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::signal::{smooth, SmoothingKernel};
    use crate::test_utils::stripe_profile;

    fn step(n: usize, at: usize) -> Vec<f64> {
        (0..n).map(|i| if i < at { 0.1 } else { 0.9 }).collect()
    }

    #[test]
    fn ideal_step_has_one_crossing_for_any_narrow_kernel() {
        let s = step(60, 30);
        assert_eq!(get_crossings(&s, 0.5).len(), 1);
        for k in [
            SmoothingKernel::Box { width: 3 },
            SmoothingKernel::Box { width: 9 },
            SmoothingKernel::Binomial { order: 4 },
            SmoothingKernel::Binomial { order: 6 },
        ] {
            let sm = smooth(&s, &k);
            let c = get_crossings(&sm, 0.5);
            assert_eq!(c.len(), 1, "{:?}", k);
            assert_eq!(c[0].direction, Direction::Rising);
            assert!((29..=31).contains(&c[0].index), "{:?} -> {}", k, c[0].index);
        }
    }

    #[test]
    fn step_near_window_edge_has_no_phantom_crossing() {
        // A plateau touching the last sample must not produce a falling
        // crossing after smoothing.
        let s = step(40, 10);
        let sm = smooth(&s, &SmoothingKernel::Box { width: 9 });
        assert_eq!(get_crossings(&sm, 0.5).len(), 1);
    }

    #[test]
    fn crossings_alternate_and_increase() {
        let s = stripe_profile(97, 24.0, 3.7, 1.5);
        for t in evenly_spaced_thresholds(5, 0.3, 0.7) {
            let c = get_crossings(&s, t);
            assert!(c.len() >= 6);
            for pair in c.windows(2) {
                assert!(pair[1].index > pair[0].index);
                assert_ne!(pair[1].direction, pair[0].direction);
            }
        }
    }

    #[test]
    fn no_crossing_in_flat_signal() {
        assert!(get_crossings(&[0.2; 30], 0.5).is_empty());
        assert!(get_crossings(&[], 0.5).is_empty());
    }

    #[test]
    fn sub_pixel_position_interpolates() {
        let s = [0.0, 0.2, 0.6, 1.0];
        let c = get_crossings(&s, 0.5);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].index, 2);
        assert_abs_diff_eq!(crossing_position(&s, &c[0]), 1.75, epsilon = 1e-12);
    }

    #[test]
    fn sub_pixel_positions_track_shift() {
        let a = stripe_profile(97, 24.0, 3.1, 1.5);
        let b = stripe_profile(97, 24.0, 3.4, 1.5);
        let pa = crossing_positions(&a, &[0.5]);
        let pb = crossing_positions(&b, &[0.5]);
        assert_eq!(pa[0].len(), pb[0].len());
        for (x, y) in pa[0].iter().zip(pb[0].iter()) {
            assert_eq!(x.1, y.1);
            assert_abs_diff_eq!(y.0 - x.0, 0.3, epsilon = 0.05);
        }
    }

    #[test]
    fn multi_threshold_sweep_and_density() {
        let s: Vec<f64> = (0..20).map(|i| i as f64 / 19.0).collect();
        let thresholds = evenly_spaced_thresholds(4, 0.2, 0.8);
        let events = get_multi_threshold_crossings(&s, &thresholds);
        assert_eq!(events.len(), 4);
        for pair in events.windows(2) {
            assert!(pair[1].threshold > pair[0].threshold);
            assert!(pair[1].index >= pair[0].index);
        }
        let density = crossing_density_profile(&events, s.len());
        assert_eq!(density.iter().sum::<u32>(), 4);
    }

    #[test]
    fn evenly_spaced_matches_linspace() {
        let t = evenly_spaced_thresholds(5, 0.3, 0.7);
        assert_eq!(t.len(), 5);
        assert_abs_diff_eq!(t[0], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(t[2], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(t[4], 0.7, epsilon = 1e-12);
        assert_eq!(evenly_spaced_thresholds(1, 0.0, 1.0), vec![0.5]);
    }

    #[test]
    fn stripe_width_measured_from_crossings() {
        let s = stripe_profile(97, 24.0, 5.2, 1.5);
        // At mid level rising and falling edges mirror each other, so the
        // interpolation error cancels in the width.
        let w = estimate_stripe_width_px(&s, &[0.5], 9.0, 0.8);
        assert_eq!(w.source, WidthSource::Measured);
        assert!(w.n_samples >= 6);
        assert_abs_diff_eq!(w.px, 12.0, epsilon = 1e-6);

        let w = estimate_stripe_width_px(&s, &evenly_spaced_thresholds(5, 0.3, 0.7), 9.0, 0.8);
        assert_eq!(w.source, WidthSource::Measured);
        assert_abs_diff_eq!(w.px, 12.0, epsilon = 0.5);
    }

    #[test]
    fn stripe_width_falls_back_to_sane_prior() {
        let s = stripe_profile(97, 24.0, 5.2, 1.5);
        // A prior far from the true width rejects every sample.
        let w = estimate_stripe_width_px(&s, &[0.5], 50.0, 0.5);
        assert_eq!(w.source, WidthSource::Sane);
        assert_eq!(w.px, 50.0);
        assert_eq!(w.n_samples, 0);
    }
}
