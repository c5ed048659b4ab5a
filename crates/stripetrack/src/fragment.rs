//! Longest flat fragment of a window and a line fit over it.

use nalgebra::{DMatrix, DVector};

use crate::config::FragmentParams;
use crate::signal::{derivative, second_derivative};

/// Half-open index range `[begin, end)` of the analysed signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fragment {
    pub begin: usize,
    pub end: usize,
}

impl Fragment {
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }
}

/// Least-squares line `y = slope * x + intercept` over a fragment.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    /// Abscissa where the line reaches zero; `None` for a horizontal line.
    pub zero_crossing: Option<f64>,
}

/// Find the longest run where the derivative stays small.
///
/// `margin` samples are trimmed from both ends first. A sample is flat when
/// `|d| < (max(d) - min(d)) / divisor`; a derivative with zero spread is
/// flat everywhere. Ties go to the first run. Returned indices refer to
/// `signal`, not the trimmed slice.
pub fn get_longest_flat_fragment(signal: &[f64], params: &FragmentParams) -> Option<Fragment> {
    let m = params.margin;
    if signal.len() <= 2 * m {
        return None;
    }
    let trimmed = &signal[m..signal.len() - m];
    let d = match params.derivative_order {
        1 => derivative(trimmed),
        _ => second_derivative(trimmed),
    };

    let (lo, hi) = d
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let spread = hi - lo;
    if !(spread > 0.0) {
        return Some(Fragment {
            begin: m,
            end: m + trimmed.len(),
        });
    }
    let threshold = spread / params.divisor;

    let mut best: Option<Fragment> = None;
    let mut run_start: Option<usize> = None;
    for i in 0..=d.len() {
        let flat = i < d.len() && d[i].abs() < threshold;
        match (flat, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(s)) => {
                let len = i - s;
                if best.map_or(true, |b| len > b.len()) {
                    best = Some(Fragment {
                        begin: m + s,
                        end: m + i,
                    });
                }
                run_start = None;
            }
            _ => {}
        }
    }
    best
}

/// Fit a line through `signal[fragment]`, abscissae in signal indices.
///
/// Needs at least two samples.
pub fn fit_fragment_line(signal: &[f64], fragment: Fragment) -> Option<LineFit> {
    let end = fragment.end.min(signal.len());
    if end < fragment.begin + 2 {
        return None;
    }
    let n = end - fragment.begin;
    let a = DMatrix::from_fn(n, 2, |r, c| {
        if c == 0 {
            (fragment.begin + r) as f64
        } else {
            1.0
        }
    });
    let b = DVector::from_column_slice(&signal[fragment.begin..end]);
    let sol = a.svd(true, true).solve(&b, 1e-12).ok()?;
    let slope = sol[0];
    let intercept = sol[1];
    if !slope.is_finite() || !intercept.is_finite() {
        return None;
    }
    let zero_crossing = (slope.abs() > 1e-12).then(|| -intercept / slope);
    Some(LineFit {
        slope,
        intercept,
        zero_crossing,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn params(order: usize) -> FragmentParams {
        FragmentParams {
            derivative_order: order,
            divisor: 10.0,
            margin: 0,
        }
    }

    #[test]
    fn plateau_is_longest_flat_run() {
        // Short plateau, ramp, long plateau, ramp.
        let mut s = vec![0.0; 5];
        s.extend((1..=5).map(|i| i as f64 * 0.2));
        s.extend(std::iter::repeat(1.0).take(15));
        s.extend((0..5).map(|i| 1.0 - i as f64 * 0.2));
        let f = get_longest_flat_fragment(&s, &params(1)).unwrap();
        assert!(f.begin >= 10 && f.begin <= 11, "{:?}", f);
        assert!(f.end >= 24 && f.end <= 26, "{:?}", f);
    }

    #[test]
    fn first_run_wins_ties() {
        let s = [0.0, 0.0, 0.0, 1.0, 2.0, 2.0, 2.0, 2.0, 3.0];
        let f = get_longest_flat_fragment(&s, &params(1)).unwrap();
        assert_eq!(f.begin, 0);
    }

    #[test]
    fn zero_spread_is_entirely_flat() {
        let s: Vec<f64> = (0..20).map(|i| 3.0 * i as f64).collect();
        let p = FragmentParams {
            derivative_order: 2,
            divisor: 10.0,
            margin: 3,
        };
        let f = get_longest_flat_fragment(&s, &p).unwrap();
        assert_eq!(f, Fragment { begin: 3, end: 17 });
    }

    #[test]
    fn empty_after_margin_trim() {
        let p = FragmentParams {
            derivative_order: 2,
            divisor: 10.0,
            margin: 4,
        };
        assert!(get_longest_flat_fragment(&[1.0; 8], &p).is_none());
        assert!(get_longest_flat_fragment(&[], &p).is_none());
    }

    #[test]
    fn line_fit_recovers_slope_and_root() {
        let s: Vec<f64> = (0..30).map(|i| 0.25 * i as f64 - 2.0).collect();
        let fit = fit_fragment_line(&s, Fragment { begin: 4, end: 20 }).unwrap();
        assert_abs_diff_eq!(fit.slope, 0.25, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.intercept, -2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.zero_crossing.unwrap(), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn horizontal_line_has_no_root() {
        let fit = fit_fragment_line(&[0.5; 10], Fragment { begin: 2, end: 8 }).unwrap();
        assert_abs_diff_eq!(fit.slope, 0.0, epsilon = 1e-12);
        assert!(fit.zero_crossing.is_none());
        assert!(fit_fragment_line(&[0.5; 10], Fragment { begin: 2, end: 3 }).is_none());
    }
}
