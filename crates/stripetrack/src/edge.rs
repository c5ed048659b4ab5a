//! Sub-pixel extremum localization by a three-point parabola fit.

use std::ops::Range;

/// Which extremum to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremumKind {
    /// Largest value (e.g. steepest rising edge of a derivative).
    Max,
    /// Smallest value (e.g. steepest falling edge of a derivative).
    Min,
}

/// Parabola `y = a x² + b x + c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parabola {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Parabola {
    /// Vertex `(x, y)`. `None` when the curvature vanishes.
    pub fn vertex(&self) -> Option<[f64; 2]> {
        if !self.a.is_finite() || self.a.abs() < 1e-15 {
            return None;
        }
        let x = -self.b / (2.0 * self.a);
        let y = self.c - self.b * self.b / (4.0 * self.a);
        Some([x, y])
    }

    /// Evaluate at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        (self.a * x + self.b) * x + self.c
    }
}

/// Exact parabola through three points (closed-form Lagrange coefficients).
///
/// Returns `None` when two abscissae coincide.
pub fn fit_parabola_three(p1: [f64; 2], p2: [f64; 2], p3: [f64; 2]) -> Option<Parabola> {
    let [x1, y1] = p1;
    let [x2, y2] = p2;
    let [x3, y3] = p3;
    let denom = (x1 - x2) * (x1 - x3) * (x2 - x3);
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let a = (x3 * (y2 - y1) + x2 * (y1 - y3) + x1 * (y3 - y2)) / denom;
    let b = (x3 * x3 * (y1 - y2) + x2 * x2 * (y3 - y1) + x1 * x1 * (y2 - y3)) / denom;
    let c = (x2 * x3 * (x2 - x3) * y1 + x3 * x1 * (x3 - x1) * y2 + x1 * x2 * (x1 - x2) * y3)
        / denom;
    Some(Parabola { a, b, c })
}

/// Index of the first extremum of `kind` within `range`.
pub fn extremum_index(signal: &[f64], kind: ExtremumKind, range: Range<usize>) -> Option<usize> {
    let end = range.end.min(signal.len());
    let candidates = signal.get(range.start..end)?.iter().enumerate();
    let best = match kind {
        ExtremumKind::Max => candidates.fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        }),
        ExtremumKind::Min => candidates.fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, bv)) if bv <= v => best,
            _ => Some((i, v)),
        }),
    };
    best.map(|(i, _)| range.start + i)
}

/// Sub-pixel abscissa of the extremum of `signal`.
///
/// The integer extremum is searched over the interior `1..n-1` so that both
/// neighbours exist for the fit.
pub fn sub_pixel_extremum(signal: &[f64], kind: ExtremumKind) -> Option<f64> {
    sub_pixel_extremum_in(signal, kind, 0..signal.len())
}

/// Like [`sub_pixel_extremum`] but restricted to `range` (clipped to the interior).
pub fn sub_pixel_extremum_in(
    signal: &[f64],
    kind: ExtremumKind,
    range: Range<usize>,
) -> Option<f64> {
    let n = signal.len();
    if n < 3 {
        return None;
    }
    let lo = range.start.max(1);
    let hi = range.end.min(n - 1);
    if lo >= hi {
        return None;
    }
    let i = extremum_index(signal, kind, lo..hi)?;
    debug_assert!(i >= 1 && i + 1 < n);
    let x = i as f64;
    let p = fit_parabola_three(
        [x - 1.0, signal[i - 1]],
        [x, signal[i]],
        [x + 1.0, signal[i + 1]],
    )?;
    let [vx, _] = p.vertex()?;
    // A plateau next to the extremum can push the vertex outside the
    // bracketing interval; clamp to it.
    Some(vx.clamp(x - 1.0, x + 1.0))
}
