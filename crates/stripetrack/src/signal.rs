//! Signal conditioning: normalization, smoothing and discrete derivatives.
//!
//! All convolutions produce same-length, centered output and pad the input by
//! replicating its first/last sample. Zero padding would pull the boundary
//! samples toward zero and create spurious threshold crossings at the window
//! edges, so replicate padding is used at every call site.

use crate::config::{CalibrationConfig, NormalizationPolicy};

/// Amplitudes at or below this value are treated as degenerate.
pub const AMPLITUDE_EPS: f64 = 1e-6;

/// Symmetric, unit-sum smoothing kernel.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingKernel {
    /// Moving average. Even widths are rounded up to the next odd width.
    Box { width: usize },
    /// Binomial approximation of a Gaussian.
    ///
    /// Order `n` has `2n - 1` taps; order 4 is `[1, 6, 15, 20, 15, 6, 1] / 64`.
    Binomial { order: usize },
    /// Quadratic Savitzky-Golay smoothing over `2 * half_width + 1` samples.
    SavitzkyGolay { half_width: usize },
}

impl SmoothingKernel {
    /// Kernel taps (odd length, sums to one).
    pub fn weights(&self) -> Vec<f64> {
        match *self {
            Self::Box { width } => {
                let w = width.max(1) | 1;
                vec![1.0 / w as f64; w]
            }
            Self::Binomial { order } => {
                let m = 2 * (order.max(1) - 1);
                let mut row = vec![1.0f64];
                for _ in 0..m {
                    let mut next = vec![1.0f64; row.len() + 1];
                    for k in 1..row.len() {
                        next[k] = row[k - 1] + row[k];
                    }
                    row = next;
                }
                let scale = 2f64.powi(m as i32);
                row.iter().map(|c| c / scale).collect()
            }
            Self::SavitzkyGolay { half_width } => {
                let m = half_width as f64;
                let denom = (2.0 * m + 3.0) * (2.0 * m + 1.0) * (2.0 * m - 1.0);
                (-(half_width as i64)..=half_width as i64)
                    .map(|j| {
                        let j = j as f64;
                        3.0 * (3.0 * m * m + 3.0 * m - 1.0 - 5.0 * j * j) / denom
                    })
                    .collect()
            }
        }
    }
}

/// Linear rescale `(x - amin) / (amax - amin)`, clamped to `[0, 1]`.
///
/// Degenerate amplitude returns the input unchanged.
pub fn normalize(signal: &[f64], amin: f64, amax: f64) -> Vec<f64> {
    let amp = amax - amin;
    if amp <= AMPLITUDE_EPS {
        return signal.to_vec();
    }
    signal
        .iter()
        .map(|&x| ((x - amin) / amp).clamp(0.0, 1.0))
        .collect()
}

/// Normalize using the frame's own min/max.
pub fn normalize_range(signal: &[f64]) -> Vec<f64> {
    let (lo, hi) = signal
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        });
    if !lo.is_finite() || !hi.is_finite() {
        return signal.to_vec();
    }
    normalize(signal, lo, hi)
}

/// Normalize according to the configured policy.
pub fn normalize_with(signal: &[f64], cfg: &CalibrationConfig) -> Vec<f64> {
    match cfg.normalization {
        NormalizationPolicy::FixedBounds => normalize(signal, cfg.amin, cfg.amax),
        NormalizationPolicy::PerFrameRange => normalize_range(signal),
    }
}

/// Same-length centered convolution with replicate padding.
pub fn convolve_same(signal: &[f64], weights: &[f64]) -> Vec<f64> {
    let n = signal.len();
    if n == 0 || weights.is_empty() {
        return signal.to_vec();
    }
    let half = (weights.len() / 2) as isize;
    let last = n as isize - 1;
    (0..n as isize)
        .map(|i| {
            weights
                .iter()
                .enumerate()
                .map(|(k, &w)| {
                    let j = (i + k as isize - half).clamp(0, last);
                    w * signal[j as usize]
                })
                .sum()
        })
        .collect()
}

/// Smooth with one kernel.
pub fn smooth(signal: &[f64], kernel: &SmoothingKernel) -> Vec<f64> {
    convolve_same(signal, &kernel.weights())
}

/// Apply kernels in order. An empty chain copies the input.
pub fn smooth_chain(signal: &[f64], kernels: &[SmoothingKernel]) -> Vec<f64> {
    kernels
        .iter()
        .fold(signal.to_vec(), |acc, k| smooth(&acc, k))
}

/// First derivative via central differences.
///
/// Boundary samples use forward/backward differences.
pub fn derivative(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let mut out = vec![0.0f64; n];
    if n < 2 {
        return out;
    }
    out[0] = signal[1] - signal[0];
    for i in 1..(n - 1) {
        out[i] = 0.5 * (signal[i + 1] - signal[i - 1]);
    }
    out[n - 1] = signal[n - 1] - signal[n - 2];
    out
}

/// Second derivative `s[i-1] - 2 s[i] + s[i+1]`, boundaries copied from
/// their neighbours.
pub fn second_derivative(signal: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let mut out = vec![0.0f64; n];
    if n < 3 {
        return out;
    }
    for i in 1..(n - 1) {
        out[i] = signal[i - 1] - 2.0 * signal[i] + signal[i + 1];
    }
    out[0] = out[1];
    out[n - 1] = out[n - 2];
    out
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(signal: &[f64]) -> Option<f64> {
    if signal.is_empty() {
        return None;
    }
    Some(signal.iter().sum::<f64>() / signal.len() as f64)
}

/// Median of a scratch buffer (reordered in place).
pub(crate) fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(0.5 * (values[mid - 1] + values[mid]))
    }
}
