//! Synthetic stripe readouts shared by the unit tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Normalized stripe pattern of `len` samples, values in `[0.05, 0.95]`.
///
/// The pattern is a smoothed square wave with period `period_px` whose
/// edges are roughly `softness_px` wide. Sample `i` sees the pattern at
/// `i - offset_px`, so growing `offset_px` moves every edge towards higher
/// indices. Rising zero-level edges sit at `offset_px + k * period_px`.
pub(crate) fn stripe_profile(len: usize, period_px: f64, offset_px: f64, softness_px: f64) -> Vec<f64> {
    let k = period_px / (2.0 * std::f64::consts::PI * softness_px);
    let norm = k.tanh();
    (0..len)
        .map(|i| {
            let theta = 2.0 * std::f64::consts::PI * (i as f64 - offset_px) / period_px;
            0.5 + 0.45 * (k * theta.sin()).tanh() / norm
        })
        .collect()
}

/// Raw sensor readouts of a wheel moving past the sensor.
pub(crate) struct SyntheticWheel {
    pub period_px: f64,
    pub softness_px: f64,
    pub amin: f64,
    pub amax: f64,
    /// Half-width of uniform additive noise, raw units.
    pub noise: f64,
    rng: StdRng,
}

impl SyntheticWheel {
    /// 24-pixel period (12-pixel stripes) on the default `(0, 3600)` range.
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            period_px: 24.0,
            softness_px: 1.5,
            amin: 0.0,
            amax: 3600.0,
            noise: 0.0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub(crate) fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// One full-sensor readout with the pattern displaced by `offset_px`.
    pub(crate) fn readout(&mut self, sensor_pixels: usize, offset_px: f64) -> Vec<f64> {
        let amp = self.amax - self.amin;
        stripe_profile(sensor_pixels, self.period_px, offset_px, self.softness_px)
            .into_iter()
            .map(|v| {
                let n = if self.noise > 0.0 {
                    self.rng.gen_range(-self.noise..self.noise)
                } else {
                    0.0
                };
                self.amin + amp * v + n
            })
            .collect()
    }
}
