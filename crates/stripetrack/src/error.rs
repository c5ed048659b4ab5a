//! Error type shared by the estimation pipeline.

/// Errors surfaced by [`crate::PositionEstimator`] and its configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorError {
    /// Configuration failed validation.
    InvalidConfig(String),
    /// Readout length does not match the configured sensor size.
    ReadoutLength {
        /// Configured number of sensor pixels.
        expected: usize,
        /// Length of the offending readout.
        got: usize,
    },
    /// Readout contains a NaN or infinite sample.
    NonFiniteSample {
        /// Index of the first non-finite sample.
        index: usize,
    },
    /// The first frame showed no crossing inside the calibration window.
    ///
    /// Indicates a misplaced window, wrong calibration bounds or a wiring
    /// problem. Not retried.
    NoCalibrationCrossing {
        /// Anchor threshold used for the scan.
        threshold: f64,
        /// Calibration window `[begin, end)` in sensor pixels.
        window: [usize; 2],
    },
}

impl std::fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::ReadoutLength { expected, got } => {
                write!(f, "readout length mismatch: expected {}, got {}", expected, got)
            }
            Self::NonFiniteSample { index } => {
                write!(f, "non-finite readout sample at index {}", index)
            }
            Self::NoCalibrationCrossing { threshold, window } => write!(
                f,
                "no crossing of threshold {:.3} in calibration window [{}, {})",
                threshold, window[0], window[1]
            ),
        }
    }
}

impl std::error::Error for EstimatorError {}
