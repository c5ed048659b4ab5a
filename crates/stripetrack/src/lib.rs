//! stripetrack: angle estimation for a striped encoder wheel read by a
//! linear optical sensor.
//!
//! Each readout is a short intensity profile across a few stripes of the
//! wheel rim. The pipeline stages are:
//!
//! 1. **Signal** – normalization into `[0, 1]`, smoothing, derivatives.
//! 2. **Crossings** – multi-threshold crossing scan, sub-pixel positions,
//!    stripe-width sampling and the longest flat fragment.
//! 3. **Motion** – per-frame pixel shift from matched crossings, the
//!    steepest edge and a cross-correlation tracker, fused by a median gate.
//! 4. **Fusion** – unit conversion and outlier-guarded accumulation into a
//!    running estimate in arcseconds.
//! 5. **Anchor** – per-index crossing history that recognizes full stripe
//!    periods and snaps the estimate to them, bounding long-term drift.
//!
//! # Public API
//! - [`PositionEstimator`] with [`EstimatorConfig`] is the entry point.
//! - [`FrameSource`] / [`ReportSink`] connect it to a sensor and a consumer.
//! - The stage modules are public for offline analysis of single frames.

pub mod anchor;
pub mod config;
pub mod correlation;
pub mod crossing;
pub mod edge;
mod error;
mod estimator;
pub mod fragment;
pub mod fusion;
pub mod motion;
mod result;
pub mod signal;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{
    AnchorConfig, CalibrationConfig, CorrelationConfig, CrossingConfig, EstimatorConfig,
    FragmentParams, FusionConfig, NormalizationPolicy, WheelGeometry, WindowConfig,
};
pub use error::EstimatorError;
pub use estimator::{FrameSource, PositionEstimator, ReportSink};
pub use result::{ErrorSummary, FrameDiagnostics, FrameReport, TrackingResult};
