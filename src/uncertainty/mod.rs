//! Exchange-level uncertainty propagation through repeated stochastic
//! re-solves.
//!
//! This module provides:
//! - Uncertainty: per-exchange distribution descriptor
//! - UncertaintyEngine: parse / sample / inject-and-solve / aggregate
//! - SampleMatrix: drawn (or externally supplied) sample columns
//! - CancelToken: cooperative cancellation between iterations

pub mod distribution;
pub mod engine;

pub use distribution::Uncertainty;
pub use engine::{CancelToken, McConfig, SampleMatrix, StochasticInput, UncertaintyEngine};
