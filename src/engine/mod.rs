//! Core numerical engine.
//!
//! Provides:
//! - The [`OdeSystem`] seam that models implement
//! - An adaptive Dormand-Prince 5(4) integrator
//! - Jidoka guards for stop-on-error

pub mod integrator;
pub mod jidoka;

pub use integrator::DormandPrince;
pub use jidoka::{JidokaConfig, JidokaGuard};

/// A system of `N` first-order ordinary differential equations.
pub trait OdeSystem<const N: usize> {
    /// Evaluate `dy/dt` at time `t`.
    fn derivatives(&self, t: f64, y: &[f64; N]) -> [f64; N];

    /// Human-readable component labels, used in diagnostics.
    fn component_names(&self) -> [&'static str; N];

    /// Quantity the exact flow conserves, if any.
    fn invariant(&self, _y: &[f64; N]) -> Option<f64> {
        None
    }
}
