//! Jidoka (自働化) - Autonomous anomaly detection.
//!
//! Integration stops the line as soon as a problem appears instead of
//! handing a corrupted trajectory to the caller.
//!
//! # Anomaly Types
//!
//! 1. **Non-finite values**: NaN or Inf in any compartment
//! 2. **Conservation drift**: the system's conserved quantity (for the
//!    compartment model, the sum of all fractions) moves away from its
//!    initial value beyond tolerance
//!
//! # Severity Levels
//!
//! - **Acceptable**: Within tolerance, continue normally
//! - **Warning**: Approaching tolerance, log and continue
//! - **Critical**: Tolerance exceeded, stop the line
//! - **Fatal**: Unrecoverable state, halt immediately

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{SimError, SimResult};

/// Severity levels for Jidoka violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Acceptable variance within tolerance (continue).
    Acceptable,
    /// Warning: approaching tolerance boundary (log, continue).
    Warning,
    /// Critical: tolerance exceeded (stop the line).
    Critical,
    /// Fatal: unrecoverable state (halt immediately).
    Fatal,
}

/// Classifier for graduated Jidoka responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityClassifier {
    /// Warning threshold as fraction of tolerance (e.g., 0.8 = warn at 80%).
    pub warning_fraction: f64,
}

impl Default for SeverityClassifier {
    fn default() -> Self {
        Self {
            warning_fraction: 0.8,
        }
    }
}

impl SeverityClassifier {
    /// Create a new severity classifier.
    #[must_use]
    pub const fn new(warning_fraction: f64) -> Self {
        Self { warning_fraction }
    }

    /// Classify a drift magnitude against a tolerance.
    #[must_use]
    pub fn classify(&self, drift: f64, tolerance: f64) -> ViolationSeverity {
        let drift = drift.abs();
        if drift.is_nan() || drift.is_infinite() {
            ViolationSeverity::Fatal
        } else if drift > tolerance {
            ViolationSeverity::Critical
        } else if drift > tolerance * self.warning_fraction {
            ViolationSeverity::Warning
        } else {
            ViolationSeverity::Acceptable
        }
    }
}

/// Jidoka guard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JidokaConfig {
    /// NaN/Inf detection enabled.
    #[serde(default = "default_true")]
    pub check_finite: bool,
    /// Enable the conserved-quantity check.
    #[serde(default = "default_true")]
    pub check_conservation: bool,
    /// Maximum allowed absolute drift of the conserved quantity.
    #[serde(default = "default_conservation_tolerance")]
    pub conservation_tolerance: f64,
    /// Severity classifier for graduated responses.
    #[serde(default)]
    pub severity_classifier: SeverityClassifier,
}

const fn default_true() -> bool {
    true
}

const fn default_conservation_tolerance() -> f64 {
    1e-6
}

impl Default for JidokaConfig {
    fn default() -> Self {
        Self {
            check_finite: true,
            check_conservation: true,
            conservation_tolerance: default_conservation_tolerance(),
            severity_classifier: SeverityClassifier::default(),
        }
    }
}

/// Jidoka guard for autonomous anomaly detection.
///
/// # Example
///
/// ```rust
/// use vaxsim::engine::jidoka::{JidokaConfig, JidokaGuard};
///
/// let mut guard = JidokaGuard::new(JidokaConfig::default());
/// let names = ["S", "I"];
///
/// assert!(guard.check(0.0, &[0.9, 0.1], &names, Some(1.0)).is_ok());
/// assert!(guard.check(1.0, &[f64::NAN, 0.1], &names, Some(1.0)).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct JidokaGuard {
    config: JidokaConfig,
    /// Conserved quantity recorded on the first check.
    initial_invariant: Option<f64>,
    warnings: usize,
}

impl JidokaGuard {
    /// Create a new Jidoka guard with given configuration.
    #[must_use]
    pub const fn new(config: JidokaConfig) -> Self {
        Self {
            config,
            initial_invariant: None,
            warnings: 0,
        }
    }

    /// Check a state vector for anomalies.
    ///
    /// Call once for the initial condition and after every accepted step.
    /// `names` labels each component for error messages; `invariant` is the
    /// system's conserved quantity, if it has one.
    ///
    /// # Errors
    ///
    /// - `NonFiniteValue`: NaN or Inf found
    /// - `ConservationDrift`: conserved quantity moved beyond tolerance
    pub fn check(
        &mut self,
        time: f64,
        values: &[f64],
        names: &[&str],
        invariant: Option<f64>,
    ) -> SimResult<()> {
        if self.config.check_finite {
            Self::check_finite(time, values, names)?;
        }

        if self.config.check_conservation {
            if let Some(current) = invariant {
                self.check_conservation(time, current)?;
            }
        }

        Ok(())
    }

    fn check_finite(time: f64, values: &[f64], names: &[&str]) -> SimResult<()> {
        if !time.is_finite() {
            return Err(SimError::NonFiniteValue {
                location: "time".to_string(),
            });
        }
        for (i, value) in values.iter().enumerate() {
            if !value.is_finite() {
                let name = names.get(i).copied().unwrap_or("component");
                return Err(SimError::NonFiniteValue {
                    location: format!("{name}[{i}] at t={time:.4}"),
                });
            }
        }
        Ok(())
    }

    fn check_conservation(&mut self, time: f64, current: f64) -> SimResult<()> {
        let Some(initial) = self.initial_invariant else {
            self.initial_invariant = Some(current);
            return Ok(());
        };

        let tolerance = self.config.conservation_tolerance;
        let drift = current - initial;
        match self.config.severity_classifier.classify(drift, tolerance) {
            ViolationSeverity::Acceptable => Ok(()),
            ViolationSeverity::Warning => {
                self.warnings += 1;
                warn!(time, drift, tolerance, "conservation drift approaching tolerance");
                Ok(())
            }
            ViolationSeverity::Critical | ViolationSeverity::Fatal => {
                Err(SimError::ConservationDrift {
                    drift: drift.abs(),
                    tolerance,
                })
            }
        }
    }

    /// Reset the guard (clear the recorded invariant).
    #[allow(clippy::missing_const_for_fn)]
    pub fn reset(&mut self) {
        self.initial_invariant = None;
        self.warnings = 0;
    }

    /// Number of warnings raised since the last reset.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings
    }

    /// Get current configuration.
    #[must_use]
    pub const fn config(&self) -> &JidokaConfig {
        &self.config
    }
}
