//! Error types for vaxsim.
//!
//! All fallible operations return `Result<T, SimError>` instead of panicking.
//! Every variant belongs to exactly one [`ErrorKind`], which is what callers
//! usually branch on.

use thiserror::Error;

/// Result type alias for vaxsim operations.
pub type SimResult<T> = Result<T, SimError>;

/// Broad classification of a [`SimError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, unknown identifiers, or out-of-range arguments.
    InputValidation,
    /// A division or ratio with no documented fallback hit zero.
    ArithmeticDegeneracy,
    /// The integrator produced NaN/Inf, drifted, or failed to converge.
    NumericalInstability,
    /// Reading input from a file or reader failed.
    Io,
}

/// Unified error type for all vaxsim operations.
#[derive(Debug, Error)]
pub enum SimError {
    // ===== Input validation =====
    /// A required column is absent from a raw table.
    #[error("table '{table}' is missing required column '{column}'")]
    MissingColumn {
        /// Logical table name.
        table: String,
        /// Expected source column.
        column: String,
    },

    /// A date cell could not be parsed.
    #[error("table '{table}' row {row}: unparsable date '{value}'")]
    InvalidDate {
        /// Logical table name.
        table: String,
        /// Zero-based data row index.
        row: usize,
        /// Offending cell contents.
        value: String,
    },

    /// A numeric cell could not be parsed or is out of range.
    #[error("table '{table}' row {row}, column '{column}': invalid number '{value}'")]
    InvalidNumber {
        /// Logical table name.
        table: String,
        /// Zero-based data row index.
        row: usize,
        /// Column name.
        column: String,
        /// Offending cell contents.
        value: String,
    },

    /// A table has no data rows.
    #[error("table '{table}' is empty")]
    EmptyTable {
        /// Logical table name.
        table: String,
    },

    /// A keyed table lists the same region twice.
    #[error("table '{table}' lists region '{region}' more than once")]
    DuplicateRegion {
        /// Logical table name.
        table: String,
        /// Duplicated region name.
        region: String,
    },

    /// Region not present in a table it must be present in.
    #[error("unknown region '{region}' (not found in {table} table)")]
    UnknownRegion {
        /// Requested region name.
        region: String,
        /// Table that was searched.
        table: String,
    },

    /// A row has no region name.
    #[error("{table} row {row} has a blank region name")]
    BlankRegion {
        /// Logical table name.
        table: String,
        /// Zero-based data row index.
        row: usize,
    },

    /// Scenario token did not match any named preset.
    #[error("unknown scenario '{0}' (expected baseline, adverse or favorable)")]
    UnknownScenario(String),

    /// Forecast horizon must be a positive number of days within the
    /// configured limit.
    #[error("horizon must be a positive number of days within the configured limit, got {0}")]
    InvalidHorizon(i64),

    /// Stockpile must be a positive whole number of doses.
    #[error("stockpile must be a positive whole number of doses, got {0}")]
    InvalidStockpile(String),

    /// A model rate is negative or not finite.
    #[error("parameter '{name}' must be finite and non-negative, got {value}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Rejected value.
        value: f64,
    },

    /// A region has no case records to score.
    #[error("region '{0}' has no case history")]
    MissingCaseHistory(String),

    /// Invalid configuration parameter.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    // ===== Arithmetic degeneracy =====
    /// Sum of importance scores cannot be used as a ratio denominator.
    #[error("importance scores sum to {0}; cannot apportion stockpile")]
    NonPositiveScoreSum(i64),

    /// A count total does not fit in 64 bits.
    #[error("count total of {0} overflows")]
    CountOverflow(String),

    /// Population of the requested scope is zero.
    #[error("population of '{0}' is zero")]
    ZeroPopulation(String),

    // ===== Numerical instability (Jidoka) =====
    /// Numerical instability detected (NaN or Inf).
    #[error("Jidoka: non-finite value detected at {location}")]
    NonFiniteValue {
        /// Location where the non-finite value was detected.
        location: String,
    },

    /// Compartment total drifted from its initial value.
    #[error("Jidoka: conservation drift {drift:.6e} exceeds tolerance {tolerance:.6e}")]
    ConservationDrift {
        /// Absolute drift from the initial compartment total.
        drift: f64,
        /// Configured tolerance threshold.
        tolerance: f64,
    },

    /// Adaptive integrator gave up.
    #[error("integration failed at t={time:.4}: {reason}")]
    IntegrationFailure {
        /// Simulation time at which the failure occurred.
        time: f64,
        /// Why the step could not be completed.
        reason: String,
    },

    // ===== I/O =====
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SimError {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unknown-region error.
    #[must_use]
    pub fn unknown_region(region: impl Into<String>, table: impl Into<String>) -> Self {
        Self::UnknownRegion {
            region: region.into(),
            table: table.into(),
        }
    }

    /// Create an integrator failure.
    #[must_use]
    pub fn integration(time: f64, reason: impl Into<String>) -> Self {
        Self::IntegrationFailure {
            time,
            reason: reason.into(),
        }
    }

    /// Create a missing-column error.
    #[must_use]
    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingColumn { .. }
            | Self::InvalidDate { .. }
            | Self::InvalidNumber { .. }
            | Self::EmptyTable { .. }
            | Self::DuplicateRegion { .. }
            | Self::BlankRegion { .. }
            | Self::UnknownRegion { .. }
            | Self::UnknownScenario(_)
            | Self::InvalidHorizon(_)
            | Self::InvalidStockpile(_)
            | Self::InvalidParameter { .. }
            | Self::MissingCaseHistory(_)
            | Self::Config { .. }
            | Self::YamlParse(_)
            | Self::Validation(_) => ErrorKind::InputValidation,
            Self::NonPositiveScoreSum(_) | Self::CountOverflow(_) | Self::ZeroPopulation(_) => {
                ErrorKind::ArithmeticDegeneracy
            }
            Self::NonFiniteValue { .. }
            | Self::ConservationDrift { .. }
            | Self::IntegrationFailure { .. } => ErrorKind::NumericalInstability,
            Self::Io(_) | Self::Csv(_) => ErrorKind::Io,
        }
    }

    /// Check if this error is a Jidoka violation (integration stopped the line).
    #[must_use]
    pub const fn is_jidoka_violation(&self) -> bool {
        matches!(
            self,
            Self::NonFiniteValue { .. } | Self::ConservationDrift { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_jidoka_violation_detection() {
        let non_finite = SimError::NonFiniteValue {
            location: "infected".to_string(),
        };
        assert!(non_finite.is_jidoka_violation());

        let drift = SimError::ConservationDrift {
            drift: 0.001,
            tolerance: 0.0001,
        };
        assert!(drift.is_jidoka_violation());

        let failure = SimError::integration(3.0, "step size underflow");
        assert!(!failure.is_jidoka_violation());
        assert_eq!(failure.kind(), ErrorKind::NumericalInstability);

        let config = SimError::config("invalid");
        assert!(!config.is_jidoka_violation());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SimError::UnknownScenario("worst".into()).kind(),
            ErrorKind::InputValidation
        );
        assert_eq!(SimError::InvalidHorizon(0).kind(), ErrorKind::InputValidation);
        assert_eq!(
            SimError::NonPositiveScoreSum(0).kind(),
            ErrorKind::ArithmeticDegeneracy
        );
        assert_eq!(
            SimError::CountOverflow("doses in 'A'".into()).kind(),
            ErrorKind::ArithmeticDegeneracy
        );
        assert_eq!(
            SimError::ZeroPopulation("Territory".into()).kind(),
            ErrorKind::ArithmeticDegeneracy
        );
        assert_eq!(
            SimError::Io(std::io::Error::other("gone")).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn test_error_display() {
        let err = SimError::ConservationDrift {
            drift: 0.001_234_567,
            tolerance: 0.000_001,
        };
        let msg = err.to_string();
        assert!(msg.contains("conservation drift"));
        assert!(msg.contains("1.234567e-3"));
    }

    #[test]
    fn test_error_missing_column_display() {
        let err = SimError::missing_column("cases", "Report Date");
        let msg = err.to_string();
        assert!(msg.contains("cases"));
        assert!(msg.contains("Report Date"));
    }

    #[test]
    fn test_error_unknown_region_display() {
        let err = SimError::unknown_region("Atlantis", "population");
        let msg = err.to_string();
        assert!(msg.contains("Atlantis"));
        assert!(msg.contains("population"));
        assert_eq!(err.kind(), ErrorKind::InputValidation);
    }

    #[test]
    fn test_error_config() {
        let err = SimError::config("invalid parameter");
        let msg = err.to_string();
        assert!(msg.contains("Configuration error"));
        assert!(msg.contains("invalid parameter"));
    }

    #[test]
    fn test_error_debug() {
        let err = SimError::config("test");
        let debug = format!("{err:?}");
        assert!(debug.contains("Config"));
    }
}
