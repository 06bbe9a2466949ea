//! Scenario definitions and rate resolution.
//!
//! A [`Scenario`] is either one of three named presets or a caller-supplied
//! parameter set. Turning it into concrete [`ScenarioParameters`] takes one
//! of two separate paths:
//!
//! - [`ScenarioResolver::resolve_territory`]: presets scale the global
//!   baseline constants.
//! - [`ScenarioResolver::resolve_region`]: presets scale the region's own
//!   fitted rates from the parameter table.
//!
//! The two baselines have different provenance, so the paths stay distinct.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::data::RegionParameters;
use crate::error::{SimError, SimResult};

/// Territory-wide baseline transmission rate.
pub const BASELINE_RHO: f64 = 0.086_783_753;
/// Territory-wide baseline fatality-split fraction.
pub const BASELINE_THETA: f64 = 0.006_831_25;
/// Territory-wide baseline recovery rate.
pub const BASELINE_SIGMA: f64 = 0.072_947_592;
/// Territory-wide baseline disease-induced death rate.
pub const BASELINE_KAPPA: f64 = 0.003_590_055;

/// Resolved ODE rates for one forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParameters {
    /// Transmission rate.
    pub rho: f64,
    /// Fraction of new infections routed straight to fatalities.
    pub theta: f64,
    /// Recovery rate.
    pub sigma: f64,
    /// Disease-induced death rate.
    pub kappa: f64,
    /// Vaccination rate (fraction of population per day).
    #[serde(rename = "V1")]
    pub v1: f64,
}

impl ScenarioParameters {
    /// Check every rate is finite and non-negative.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` naming the first offending rate.
    pub fn validate(&self) -> SimResult<()> {
        for (name, value) in [
            ("rho", self.rho),
            ("theta", self.theta),
            ("sigma", self.sigma),
            ("kappa", self.kappa),
            ("V1", self.v1),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SimError::InvalidParameter {
                    name: name.to_string(),
                    value,
                });
            }
        }
        Ok(())
    }

    /// Net per-capita growth of the infected compartment at susceptible fraction `s`.
    ///
    /// Infections decline once this is negative.
    #[must_use]
    pub fn infected_growth(&self, s: f64) -> f64 {
        self.rho * (1.0 - self.theta) * s - (self.sigma + self.kappa)
    }
}

/// Named scenario presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamedScenario {
    /// Expected trajectory.
    Baseline,
    /// Faster spread, slower recovery, slow vaccination.
    Adverse,
    /// Slower spread, faster recovery, fast vaccination.
    Favorable,
}

/// Multipliers a preset applies to the base rates, plus its fixed V1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresetScaling {
    /// Multiplier on rho.
    pub rho: f64,
    /// Multiplier on sigma.
    pub sigma: f64,
    /// Multiplier on kappa.
    pub kappa: f64,
    /// Vaccination rate (not scaled, replaced).
    pub v1: f64,
}

impl NamedScenario {
    /// All presets in display order.
    pub const ALL: [Self; 3] = [Self::Baseline, Self::Adverse, Self::Favorable];

    /// Scaling applied by this preset. theta is never scaled.
    #[must_use]
    pub const fn scaling(self) -> PresetScaling {
        match self {
            Self::Baseline => PresetScaling {
                rho: 1.0,
                sigma: 1.0,
                kappa: 1.0,
                v1: 0.00364,
            },
            Self::Adverse => PresetScaling {
                rho: 2.0,
                sigma: 0.5,
                kappa: 2.0,
                v1: 0.001,
            },
            Self::Favorable => PresetScaling {
                rho: 0.5,
                sigma: 2.0,
                kappa: 0.5,
                v1: 0.01,
            },
        }
    }

    /// Canonical token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Adverse => "adverse",
            Self::Favorable => "favorable",
        }
    }

    fn apply(self, rho: f64, theta: f64, sigma: f64, kappa: f64) -> ScenarioParameters {
        let scaling = self.scaling();
        ScenarioParameters {
            rho: rho * scaling.rho,
            theta,
            sigma: sigma * scaling.sigma,
            kappa: kappa * scaling.kappa,
            v1: scaling.v1,
        }
    }
}

impl fmt::Display for NamedScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamedScenario {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "baseline" | "real" | "average" => Ok(Self::Baseline),
            "adverse" | "bad" => Ok(Self::Adverse),
            "favorable" | "favourable" | "good" => Ok(Self::Favorable),
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}

/// Caller-supplied rates.
///
/// `rho` is optional; when absent the territory baseline is used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomParameters {
    /// Optional transmission rate override.
    #[serde(default)]
    pub rho: Option<f64>,
    /// Fatality-split fraction.
    pub theta: f64,
    /// Recovery rate.
    pub sigma: f64,
    /// Disease-induced death rate.
    pub kappa: f64,
    /// Vaccination rate.
    #[serde(rename = "V1")]
    pub v1: f64,
}

impl CustomParameters {
    fn resolve(&self) -> SimResult<ScenarioParameters> {
        let params = ScenarioParameters {
            rho: self.rho.unwrap_or(BASELINE_RHO),
            theta: self.theta,
            sigma: self.sigma,
            kappa: self.kappa,
            v1: self.v1,
        };
        params.validate()?;
        Ok(params)
    }
}

/// A forecast scenario: a named preset or explicit rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// One of the presets.
    Named(NamedScenario),
    /// Explicit rates.
    Custom(CustomParameters),
}

impl From<NamedScenario> for Scenario {
    fn from(named: NamedScenario) -> Self {
        Self::Named(named)
    }
}

impl From<CustomParameters> for Scenario {
    fn from(custom: CustomParameters) -> Self {
        Self::Custom(custom)
    }
}

impl FromStr for Scenario {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<NamedScenario>().map(Self::Named)
    }
}

/// Turns scenarios into concrete rates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioResolver;

impl ScenarioResolver {
    /// Resolve rates for the whole-territory aggregate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if custom rates are negative or non-finite.
    pub fn resolve_territory(scenario: &Scenario) -> SimResult<ScenarioParameters> {
        let params = match scenario {
            Scenario::Named(named) => {
                named.apply(BASELINE_RHO, BASELINE_THETA, BASELINE_SIGMA, BASELINE_KAPPA)
            }
            Scenario::Custom(custom) => custom.resolve()?,
        };
        debug!(?scenario, ?params, "resolved territory scenario");
        Ok(params)
    }

    /// Resolve rates for a single region using its fitted parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if custom rates are negative or non-finite.
    pub fn resolve_region(
        scenario: &Scenario,
        region: &RegionParameters,
    ) -> SimResult<ScenarioParameters> {
        let params = match scenario {
            Scenario::Named(named) => {
                named.apply(region.rho, region.theta, region.sigma, region.kappa)
            }
            Scenario::Custom(custom) => custom.resolve()?,
        };
        debug!(?scenario, ?params, "resolved region scenario");
        Ok(params)
    }
}
