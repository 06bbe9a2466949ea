//! Configuration system with YAML schema and validation.
//!
//! Implements Poka-Yoke (mistake-proofing) through:
//! - Type-safe configuration structs
//! - Schema validation via serde and `validator`
//! - Runtime semantic validation
//!
//! Every engine receives its configuration as an explicit argument; nothing
//! here is global.

use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

use crate::engine::jidoka::JidokaConfig;
use crate::error::{SimError, SimResult};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct VaxConfig {
    /// Schema version for forward compatibility.
    #[validate(length(min = 1))]
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Forecast (ODE) settings.
    #[validate(nested)]
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Allocation engine settings.
    #[validate(nested)]
    #[serde(default)]
    pub allocation: AllocationConfig,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

impl VaxConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> SimResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    /// Create a builder for configuration.
    #[must_use]
    pub fn builder() -> VaxConfigBuilder {
        VaxConfigBuilder::default()
    }

    /// Run schema and semantic validation.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn check(&self) -> SimResult<()> {
        self.validate()?;
        self.validate_semantic()
    }

    /// Validate semantic constraints beyond schema.
    fn validate_semantic(&self) -> SimResult<()> {
        let integrator = &self.simulation.integrator;
        if integrator.min_step >= integrator.max_step {
            return Err(SimError::config(format!(
                "min_step ({}) must be smaller than max_step ({})",
                integrator.min_step, integrator.max_step
            )));
        }
        if integrator.initial_step < integrator.min_step
            || integrator.initial_step > integrator.max_step
        {
            return Err(SimError::config(
                "initial_step must lie within [min_step, max_step]",
            ));
        }

        let weights = &self.allocation.weights;
        if ![weights.infected, weights.fatality, weights.susceptible]
            .iter()
            .all(|w| w.is_finite())
        {
            return Err(SimError::config("score weights must be finite"));
        }

        self.allocation.tiers.check()
    }
}

impl Default for VaxConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            simulation: SimulationConfig::default(),
            allocation: AllocationConfig::default(),
        }
    }
}

/// Configuration builder for programmatic construction.
#[derive(Debug, Default)]
pub struct VaxConfigBuilder {
    vaccinated: Option<VaccinatedInit>,
    max_horizon_days: Option<i64>,
    rtol: Option<f64>,
    atol: Option<f64>,
    jidoka: Option<JidokaConfig>,
    weights: Option<ScoreWeights>,
    lookback_months: Option<u32>,
    tiers: Option<TierPolicy>,
}

impl VaxConfigBuilder {
    /// Set how the vaccinated compartment is initialised.
    #[must_use]
    pub const fn vaccinated_init(mut self, init: VaccinatedInit) -> Self {
        self.vaccinated = Some(init);
        self
    }

    /// Set the longest accepted forecast horizon.
    #[must_use]
    pub const fn max_horizon_days(mut self, days: i64) -> Self {
        self.max_horizon_days = Some(days);
        self
    }

    /// Set the integrator's relative tolerance.
    #[must_use]
    pub const fn rtol(mut self, rtol: f64) -> Self {
        self.rtol = Some(rtol);
        self
    }

    /// Set the integrator's absolute tolerance.
    #[must_use]
    pub const fn atol(mut self, atol: f64) -> Self {
        self.atol = Some(atol);
        self
    }

    /// Set Jidoka configuration.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JidokaConfig doesn't impl Copy
    pub fn jidoka(mut self, config: JidokaConfig) -> Self {
        self.jidoka = Some(config);
        self
    }

    /// Set importance score weights.
    #[must_use]
    pub const fn score_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Set the growth-rate look-back window in calendar months.
    #[must_use]
    pub const fn lookback_months(mut self, months: u32) -> Self {
        self.lookback_months = Some(months);
        self
    }

    /// Set the priority tier policy.
    #[must_use]
    pub const fn tier_policy(mut self, policy: TierPolicy) -> Self {
        self.tiers = Some(policy);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> VaxConfig {
        let mut config = VaxConfig::default();

        if let Some(vaccinated) = self.vaccinated {
            config.simulation.initial_conditions.vaccinated = vaccinated;
        }
        if let Some(days) = self.max_horizon_days {
            config.simulation.max_horizon_days = days;
        }
        if let Some(rtol) = self.rtol {
            config.simulation.integrator.rtol = rtol;
        }
        if let Some(atol) = self.atol {
            config.simulation.integrator.atol = atol;
        }
        if let Some(jidoka) = self.jidoka {
            config.simulation.jidoka = jidoka;
        }
        if let Some(weights) = self.weights {
            config.allocation.weights = weights;
        }
        if let Some(months) = self.lookback_months {
            config.allocation.lookback_months = months;
        }
        if let Some(tiers) = self.tiers {
            config.allocation.tiers = tiers;
        }

        config
    }
}

/// Forecast settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SimulationConfig {
    /// Longest accepted forecast horizon in days; the output grid holds
    /// one point per day.
    #[validate(range(min = 1, max = 10_000_000))]
    #[serde(default = "default_max_horizon_days")]
    pub max_horizon_days: i64,
    /// Adaptive integrator tolerances and step limits.
    #[validate(nested)]
    #[serde(default)]
    pub integrator: IntegratorConfig,
    /// Initial-condition policy.
    #[serde(default)]
    pub initial_conditions: InitialConditionConfig,
    /// Jidoka (stop-on-error) configuration.
    #[serde(default)]
    pub jidoka: JidokaConfig,
}

const fn default_max_horizon_days() -> i64 {
    36_500
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_horizon_days: default_max_horizon_days(),
            integrator: IntegratorConfig::default(),
            initial_conditions: InitialConditionConfig::default(),
            jidoka: JidokaConfig::default(),
        }
    }
}

/// Dormand-Prince integrator settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IntegratorConfig {
    /// Relative error tolerance per step.
    #[validate(range(min = 1e-14, max = 1e-2))]
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    /// Absolute error tolerance per step.
    #[validate(range(min = 1e-16, max = 1e-2))]
    #[serde(default = "default_atol")]
    pub atol: f64,
    /// First trial step in days.
    #[serde(default = "default_initial_step")]
    pub initial_step: f64,
    /// Smallest step before the integrator gives up.
    #[validate(range(exclusive_min = 0.0))]
    #[serde(default = "default_min_step")]
    pub min_step: f64,
    /// Largest step the controller may take.
    #[serde(default = "default_max_step")]
    pub max_step: f64,
    /// Attempted-step budget across the whole horizon.
    #[validate(range(min = 1))]
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

const fn default_rtol() -> f64 {
    1e-10
}

const fn default_atol() -> f64 {
    1e-12
}

const fn default_initial_step() -> f64 {
    0.1
}

const fn default_min_step() -> f64 {
    1e-10
}

const fn default_max_step() -> f64 {
    10.0
}

const fn default_max_steps() -> usize {
    1_000_000
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            rtol: default_rtol(),
            atol: default_atol(),
            initial_step: default_initial_step(),
            min_step: default_min_step(),
            max_step: default_max_step(),
            max_steps: default_max_steps(),
        }
    }
}

/// Initial-condition policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitialConditionConfig {
    /// Starting value of the vaccinated compartment.
    #[serde(default)]
    pub vaccinated: VaccinatedInit,
}

/// How the vaccinated compartment is seeded at t=0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VaccinatedInit {
    /// Start vaccination accounting at zero for the forecast horizon.
    #[default]
    Reset,
    /// Seed with cumulative doses administered divided by population.
    Cumulative,
}

/// Allocation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AllocationConfig {
    /// Importance score weights.
    #[serde(default)]
    pub weights: ScoreWeights,
    /// Growth-rate look-back window in calendar months.
    #[validate(range(min = 1, max = 24))]
    #[serde(default = "default_lookback_months")]
    pub lookback_months: u32,
    /// Priority tier policy.
    #[serde(default)]
    pub tiers: TierPolicy,
}

const fn default_lookback_months() -> u32 {
    2
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            lookback_months: default_lookback_months(),
            tiers: TierPolicy::default(),
        }
    }
}

/// Weights of the three importance score terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight on the infection growth rate.
    pub infected: f64,
    /// Weight on the fatality growth rate.
    pub fatality: f64,
    /// Weight on the remaining-susceptible fraction.
    pub susceptible: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            infected: 8.0,
            fatality: 12.0,
            susceptible: 4.0,
        }
    }
}

/// Rule for splitting the ranked region list into priority tiers.
///
/// The default is calibrated for a jurisdiction with exactly 133 regions
/// (13 high, 28 moderate, 92 low). Any other region count falls back to
/// the nearest 10% / 30% / 60% split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum TierPolicy {
    /// Fixed tier sizes for a known region count.
    FixedCount {
        /// Number of high-priority regions.
        high: usize,
        /// Number of moderate-priority regions.
        moderate: usize,
        /// Region count the sizes were chosen for.
        expected_regions: usize,
    },
    /// Tier sizes as fractions of the actual region count.
    Proportional {
        /// Fraction of regions marked high.
        high: f64,
        /// Fraction of regions marked moderate.
        moderate: f64,
    },
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::FixedCount {
            high: 13,
            moderate: 28,
            expected_regions: 133,
        }
    }
}

impl TierPolicy {
    /// Fractions used when a fixed-count policy meets an unexpected region count.
    pub const FALLBACK_HIGH: f64 = 0.10;
    /// See [`Self::FALLBACK_HIGH`].
    pub const FALLBACK_MODERATE: f64 = 0.30;

    /// Number of (high, moderate) regions for a ranked list of `regions`.
    ///
    /// The low tier receives the remainder.
    #[must_use]
    pub fn tier_sizes(&self, regions: usize) -> (usize, usize) {
        match *self {
            Self::FixedCount {
                high,
                moderate,
                expected_regions,
            } if regions == expected_regions => (high, moderate),
            Self::FixedCount { .. } => {
                proportional_sizes(regions, Self::FALLBACK_HIGH, Self::FALLBACK_MODERATE)
            }
            Self::Proportional { high, moderate } => proportional_sizes(regions, high, moderate),
        }
    }

    fn check(&self) -> SimResult<()> {
        match *self {
            Self::FixedCount {
                high,
                moderate,
                expected_regions,
            } => {
                if high + moderate > expected_regions {
                    return Err(SimError::config(format!(
                        "tier sizes {high}+{moderate} exceed region count {expected_regions}"
                    )));
                }
            }
            Self::Proportional { high, moderate } => {
                let valid = |f: f64| f.is_finite() && (0.0..=1.0).contains(&f);
                if !valid(high) || !valid(moderate) || high + moderate > 1.0 {
                    return Err(SimError::config(format!(
                        "tier fractions must lie in [0, 1] with sum <= 1, got {high}, {moderate}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn proportional_sizes(regions: usize, high: f64, moderate: f64) -> (usize, usize) {
    let n = regions as f64;
    let high_count = ((n * high).round() as usize).min(regions);
    let moderate_count = ((n * moderate).round() as usize).min(regions - high_count);
    (high_count, moderate_count)
}
