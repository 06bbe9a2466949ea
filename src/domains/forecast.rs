//! Epidemic forecasting over a territory or a single region.
//!
//! A forecast runs in three steps:
//!
//! 1. Aggregate the scope's latest case snapshot and lifetime doses into
//!    [`InitialConditions`].
//! 2. Resolve the scenario into concrete rates. Territory and region scope
//!    use separate resolution paths.
//! 3. Integrate the [`CompartmentModel`] with Dormand-Prince under a Jidoka
//!    guard and sample it on [`time_grid`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::data::{CaseRecord, CaseTable, Datasets, PopulationTable};
use crate::engine::{DormandPrince, JidokaGuard};
use crate::error::{SimError, SimResult};
use crate::scenarios::{
    time_grid, CompartmentModel, InitialConditions, Scenario, ScenarioParameters,
    ScenarioResolver, ScopeSnapshot, Trajectory,
};

/// Which population a forecast covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionScope {
    /// Aggregate of every region in the population table.
    Territory,
    /// One named region.
    Region(String),
}

impl RegionScope {
    /// Scope for a single region.
    #[must_use]
    pub fn region(name: impl Into<String>) -> Self {
        Self::Region(name.into())
    }

    /// Display name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Territory => "territory",
            Self::Region(name) => name,
        }
    }
}

impl fmt::Display for RegionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Forecast engine bound to one set of normalized inputs.
#[derive(Debug, Clone)]
pub struct Simulator<'a> {
    datasets: &'a Datasets,
    config: &'a SimulationConfig,
}

impl<'a> Simulator<'a> {
    /// Create a simulator over normalized tables.
    #[must_use]
    pub const fn new(datasets: &'a Datasets, config: &'a SimulationConfig) -> Self {
        Self { datasets, config }
    }

    /// Simulation settings in use.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        self.config
    }

    /// Forecast `horizon_days` output points for `scope` under `scenario`.
    ///
    /// # Errors
    ///
    /// - `InvalidHorizon` if `horizon_days` is zero, negative or above
    ///   `max_horizon_days`
    /// - `UnknownRegion` if the region is missing from the population,
    ///   parameter or case table
    /// - `InvalidParameter` for negative or non-finite custom rates
    /// - `ZeroPopulation`, or any Jidoka / integrator failure
    pub fn simulate(
        &self,
        scope: &RegionScope,
        scenario: &Scenario,
        horizon_days: i64,
    ) -> SimResult<Trajectory> {
        let horizon = usize::try_from(horizon_days)
            .ok()
            .filter(|&h| h > 0 && horizon_days <= self.config.max_horizon_days)
            .ok_or(SimError::InvalidHorizon(horizon_days))?;

        info!(%scope, ?scenario, horizon, "starting forecast");

        let params = self.resolve(scope, scenario)?;
        let initial = self.initial_conditions(scope)?;
        let model = CompartmentModel::new(params)?;

        let times = time_grid(horizon);
        let integrator = DormandPrince::new(self.config.integrator.clone());
        let mut guard = JidokaGuard::new(self.config.jidoka.clone());
        let states = integrator.integrate(&model, initial.to_state(), &times, &mut guard)?;
        let trajectory = Trajectory::from_solution(&times, &states);

        if let Some(peak) = trajectory.peak_infection() {
            info!(
                %scope,
                rows = trajectory.len(),
                peak_infected = peak.infected,
                peak_day = peak.time,
                warnings = guard.warning_count(),
                "forecast complete"
            );
        }
        Ok(trajectory)
    }

    /// Resolve the scenario's rates for `scope`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if a region scope has no parameter row, or
    /// `InvalidParameter` for bad custom rates.
    pub fn resolve(
        &self,
        scope: &RegionScope,
        scenario: &Scenario,
    ) -> SimResult<ScenarioParameters> {
        match scope {
            RegionScope::Territory => ScenarioResolver::resolve_territory(scenario),
            RegionScope::Region(name) => {
                let fitted = self.datasets.parameters.require(name)?;
                ScenarioResolver::resolve_region(scenario, fitted)
            }
        }
    }

    /// Starting fractions for `scope`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the scope has no population or case
    /// records, or `ZeroPopulation`.
    pub fn initial_conditions(&self, scope: &RegionScope) -> SimResult<InitialConditions> {
        let population = scope_population(&self.datasets.populations, scope)?;
        let snapshot = self.snapshot(scope)?;
        debug!(%scope, population, ?snapshot, "aggregated scope snapshot");
        InitialConditions::from_snapshot(
            scope.name(),
            &snapshot,
            population,
            self.config.initial_conditions.vaccinated,
        )
    }

    /// Case totals on the scope's most recent report date plus lifetime doses.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the scope has no case records.
    pub fn snapshot(&self, scope: &RegionScope) -> SimResult<ScopeSnapshot> {
        let cases = &self.datasets.cases;
        let vaccines = &self.datasets.vaccines;

        match scope {
            RegionScope::Territory => {
                let latest = cases
                    .latest_date()
                    .ok_or_else(|| SimError::unknown_region(scope.name(), CaseTable::NAME))?;
                let mut snapshot = sum_cases(scope, cases.snapshot(latest))?;
                snapshot.doses = vaccines.total_doses_all()?;
                Ok(snapshot)
            }
            RegionScope::Region(name) => {
                let latest = cases
                    .history(name)
                    .next()
                    .map(|r| r.date)
                    .ok_or_else(|| SimError::unknown_region(name.as_str(), CaseTable::NAME))?;
                let mut snapshot =
                    sum_cases(scope, cases.history(name).take_while(|r| r.date == latest))?;
                snapshot.doses = vaccines.total_doses(name)?;
                Ok(snapshot)
            }
        }
    }
}

fn scope_population(populations: &PopulationTable, scope: &RegionScope) -> SimResult<u64> {
    match scope {
        RegionScope::Territory => Ok(populations.total()),
        RegionScope::Region(name) => populations.require(name),
    }
}

fn sum_cases<'r>(
    scope: &RegionScope,
    mut records: impl Iterator<Item = &'r CaseRecord>,
) -> SimResult<ScopeSnapshot> {
    records
        .try_fold(ScopeSnapshot::default(), |acc, r| {
            Some(ScopeSnapshot {
                confirmed: acc.confirmed.checked_add(r.confirmed)?,
                fatalities: acc.fatalities.checked_add(r.fatalities)?,
                recovered: acc.recovered.checked_add(r.recovered)?,
                doses: acc.doses,
            })
        })
        .ok_or_else(|| SimError::CountOverflow(format!("cases in '{scope}'")))
}

/// Forecast with a one-off [`Simulator`].
///
/// # Errors
///
/// See [`Simulator::simulate`].
pub fn simulate(
    datasets: &Datasets,
    config: &SimulationConfig,
    scope: &RegionScope,
    scenario: &Scenario,
    horizon_days: i64,
) -> SimResult<Trajectory> {
    Simulator::new(datasets, config).simulate(scope, scenario, horizon_days)
}
