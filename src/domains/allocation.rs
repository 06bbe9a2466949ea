//! Vaccine stockpile allocation.
//!
//! Every region in the population table receives an integer importance
//! score built from its recent case trajectory:
//!
//! ```text
//! rate(c, p)  = (c − p) / p          if p ≠ 0
//!             = (c − p) / (p + 1)    otherwise
//! susc        = (pop − infected − fatalities − doses) / pop
//! importance  = ⌊(w_i·rate_I + w_f·rate_F + w_s·susc) · pop / mean_pop⌋
//! allocation  = ⌊importance / Σimportance · stockpile⌋
//! ```
//!
//! Regions are ranked by importance (stable, descending) and split into
//! priority tiers by rank position according to the configured
//! [`TierPolicy`](crate::config::TierPolicy).

use std::fmt;
use std::io::Write;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AllocationConfig, ScoreWeights};
use crate::data::{checked_total, CaseRecord, CaseTable, PopulationTable, Region, VaccineTable};
use crate::error::{SimError, SimResult};

/// Largest stockpile that survives a round trip through `f64` exactly.
const MAX_EXACT_DOSES: u64 = 1 << 53;

/// A positive whole number of doses to distribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Stockpile(u64);

impl Stockpile {
    /// Wrap a dose count.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStockpile` for zero.
    pub fn new(doses: u64) -> SimResult<Self> {
        if doses == 0 || doses > MAX_EXACT_DOSES {
            return Err(SimError::InvalidStockpile(doses.to_string()));
        }
        Ok(Self(doses))
    }

    /// Number of doses.
    #[must_use]
    pub const fn doses(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Stockpile {
    type Error = SimError;

    fn try_from(doses: u64) -> Result<Self, Self::Error> {
        Self::new(doses)
    }
}

impl TryFrom<i64> for Stockpile {
    type Error = SimError;

    fn try_from(doses: i64) -> Result<Self, Self::Error> {
        u64::try_from(doses)
            .map_err(|_| SimError::InvalidStockpile(doses.to_string()))
            .and_then(Self::new)
    }
}

impl TryFrom<f64> for Stockpile {
    type Error = SimError;

    fn try_from(doses: f64) -> Result<Self, Self::Error> {
        if !doses.is_finite()
            || doses.fract() != 0.0
            || doses <= 0.0
            || doses > MAX_EXACT_DOSES as f64
        {
            return Err(SimError::InvalidStockpile(doses.to_string()));
        }
        Self::new(doses as u64)
    }
}

impl From<Stockpile> for u64 {
    fn from(stockpile: Stockpile) -> Self {
        stockpile.0
    }
}

/// Priority tier assigned by rank position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Top of the ranking.
    High,
    /// Middle of the ranking.
    Moderate,
    /// Remainder.
    Low,
}

impl Priority {
    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Growth rate between two cumulative counts.
///
/// A zero `previous` is replaced by one in the denominator, so growth from
/// nothing equals the current count.
#[must_use]
pub fn growth_rate(current: i64, previous: i64) -> f64 {
    let delta = (current - previous) as f64;
    if previous == 0 {
        delta / (previous + 1) as f64
    } else {
        delta / previous as f64
    }
}

/// Score inputs and result for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionScore {
    /// Region name.
    pub region: String,
    /// Resident population.
    pub population: u64,
    /// Date of the current snapshot.
    pub current_date: NaiveDate,
    /// Date of the comparison snapshot.
    pub previous_date: NaiveDate,
    /// Growth of active infections over the look-back window.
    pub infected_rate: f64,
    /// Growth of fatalities over the look-back window.
    pub fatality_rate: f64,
    /// Fraction of the population neither infected, dead nor vaccinated.
    pub susceptible: f64,
    /// Integer importance score.
    pub importance: i64,
}

/// One ranked row of the allocation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRow {
    /// Region name.
    pub region: String,
    /// Importance score.
    pub importance: i64,
    /// Doses allocated; negative when the importance score is negative.
    #[serde(rename = "vaccine allocation")]
    pub allocation: i64,
    /// Priority tier.
    pub priority: Priority,
}

/// Allocation result in rank order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationTable {
    rows: Vec<AllocationRow>,
}

impl AllocationTable {
    /// Rows in rank order.
    #[must_use]
    pub fn rows(&self) -> &[AllocationRow] {
        &self.rows
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no regions were scored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row for one region.
    #[must_use]
    pub fn get(&self, region: &str) -> Option<&AllocationRow> {
        self.rows.iter().find(|r| r.region == region)
    }

    /// Sum of all allocations.
    #[must_use]
    pub fn total_allocated(&self) -> i64 {
        self.rows.iter().map(|r| r.allocation).sum()
    }

    /// Regions in one tier, in rank order.
    pub fn tier(&self, priority: Priority) -> impl Iterator<Item = &AllocationRow> + '_ {
        self.rows.iter().filter(move |r| r.priority == priority)
    }

    /// Write `region, vaccine allocation, priority` as CSV.
    ///
    /// # Errors
    ///
    /// Returns `Csv` or `Io` if writing fails.
    pub fn write_csv<W: Write>(&self, writer: W) -> SimResult<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(["region", "vaccine allocation", "priority"])?;
        for row in &self.rows {
            csv_writer.write_record([
                row.region.as_str(),
                row.allocation.to_string().as_str(),
                row.priority.as_str(),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

/// Scores, ranks and apportions a stockpile across regions.
#[derive(Debug, Clone, Default)]
pub struct AllocationEngine {
    config: AllocationConfig,
}

impl AllocationEngine {
    /// Create an engine with the given weights, look-back and tier policy.
    #[must_use]
    pub const fn new(config: AllocationConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Distribute `stockpile` across every region of `populations`.
    ///
    /// # Errors
    ///
    /// - `UnknownRegion` if the case table names a region the population
    ///   table lacks
    /// - `MissingCaseHistory` if a region has no case records
    /// - `NonPositiveScoreSum` if the importance scores sum to zero or less
    pub fn allocate(
        &self,
        stockpile: Stockpile,
        populations: &PopulationTable,
        cases: &CaseTable,
        vaccines: &VaccineTable,
    ) -> SimResult<AllocationTable> {
        info!(
            stockpile = stockpile.doses(),
            regions = populations.len(),
            "starting allocation"
        );

        let mut scores = self.scores(populations, cases, vaccines)?;
        // Stable: ties keep population-table order.
        scores.sort_by(|a, b| b.importance.cmp(&a.importance));

        let total = checked_total(scores.iter().map(|s| s.importance))
            .ok_or_else(|| SimError::CountOverflow("importance scores".to_string()))?;
        if total <= 0 {
            return Err(SimError::NonPositiveScoreSum(total));
        }

        let (high, moderate) = self.config.tiers.tier_sizes(scores.len());
        let doses = i128::from(stockpile.doses());
        let rows: Vec<AllocationRow> = scores
            .into_iter()
            .enumerate()
            .map(|(rank, score)| {
                // ⌊score / total · doses⌋ without the rounding of a float ratio.
                let share = (i128::from(score.importance) * doses).div_euclid(i128::from(total));
                AllocationRow {
                    allocation: share as i64,
                    priority: if rank < high {
                        Priority::High
                    } else if rank < high + moderate {
                        Priority::Moderate
                    } else {
                        Priority::Low
                    },
                    importance: score.importance,
                    region: score.region,
                }
            })
            .collect();

        let table = AllocationTable { rows };
        info!(
            allocated = table.total_allocated(),
            score_sum = total,
            high,
            moderate,
            "allocation complete"
        );
        Ok(table)
    }

    /// Importance scores for every region, in population-table order.
    ///
    /// # Errors
    ///
    /// See [`Self::allocate`].
    pub fn scores(
        &self,
        populations: &PopulationTable,
        cases: &CaseTable,
        vaccines: &VaccineTable,
    ) -> SimResult<Vec<RegionScore>> {
        if let Some(stray) = cases
            .regions()
            .into_iter()
            .find(|name| populations.get(name).is_none())
        {
            return Err(SimError::unknown_region(stray, PopulationTable::NAME));
        }

        let mean = populations.mean();
        populations
            .iter()
            .map(|region| self.score_region(&region, mean, cases, vaccines))
            .collect()
    }

    /// Score one region against the territory mean population.
    ///
    /// # Errors
    ///
    /// Returns `MissingCaseHistory` if the region has no case records, or
    /// `NonFiniteValue` if the score cannot be represented.
    pub fn score_region(
        &self,
        region: &Region,
        mean_population: f64,
        cases: &CaseTable,
        vaccines: &VaccineTable,
    ) -> SimResult<RegionScore> {
        let (current, previous) = self.snapshots(&region.name, cases)?;
        let doses = vaccines.total_doses(&region.name)?;
        let population = region.population as f64;

        let infected_rate = growth_rate(current.infected, previous.infected);
        let fatality_rate = growth_rate(current.fatalities, previous.fatalities);
        let susceptible =
            (population - current.infected as f64 - current.fatalities as f64 - doses as f64)
                / population;

        let ScoreWeights {
            infected,
            fatality,
            susceptible: susceptible_weight,
        } = self.config.weights;
        let raw = (infected * infected_rate
            + fatality * fatality_rate
            + susceptible_weight * susceptible)
            * (population / mean_population);
        if !raw.is_finite() {
            return Err(SimError::NonFiniteValue {
                location: format!("importance score of '{}'", region.name),
            });
        }
        let importance = raw.floor() as i64;

        if importance < 0 {
            warn!(
                region = %region.name,
                importance,
                infected_rate,
                fatality_rate,
                susceptible,
                "negative importance score"
            );
        } else {
            debug!(region = %region.name, importance, "scored region");
        }

        Ok(RegionScore {
            region: region.name.clone(),
            population: region.population,
            current_date: current.date,
            previous_date: previous.date,
            infected_rate,
            fatality_rate,
            susceptible,
            importance,
        })
    }

    /// Current snapshot and the oldest snapshot inside the look-back window.
    fn snapshots<'c>(
        &self,
        region: &str,
        cases: &'c CaseTable,
    ) -> SimResult<(&'c CaseRecord, &'c CaseRecord)> {
        let mut history = cases.history(region);
        let current = history
            .next()
            .ok_or_else(|| SimError::MissingCaseHistory(region.to_string()))?;
        let cutoff = current
            .date
            .checked_sub_months(Months::new(self.config.lookback_months))
            .unwrap_or(NaiveDate::MIN);
        let previous = history
            .take_while(|r| r.date >= cutoff)
            .last()
            .unwrap_or(current);
        Ok((current, previous))
    }
}

/// Allocate with the default weights, look-back and tier policy.
///
/// # Errors
///
/// See [`AllocationEngine::allocate`].
pub fn allocate(
    stockpile: Stockpile,
    populations: &PopulationTable,
    cases: &CaseTable,
    vaccines: &VaccineTable,
) -> SimResult<AllocationTable> {
    AllocationEngine::default().allocate(stockpile, populations, cases, vaccines)
}
