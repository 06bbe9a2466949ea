//! Canonical input tables.
//!
//! The engines never see raw CSV. The data-refresh layer hands over four
//! [`RawTable`]s, [`Datasets::normalize`] turns them into typed, sorted
//! tables, and both engines read from those.

pub mod normalize;
pub mod raw;

use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

pub use raw::RawTable;

/// A named sub-unit of the territory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Unique region name.
    pub name: String,
    /// Resident population.
    pub population: u64,
}

/// One region's case counts on one report date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Region name.
    pub locality: String,
    /// Report date.
    pub date: NaiveDate,
    /// Cumulative confirmed cases.
    pub confirmed: i64,
    /// Cumulative deaths.
    pub fatalities: i64,
    /// Estimated recoveries, `floor(0.9 × confirmed)`.
    pub recovered: i64,
    /// Active infections, `confirmed − recovered − fatalities`.
    pub infected: i64,
}

impl CaseRecord {
    /// Build a record, deriving `recovered` and `infected`.
    #[must_use]
    pub fn new(
        locality: impl Into<String>,
        date: NaiveDate,
        confirmed: i64,
        fatalities: i64,
    ) -> Self {
        // |0.9 × confirmed| ≤ |confirmed|, so the narrowing is lossless.
        let recovered = (i128::from(confirmed) * 9 / 10) as i64;
        Self {
            locality: locality.into(),
            date,
            confirmed,
            fatalities,
            recovered,
            infected: (confirmed - recovered).saturating_sub(fatalities),
        }
    }
}

/// Doses administered in one region on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccineRecord {
    /// Region name.
    pub locality: String,
    /// Administration date.
    pub date: NaiveDate,
    /// Doses administered.
    pub doses: i64,
}

/// Fitted ODE coefficients for one region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionParameters {
    /// Transmission rate.
    pub rho: f64,
    /// Fatality-split fraction.
    pub theta: f64,
    /// Recovery rate.
    pub sigma: f64,
    /// Disease-induced death rate.
    pub kappa: f64,
}

/// Population per region, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationTable {
    regions: IndexMap<String, u64>,
}

impl PopulationTable {
    pub(crate) const NAME: &'static str = "population";

    /// Build from `(name, population)` pairs.
    ///
    /// # Errors
    ///
    /// Rejects empty input, duplicate names and zero populations.
    pub fn from_regions<I, S>(regions: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut map = IndexMap::new();
        for (name, population) in regions {
            let name = name.into();
            if population == 0 {
                return Err(SimError::ZeroPopulation(name));
            }
            if map.insert(name.clone(), population).is_some() {
                return Err(SimError::DuplicateRegion {
                    table: Self::NAME.to_string(),
                    region: name,
                });
            }
        }
        if map.is_empty() {
            return Err(SimError::EmptyTable {
                table: Self::NAME.to_string(),
            });
        }
        Ok(Self { regions: map })
    }

    /// Population of a region, if listed.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<u64> {
        self.regions.get(name).copied()
    }

    /// Population of a region.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the region is not listed.
    pub fn require(&self, name: &str) -> SimResult<u64> {
        self.get(name)
            .ok_or_else(|| SimError::unknown_region(name, Self::NAME))
    }

    /// Sum of all regional populations.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.regions.values().sum()
    }

    /// Mean regional population.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.regions.is_empty() {
            return 0.0;
        }
        self.total() as f64 / self.regions.len() as f64
    }

    /// Regions in source order.
    pub fn iter(&self) -> impl Iterator<Item = Region> + '_ {
        self.regions.iter().map(|(name, &population)| Region {
            name: name.clone(),
            population,
        })
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True when no regions are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Case history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseTable {
    records: Vec<CaseRecord>,
}

impl CaseTable {
    pub(crate) const NAME: &'static str = "cases";

    /// Build from records in any order; sorts newest first (stable).
    ///
    /// # Errors
    ///
    /// Returns `EmptyTable` if there are no records.
    pub fn from_records(mut records: Vec<CaseRecord>) -> SimResult<Self> {
        if records.is_empty() {
            return Err(SimError::EmptyTable {
                table: Self::NAME.to_string(),
            });
        }
        records.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(Self { records })
    }

    /// All records, newest first.
    #[must_use]
    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    /// Most recent report date in the table.
    #[must_use]
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    /// One region's history, newest first.
    pub fn history<'a, 'r>(&'a self, region: &'r str) -> impl Iterator<Item = &'a CaseRecord> + 'r
    where
        'a: 'r,
    {
        self.records.iter().filter(move |r| r.locality == region)
    }

    /// Records reported on `date`.
    pub fn snapshot(&self, date: NaiveDate) -> impl Iterator<Item = &CaseRecord> + '_ {
        self.records.iter().filter(move |r| r.date == date)
    }

    /// True if the region has at least one record.
    #[must_use]
    pub fn contains(&self, region: &str) -> bool {
        self.history(region).next().is_some()
    }

    /// Distinct region names in order of first appearance.
    #[must_use]
    pub fn regions(&self) -> Vec<&str> {
        let seen: IndexSet<&str> = self.records.iter().map(|r| r.locality.as_str()).collect();
        seen.into_iter().collect()
    }
}

/// Vaccine administration history, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaccineTable {
    records: Vec<VaccineRecord>,
}

impl VaccineTable {
    pub(crate) const NAME: &'static str = "vaccines";

    /// Build from records in any order; sorts newest first (stable).
    ///
    /// # Errors
    ///
    /// Returns `EmptyTable` if there are no records.
    pub fn from_records(mut records: Vec<VaccineRecord>) -> SimResult<Self> {
        if records.is_empty() {
            return Err(SimError::EmptyTable {
                table: Self::NAME.to_string(),
            });
        }
        records.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(Self { records })
    }

    /// All records, newest first.
    #[must_use]
    pub fn records(&self) -> &[VaccineRecord] {
        &self.records
    }

    /// Lifetime doses administered in one region.
    ///
    /// # Errors
    ///
    /// Returns `CountOverflow` if the total does not fit in an `i64`.
    pub fn total_doses(&self, region: &str) -> SimResult<i64> {
        checked_total(
            self.records
                .iter()
                .filter(|r| r.locality == region)
                .map(|r| r.doses),
        )
        .ok_or_else(|| SimError::CountOverflow(format!("doses in '{region}'")))
    }

    /// Lifetime doses administered across every record.
    ///
    /// # Errors
    ///
    /// Returns `CountOverflow` if the total does not fit in an `i64`.
    pub fn total_doses_all(&self) -> SimResult<i64> {
        checked_total(self.records.iter().map(|r| r.doses))
            .ok_or_else(|| SimError::CountOverflow("doses in the territory".to_string()))
    }
}

/// Sum of `values`, or `None` on overflow.
pub(crate) fn checked_total(mut values: impl Iterator<Item = i64>) -> Option<i64> {
    values.try_fold(0_i64, i64::checked_add)
}

/// Fitted ODE coefficients per region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    regions: IndexMap<String, RegionParameters>,
}

impl ParameterTable {
    pub(crate) const NAME: &'static str = "parameters";

    /// Build from `(name, parameters)` pairs.
    ///
    /// # Errors
    ///
    /// Rejects empty input and duplicate names.
    pub fn from_regions<I, S>(regions: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = (S, RegionParameters)>,
        S: Into<String>,
    {
        let mut map = IndexMap::new();
        for (name, params) in regions {
            let name = name.into();
            if map.insert(name.clone(), params).is_some() {
                return Err(SimError::DuplicateRegion {
                    table: Self::NAME.to_string(),
                    region: name,
                });
            }
        }
        if map.is_empty() {
            return Err(SimError::EmptyTable {
                table: Self::NAME.to_string(),
            });
        }
        Ok(Self { regions: map })
    }

    /// Parameters of a region.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRegion` if the region is not listed.
    pub fn require(&self, name: &str) -> SimResult<&RegionParameters> {
        self.regions
            .get(name)
            .ok_or_else(|| SimError::unknown_region(name, Self::NAME))
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// True when no regions are listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// The four raw tables delivered by the data-refresh layer.
#[derive(Debug, Clone, Default)]
pub struct RawDatasets {
    /// Case report table (with header).
    pub cases: RawTable,
    /// Vaccine administration table (with header).
    pub vaccines: RawTable,
    /// Population table (no header).
    pub populations: RawTable,
    /// Per-region ODE parameters (with header).
    pub parameters: RawTable,
}

/// All normalized inputs for one run.
#[derive(Debug, Clone)]
pub struct Datasets {
    /// Population per region.
    pub populations: PopulationTable,
    /// Case history, newest first.
    pub cases: CaseTable,
    /// Vaccine history, newest first.
    pub vaccines: VaccineTable,
    /// Fitted per-region ODE coefficients.
    pub parameters: ParameterTable,
}

impl Datasets {
    /// Normalize all four raw tables.
    ///
    /// # Errors
    ///
    /// Propagates the first normalization failure; nothing is defaulted.
    pub fn normalize(raw: &RawDatasets) -> SimResult<Self> {
        Ok(Self {
            populations: normalize::populations(&raw.populations)?,
            cases: normalize::cases(&raw.cases)?,
            vaccines: normalize::vaccines(&raw.vaccines)?,
            parameters: normalize::parameters(&raw.parameters)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_case_record_derivations() {
        let record = CaseRecord::new("A", date(2021, 3, 1), 550, 5);
        assert_eq!(record.recovered, 495);
        assert_eq!(record.infected, 50);

        // 0.9 × 7 = 6.3 truncates to 6
        let record = CaseRecord::new("A", date(2021, 3, 1), 7, 0);
        assert_eq!(record.recovered, 6);
        assert_eq!(record.infected, 1);
    }

    #[test]
    fn test_case_table_sorted_newest_first() {
        let table = CaseTable::from_records(vec![
            CaseRecord::new("A", date(2021, 1, 1), 10, 0),
            CaseRecord::new("A", date(2021, 3, 1), 30, 0),
            CaseRecord::new("B", date(2021, 2, 1), 20, 0),
        ])
        .unwrap();

        let dates: Vec<_> = table.records().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date(2021, 3, 1), date(2021, 2, 1), date(2021, 1, 1)]);
        assert_eq!(table.latest_date(), Some(date(2021, 3, 1)));
        assert_eq!(table.history("A").count(), 2);
        assert!(table.contains("B"));
        assert!(!table.contains("C"));
        assert_eq!(table.regions(), vec!["A", "B"]);
    }

    #[test]
    fn test_case_table_stable_for_equal_dates() {
        let table = CaseTable::from_records(vec![
            CaseRecord::new("B", date(2021, 1, 1), 10, 0),
            CaseRecord::new("A", date(2021, 1, 1), 10, 0),
        ])
        .unwrap();
        assert_eq!(table.regions(), vec!["B", "A"]);
        assert_eq!(table.snapshot(date(2021, 1, 1)).count(), 2);
    }

    #[test]
    fn test_empty_tables_rejected() {
        assert!(matches!(
            CaseTable::from_records(Vec::new()),
            Err(SimError::EmptyTable { .. })
        ));
        assert!(matches!(
            VaccineTable::from_records(Vec::new()),
            Err(SimError::EmptyTable { .. })
        ));
        assert!(PopulationTable::from_regions(Vec::<(String, u64)>::new()).is_err());
        assert!(ParameterTable::from_regions(Vec::<(String, RegionParameters)>::new()).is_err());
    }

    #[test]
    fn test_population_table() {
        let table = PopulationTable::from_regions([("A", 1000), ("B", 9000)]).unwrap();
        assert_eq!(table.total(), 10_000);
        assert!((table.mean() - 5000.0).abs() < f64::EPSILON);
        assert_eq!(table.require("B").unwrap(), 9000);
        assert!(matches!(
            table.require("C"),
            Err(SimError::UnknownRegion { .. })
        ));
        let names: Vec<_> = table.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_population_table_rejects_duplicates_and_zero() {
        assert!(matches!(
            PopulationTable::from_regions([("A", 1), ("A", 2)]),
            Err(SimError::DuplicateRegion { .. })
        ));
        assert!(matches!(
            PopulationTable::from_regions([("A", 0)]),
            Err(SimError::ZeroPopulation(_))
        ));
    }

    #[test]
    fn test_vaccine_aggregation() {
        let table = VaccineTable::from_records(vec![
            VaccineRecord { locality: "A".into(), date: date(2021, 1, 1), doses: 5 },
            VaccineRecord { locality: "A".into(), date: date(2021, 1, 2), doses: 7 },
            VaccineRecord { locality: "A".into(), date: date(2021, 1, 2), doses: 3 },
            VaccineRecord { locality: "B".into(), date: date(2021, 1, 2), doses: 11 },
        ])
        .unwrap();
        assert_eq!(table.total_doses("A").unwrap(), 15);
        assert_eq!(table.total_doses("C").unwrap(), 0);
        assert_eq!(table.total_doses_all().unwrap(), 26);
    }

    #[test]
    fn test_dose_total_overflow_is_an_error() {
        let table = VaccineTable::from_records(vec![
            VaccineRecord { locality: "A".into(), date: date(2021, 1, 1), doses: i64::MAX },
            VaccineRecord { locality: "A".into(), date: date(2021, 1, 2), doses: 1 },
        ])
        .unwrap();
        assert!(matches!(table.total_doses("A"), Err(SimError::CountOverflow(_))));
        assert!(matches!(table.total_doses_all(), Err(SimError::CountOverflow(_))));
    }

    #[test]
    fn test_case_record_extreme_counts_do_not_overflow() {
        let record = CaseRecord::new("A", date(2021, 3, 1), i64::MAX, 0);
        assert_eq!(record.recovered, (i128::from(i64::MAX) * 9 / 10) as i64);
        assert!(record.infected > 0);
    }

    #[test]
    fn test_parameter_table_lookup() {
        let params = RegionParameters { rho: 0.1, theta: 0.01, sigma: 0.07, kappa: 0.003 };
        let table = ParameterTable::from_regions([("A", params)]).unwrap();
        assert_eq!(table.require("A").unwrap(), &params);
        assert!(table.require("B").is_err());
        assert_eq!(table.len(), 1);
    }
}
