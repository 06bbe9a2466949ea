//! Raw-to-canonical table normalization.
//!
//! Each function keeps only the columns the engines use, renames them,
//! parses dates and numbers, and sorts dated tables newest first. Missing
//! columns, unparsable cells and empty tables are errors.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use super::{
    CaseRecord, CaseTable, ParameterTable, PopulationTable, RawTable, RegionParameters,
    VaccineRecord, VaccineTable,
};
use crate::error::{SimError, SimResult};

/// Source column names of the raw case table.
pub mod case_columns {
    /// Report date.
    pub const DATE: &str = "Report Date";
    /// Region name.
    pub const LOCALITY: &str = "Locality";
    /// Cumulative confirmed cases.
    pub const CONFIRMED: &str = "Total Cases";
    /// Cumulative deaths.
    pub const FATALITIES: &str = "Deaths";
}

/// Source column names of the raw vaccine table.
pub mod vaccine_columns {
    /// Administration date.
    pub const DATE: &str = "Administration Date";
    /// Region name.
    pub const LOCALITY: &str = "Locality";
    /// Doses administered.
    pub const DOSES: &str = "Vaccine Doses Administered Count";
}

/// Column names of the parameter table.
pub mod parameter_columns {
    /// Region name.
    pub const LOCALITY: &str = "locality";
    /// Transmission rate.
    pub const RHO: &str = "rho";
    /// Fatality-split fraction.
    pub const THETA: &str = "theta";
    /// Recovery rate.
    pub const SIGMA: &str = "sigma";
    /// Disease-induced death rate.
    pub const KAPPA: &str = "kappa";
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Normalize the raw case table.
///
/// # Errors
///
/// `MissingColumn`, `InvalidDate`, `InvalidNumber` or `EmptyTable`.
pub fn cases(raw: &RawTable) -> SimResult<CaseTable> {
    let table = CaseTable::NAME;
    let date_col = raw.column(table, case_columns::DATE)?;
    let locality_col = raw.column(table, case_columns::LOCALITY)?;
    let confirmed_col = raw.column(table, case_columns::CONFIRMED)?;
    let fatalities_col = raw.column(table, case_columns::FATALITIES)?;

    let mut records = Vec::with_capacity(raw.len());
    for row in 0..raw.len() {
        let locality = parse_region(table, row, raw.cell(row, locality_col))?;
        let date = parse_date(table, row, raw.cell(row, date_col))?;
        let count =
            |column: &str, index: usize| parse_count(table, row, column, raw.cell(row, index));
        let confirmed = count(case_columns::CONFIRMED, confirmed_col)?;
        let fatalities = count(case_columns::FATALITIES, fatalities_col)?;
        records.push(CaseRecord::new(locality, date, confirmed, fatalities));
    }

    let normalized = CaseTable::from_records(records)?;
    debug!(rows = normalized.records().len(), "normalized case table");
    Ok(normalized)
}

/// Normalize the raw vaccine administration table.
///
/// # Errors
///
/// `MissingColumn`, `InvalidDate`, `InvalidNumber` or `EmptyTable`.
pub fn vaccines(raw: &RawTable) -> SimResult<VaccineTable> {
    let table = VaccineTable::NAME;
    let date_col = raw.column(table, vaccine_columns::DATE)?;
    let locality_col = raw.column(table, vaccine_columns::LOCALITY)?;
    let doses_col = raw.column(table, vaccine_columns::DOSES)?;

    let mut records = Vec::with_capacity(raw.len());
    for row in 0..raw.len() {
        records.push(VaccineRecord {
            locality: parse_region(table, row, raw.cell(row, locality_col))?,
            date: parse_date(table, row, raw.cell(row, date_col))?,
            doses: parse_count(table, row, vaccine_columns::DOSES, raw.cell(row, doses_col))?,
        });
    }

    let normalized = VaccineTable::from_records(records)?;
    debug!(rows = normalized.records().len(), "normalized vaccine table");
    Ok(normalized)
}

/// Normalize the header-less population table (`locality, population`).
///
/// # Errors
///
/// `MissingColumn` if a row has fewer than two cells, `InvalidNumber`,
/// `ZeroPopulation`, `DuplicateRegion` or `EmptyTable`.
pub fn populations(raw: &RawTable) -> SimResult<PopulationTable> {
    let table = PopulationTable::NAME;
    if raw.headers().len() < 2 {
        return Err(SimError::missing_column(table, "population"));
    }

    let mut regions = Vec::with_capacity(raw.len());
    for row in 0..raw.len() {
        let name = parse_region(table, row, raw.cell(row, 0))?;
        let population = parse_count(table, row, "population", raw.cell(row, 1))?;
        regions.push((name, population.unsigned_abs()));
    }

    let normalized = PopulationTable::from_regions(regions)?;
    debug!(regions = normalized.len(), "normalized population table");
    Ok(normalized)
}

/// Normalize the per-region parameter table.
///
/// # Errors
///
/// `MissingColumn`, `InvalidNumber` (including negative or non-finite
/// rates), `DuplicateRegion` or `EmptyTable`.
pub fn parameters(raw: &RawTable) -> SimResult<ParameterTable> {
    let table = ParameterTable::NAME;
    let locality_col = raw.column(table, parameter_columns::LOCALITY)?;
    let rho_col = raw.column(table, parameter_columns::RHO)?;
    let theta_col = raw.column(table, parameter_columns::THETA)?;
    let sigma_col = raw.column(table, parameter_columns::SIGMA)?;
    let kappa_col = raw.column(table, parameter_columns::KAPPA)?;

    let mut regions = Vec::with_capacity(raw.len());
    for row in 0..raw.len() {
        let locality = parse_region(table, row, raw.cell(row, locality_col))?;
        let rate =
            |column: &str, index: usize| parse_rate(table, row, column, raw.cell(row, index));
        let params = RegionParameters {
            rho: rate(parameter_columns::RHO, rho_col)?,
            theta: rate(parameter_columns::THETA, theta_col)?,
            sigma: rate(parameter_columns::SIGMA, sigma_col)?,
            kappa: rate(parameter_columns::KAPPA, kappa_col)?,
        };
        regions.push((locality, params));
    }

    let normalized = ParameterTable::from_regions(regions)?;
    debug!(regions = normalized.len(), "normalized parameter table");
    Ok(normalized)
}

/// Parse a date cell in any of the accepted spellings.
///
/// # Errors
///
/// Returns `InvalidDate` if no format matches.
pub fn parse_date(table: &str, row: usize, value: &str) -> SimResult<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
        .ok_or_else(|| SimError::InvalidDate {
            table: table.to_string(),
            row,
            value: value.to_string(),
        })
}

/// Largest count any table may hold.
pub const MAX_COUNT: i64 = 9_000_000_000_000_000;

/// Parse a non-negative whole count up to [`MAX_COUNT`], tolerating
/// thousands separators and integral decimals such as `12.0`.
///
/// # Errors
///
/// Returns `InvalidNumber` for blank, fractional, negative, oversized or
/// non-numeric cells.
pub fn parse_count(table: &str, row: usize, column: &str, value: &str) -> SimResult<i64> {
    let invalid = || SimError::InvalidNumber {
        table: table.to_string(),
        row,
        column: column.to_string(),
        value: value.to_string(),
    };

    let cleaned: String = value.trim().chars().filter(|c| *c != ',').collect();
    let count = match cleaned.parse::<i64>() {
        Ok(count) => count,
        Err(_) => {
            let float: f64 = cleaned.parse().map_err(|_| invalid())?;
            if !float.is_finite() || float.fract() != 0.0 || float.abs() > MAX_COUNT as f64 {
                return Err(invalid());
            }
            float as i64
        }
    };

    if !(0..=MAX_COUNT).contains(&count) {
        return Err(invalid());
    }
    Ok(count)
}

fn parse_region(table: &str, row: usize, value: &str) -> SimResult<String> {
    let name = value.trim();
    if name.is_empty() {
        return Err(SimError::BlankRegion {
            table: table.to_string(),
            row,
        });
    }
    Ok(name.to_string())
}

fn parse_rate(table: &str, row: usize, column: &str, value: &str) -> SimResult<f64> {
    match value.trim().parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate >= 0.0 => Ok(rate),
        _ => Err(SimError::InvalidNumber {
            table: table.to_string(),
            row,
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn raw_cases() -> RawTable {
        RawTable::new(
            [
                "Report Date",
                "FIPS",
                "Locality",
                "VDH Health District",
                "Total Cases",
                "Hospitalizations",
                "Deaths",
            ],
            [
                vec!["01/15/2021", "51001", "Accomack", "Eastern Shore", "1,000", "80", "20"],
                vec!["03/01/2021", "51001", "Accomack", "Eastern Shore", "2000", "95", "30"],
                vec!["2021-02-01", "51003", "Albemarle", "Blue Ridge", "500", "10", "5"],
            ],
        )
    }

    fn raw_vaccines() -> RawTable {
        RawTable::new(
            [
                "Administration Date",
                "FIPS",
                "Locality",
                "Health District",
                "Facility Type",
                "Vaccine Manufacturer",
                "Dose Number",
                "Vaccine Doses Administered Count",
            ],
            [
                vec![
                    "12/20/2020",
                    "51001",
                    "Accomack",
                    "Eastern Shore",
                    "Hospital",
                    "Pfizer",
                    "1",
                    "12",
                ],
                vec![
                    "01/05/2021",
                    "51001",
                    "Accomack",
                    "Eastern Shore",
                    "Pharmacy",
                    "Moderna",
                    "1",
                    "30",
                ],
            ],
        )
    }

    #[test]
    fn test_cases_renamed_sorted_and_derived() {
        let table = cases(&raw_cases()).unwrap();
        let records = table.records();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());
        assert_eq!(records[0].locality, "Accomack");
        assert_eq!(records[0].confirmed, 2000);
        assert_eq!(records[0].recovered, 1800);
        assert_eq!(records[0].infected, 170);
        assert_eq!(records[2].confirmed, 1000);
    }

    #[test]
    fn test_cases_missing_column() {
        let raw = RawTable::new(
            ["Report Date", "Locality", "Total Cases"],
            [vec!["2021-01-01", "A", "1"]],
        );
        let err = cases(&raw).unwrap_err();
        assert!(matches!(err, SimError::MissingColumn { ref column, .. } if column == "Deaths"));
    }

    #[test]
    fn test_cases_empty_table() {
        let raw = RawTable::new(
            ["Report Date", "Locality", "Total Cases", "Deaths"],
            Vec::<Vec<String>>::new(),
        );
        assert!(matches!(cases(&raw), Err(SimError::EmptyTable { .. })));
    }

    #[test]
    fn test_cases_bad_date() {
        let raw = RawTable::new(
            ["Report Date", "Locality", "Total Cases", "Deaths"],
            [vec!["sometime in March", "A", "1", "0"]],
        );
        let err = cases(&raw).unwrap_err();
        assert!(matches!(err, SimError::InvalidDate { row: 0, .. }));
    }

    #[test]
    fn test_cases_bad_count() {
        let raw = RawTable::new(
            ["Report Date", "Locality", "Total Cases", "Deaths"],
            [vec!["2021-01-01", "A", "", "0"]],
        );
        assert!(matches!(cases(&raw), Err(SimError::InvalidNumber { .. })));
    }

    #[test]
    fn test_cases_oversized_count_rejected() {
        let raw = RawTable::new(
            ["Report Date", "Locality", "Total Cases", "Deaths"],
            [vec!["2021-01-01", "A", "2000000000000000000", "0"]],
        );
        let err = cases(&raw).unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidNumber { ref column, row: 0, .. } if column == "Total Cases"
        ));
    }

    #[test]
    fn test_blank_region_rejected_in_every_table() {
        let raw = RawTable::new(
            ["Report Date", "Locality", "Total Cases", "Deaths"],
            [vec!["2021-01-01", "A", "10", "0"], vec!["2021-01-01", "  ", "10", "0"]],
        );
        assert!(matches!(cases(&raw), Err(SimError::BlankRegion { row: 1, .. })));

        let raw = RawTable::new(
            ["Administration Date", "Locality", "Vaccine Doses Administered Count"],
            [vec!["2021-01-01", "", "5"]],
        );
        assert!(matches!(vaccines(&raw), Err(SimError::BlankRegion { row: 0, .. })));

        let raw = RawTable::headerless([vec!["Accomack", "32316"], vec!["", "100"]]);
        assert!(matches!(populations(&raw), Err(SimError::BlankRegion { row: 1, .. })));

        let raw = RawTable::new(
            ["locality", "rho", "theta", "sigma", "kappa"],
            [vec!["", "0.1", "0.007", "0.07", "0.0036"]],
        );
        assert!(matches!(parameters(&raw), Err(SimError::BlankRegion { row: 0, .. })));
    }

    #[test]
    fn test_short_row_has_blank_region() {
        let raw = RawTable::new(
            ["Report Date", "Total Cases", "Deaths", "Locality"],
            [vec!["2021-01-01", "10", "0"]],
        );
        assert!(matches!(cases(&raw), Err(SimError::BlankRegion { row: 0, .. })));
    }

    #[test]
    fn test_vaccines_normalized() {
        let table = vaccines(&raw_vaccines()).unwrap();
        assert_eq!(table.records()[0].doses, 30);
        assert_eq!(table.total_doses("Accomack").unwrap(), 42);
    }

    #[test]
    fn test_populations_headerless() {
        let raw = RawTable::headerless([vec!["Accomack", "32316"], vec!["Albemarle", "109,330"]]);
        let table = populations(&raw).unwrap();
        assert_eq!(table.require("Albemarle").unwrap(), 109_330);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_populations_single_column_rejected() {
        let raw = RawTable::headerless([vec!["Accomack"]]);
        assert!(matches!(
            populations(&raw),
            Err(SimError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_parameters_normalized() {
        let raw = RawTable::new(
            ["locality", "rho", "theta", "sigma", "kappa"],
            [vec!["Accomack", "0.1", "0.007", "0.07", "0.0036"]],
        );
        let table = parameters(&raw).unwrap();
        let p = table.require("Accomack").unwrap();
        assert!((p.rho - 0.1).abs() < f64::EPSILON);
        assert!((p.kappa - 0.0036).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parameters_negative_rate_rejected() {
        let raw = RawTable::new(
            ["locality", "rho", "theta", "sigma", "kappa"],
            [vec!["Accomack", "-0.1", "0.007", "0.07", "0.0036"]],
        );
        assert!(matches!(
            parameters(&raw),
            Err(SimError::InvalidNumber { ref column, .. }) if column == "rho"
        ));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 7).unwrap();
        for value in [
            "2021-03-07",
            "03/07/2021",
            "2021/03/07",
            "2021-03-07T00:00:00.000",
            "2021-03-07T13:45:00",
            "03/07/2021 12:00:00 AM",
            "2021-03-07T00:00:00Z",
        ] {
            assert_eq!(parse_date("t", 0, value).unwrap(), expected, "{value}");
        }
    }

    #[test]
    fn test_parse_count_variants() {
        assert_eq!(parse_count("t", 0, "c", "1,234").unwrap(), 1234);
        assert_eq!(parse_count("t", 0, "c", " 12.0 ").unwrap(), 12);
        assert!(parse_count("t", 0, "c", "12.5").is_err());
        assert!(parse_count("t", 0, "c", "-3").is_err());
        assert!(parse_count("t", 0, "c", "NaN").is_err());
        assert!(parse_count("t", 0, "c", "").is_err());
        assert_eq!(parse_count("t", 0, "c", "9,000,000,000,000,000").unwrap(), MAX_COUNT);
        assert!(parse_count("t", 0, "c", "9000000000000001").is_err());
        assert!(parse_count("t", 0, "c", "2e18").is_err());
    }
}
