//! Untyped tabular input.
//!
//! A [`RawTable`] is a header row plus string cells, exactly as delivered by
//! the data-refresh layer. Normalization into typed tables happens in
//! [`super::normalize`].

use std::io::Read;
use std::path::Path;

use crate::error::{SimError, SimResult};

/// A header plus rows of string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a table from in-memory headers and rows.
    #[must_use]
    pub fn new<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// Build a header-less table; columns are named `0`, `1`, ...
    #[must_use]
    pub fn headerless<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            headers: (0..width).map(|i| i.to_string()).collect(),
            rows,
        }
    }

    /// Parse CSV from any reader.
    ///
    /// With `has_headers == false` the columns are named `0`, `1`, ...
    ///
    /// # Errors
    ///
    /// Returns `Csv` if the input is not well-formed CSV.
    pub fn from_csv_reader<R: Read>(reader: R, has_headers: bool) -> SimResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        if has_headers {
            let headers = csv_reader
                .headers()?
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}').to_string())
                .collect::<Vec<_>>();
            Ok(Self { headers, rows })
        } else {
            Ok(Self::headerless(rows))
        }
    }

    /// Parse a CSV file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be opened, `Csv` if it cannot be parsed.
    pub fn from_path<P: AsRef<Path>>(path: P, has_headers: bool) -> SimResult<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file, has_headers)
    }

    /// Column headers.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by exact (trimmed) header name.
    ///
    /// # Errors
    ///
    /// Returns `MissingColumn` if no header matches.
    pub fn column(&self, table: &str, name: &str) -> SimResult<usize> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| SimError::missing_column(table, name))
    }

    /// Cell at `(row, column)`; short rows yield an empty string.
    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map_or("", String::as_str)
    }
}
