//! Five-compartment epidemic model.
//!
//! Population fractions flow between Susceptible, Infected, Recovered,
//! Fatalities and Vaccinated:
//!
//! ```text
//! dS/dt = -ρ·S·I - V1
//! dI/dt =  ρ·(1-θ)·S·I - (σ+κ)·I
//! dR/dt =  σ·I
//! dF/dt =  ρ·θ·S·I + κ·I
//! dV/dt =  V1
//! ```
//!
//! The right-hand sides sum to zero, so `S+I+R+F+V` is conserved by the
//! exact flow. The model exposes that total to the Jidoka guard.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::parameters::ScenarioParameters;
use crate::config::VaccinatedInit;
use crate::engine::OdeSystem;
use crate::error::{SimError, SimResult};

/// Number of compartments.
pub const COMPARTMENTS: usize = 5;

/// One compartment of the model, in state-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compartment {
    /// Can still be infected.
    Susceptible,
    /// Currently infectious.
    Infected,
    /// Recovered from infection.
    Recovered,
    /// Deceased.
    Fatalities,
    /// Vaccinated.
    Vaccinated,
}

impl Compartment {
    /// All compartments in state-vector order.
    pub const ALL: [Self; COMPARTMENTS] = [
        Self::Susceptible,
        Self::Infected,
        Self::Recovered,
        Self::Fatalities,
        Self::Vaccinated,
    ];

    /// Position in the state vector.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Susceptible => 0,
            Self::Infected => 1,
            Self::Recovered => 2,
            Self::Fatalities => 3,
            Self::Vaccinated => 4,
        }
    }

    /// Display column name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Susceptible => "Susceptible Population",
            Self::Infected => "Infected with COVID-19",
            Self::Recovered => "Recovered from COVID-19",
            Self::Fatalities => "Fatalities",
            Self::Vaccinated => "Vaccinated Population",
        }
    }
}

/// The compartmental ODE with fixed rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompartmentModel {
    params: ScenarioParameters,
}

impl CompartmentModel {
    /// Create a model from validated rates.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if any rate is negative or non-finite.
    pub fn new(params: ScenarioParameters) -> SimResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Rates driving the model.
    #[must_use]
    pub const fn params(&self) -> &ScenarioParameters {
        &self.params
    }
}

impl OdeSystem<COMPARTMENTS> for CompartmentModel {
    #[allow(clippy::many_single_char_names)]
    fn derivatives(&self, _t: f64, y: &[f64; COMPARTMENTS]) -> [f64; COMPARTMENTS] {
        let ScenarioParameters {
            rho,
            theta,
            sigma,
            kappa,
            v1,
        } = self.params;
        let s = y[0];
        let i = y[1];
        let contact = rho * s * i;

        [
            -contact - v1,
            contact * (1.0 - theta) - (sigma + kappa) * i,
            sigma * i,
            contact * theta + kappa * i,
            v1,
        ]
    }

    fn component_names(&self) -> [&'static str; COMPARTMENTS] {
        ["S", "I", "R", "F", "V"]
    }

    fn invariant(&self, y: &[f64; COMPARTMENTS]) -> Option<f64> {
        Some(y.iter().sum())
    }
}

/// Aggregated counts for a scope on its latest report date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    /// Confirmed cases.
    pub confirmed: i64,
    /// Fatalities.
    pub fatalities: i64,
    /// Recovered.
    pub recovered: i64,
    /// Lifetime vaccine doses.
    pub doses: i64,
}

impl ScopeSnapshot {
    /// Active infections: `confirmed − fatalities − recovered`.
    #[must_use]
    pub const fn infected(&self) -> i64 {
        self.confirmed
            .saturating_sub(self.fatalities)
            .saturating_sub(self.recovered)
    }
}

/// Starting population fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    /// S at t=0.
    pub susceptible: f64,
    /// I at t=0.
    pub infected: f64,
    /// R at t=0.
    pub recovered: f64,
    /// F at t=0.
    pub fatalities: f64,
    /// V at t=0.
    pub vaccinated: f64,
}

impl InitialConditions {
    /// Derive fractions from a snapshot and the scope population.
    ///
    /// The susceptible fraction subtracts the *fractions* `I0`, `R0` and
    /// `doses/N` from the raw population before dividing, so it stays very
    /// close to one. Forecasts are calibrated against this definition.
    ///
    /// # Errors
    ///
    /// Returns `ZeroPopulation` if `population` is zero.
    pub fn from_snapshot(
        scope: &str,
        snapshot: &ScopeSnapshot,
        population: u64,
        vaccinated: VaccinatedInit,
    ) -> SimResult<Self> {
        if population == 0 {
            return Err(SimError::ZeroPopulation(scope.to_string()));
        }
        let n = population as f64;
        let infected = snapshot.infected() as f64 / n;
        let recovered = snapshot.recovered as f64 / n;
        let fatalities = snapshot.fatalities as f64 / n;
        let vaccinated_raw = snapshot.doses as f64 / n;
        let susceptible = (n - infected - recovered - vaccinated_raw) / n;

        Ok(Self {
            susceptible,
            infected,
            recovered,
            fatalities,
            vaccinated: match vaccinated {
                VaccinatedInit::Reset => 0.0,
                VaccinatedInit::Cumulative => vaccinated_raw,
            },
        })
    }

    /// State vector in compartment order.
    #[must_use]
    pub const fn to_state(&self) -> [f64; COMPARTMENTS] {
        [
            self.susceptible,
            self.infected,
            self.recovered,
            self.fatalities,
            self.vaccinated,
        ]
    }
}

/// `horizon` equally spaced points from 0 to `horizon` inclusive.
///
/// A horizon of one yields the single point 0.
#[must_use]
pub fn time_grid(horizon: usize) -> Vec<f64> {
    match horizon {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let end = horizon as f64;
            let step = end / (horizon - 1) as f64;
            (0..horizon)
                .map(|k| if k == horizon - 1 { end } else { k as f64 * step })
                .collect()
        }
    }
}

/// One output point of a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompartmentRow {
    /// Susceptible fraction.
    #[serde(rename = "Susceptible Population")]
    pub susceptible: f64,
    /// Infected fraction.
    #[serde(rename = "Infected with COVID-19")]
    pub infected: f64,
    /// Recovered fraction.
    #[serde(rename = "Recovered from COVID-19")]
    pub recovered: f64,
    /// Fatality fraction.
    #[serde(rename = "Fatalities")]
    pub fatalities: f64,
    /// Vaccinated fraction.
    #[serde(rename = "Vaccinated Population")]
    pub vaccinated: f64,
    /// Day offset from the forecast start.
    pub time: f64,
}

impl CompartmentRow {
    /// Build a row from a state vector.
    #[must_use]
    pub const fn from_state(time: f64, y: &[f64; COMPARTMENTS]) -> Self {
        Self {
            susceptible: y[0],
            infected: y[1],
            recovered: y[2],
            fatalities: y[3],
            vaccinated: y[4],
            time,
        }
    }

    /// Value of one compartment.
    #[must_use]
    pub const fn get(&self, compartment: Compartment) -> f64 {
        match compartment {
            Compartment::Susceptible => self.susceptible,
            Compartment::Infected => self.infected,
            Compartment::Recovered => self.recovered,
            Compartment::Fatalities => self.fatalities,
            Compartment::Vaccinated => self.vaccinated,
        }
    }

    /// `S+I+R+F+V`.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.susceptible + self.infected + self.recovered + self.fatalities + self.vaccinated
    }

    /// True if every value, time included, is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        Compartment::ALL
            .iter()
            .all(|&c| self.get(c).is_finite())
            && self.time.is_finite()
    }
}

/// A complete forecast, one row per output time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory {
    rows: Vec<CompartmentRow>,
}

impl Trajectory {
    /// Pair output times with integrated states.
    #[must_use]
    pub fn from_solution(times: &[f64], states: &[[f64; COMPARTMENTS]]) -> Self {
        Self {
            rows: times
                .iter()
                .zip(states)
                .map(|(&t, y)| CompartmentRow::from_state(t, y))
                .collect(),
        }
    }

    /// All rows in time order.
    #[must_use]
    pub fn rows(&self) -> &[CompartmentRow] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One compartment as a column.
    #[must_use]
    pub fn column(&self, compartment: Compartment) -> Vec<f64> {
        self.rows.iter().map(|r| r.get(compartment)).collect()
    }

    /// Output times.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.time).collect()
    }

    /// Initial state.
    #[must_use]
    pub fn initial_state(&self) -> Option<&CompartmentRow> {
        self.rows.first()
    }

    /// State at the end of the horizon.
    #[must_use]
    pub fn final_state(&self) -> Option<&CompartmentRow> {
        self.rows.last()
    }

    /// Row with the largest infected fraction (earliest on ties).
    #[must_use]
    pub fn peak_infection(&self) -> Option<&CompartmentRow> {
        self.rows.iter().fold(None, |best, row| match best {
            Some(b) if b.infected >= row.infected => Some(b),
            _ => Some(row),
        })
    }

    /// Write the forecast as CSV with display column names.
    ///
    /// # Errors
    ///
    /// Returns `Csv` or `Io` if writing fails.
    pub fn write_csv<W: Write>(&self, writer: W) -> SimResult<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write the forecast to a CSV file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be created, `Csv` if writing fails.
    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> SimResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)
    }
}
