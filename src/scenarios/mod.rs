//! Epidemic scenarios.
//!
//! - [`parameters`]: named and custom scenarios and their resolution into rates
//! - [`epidemic`]: the five-compartment model and its trajectory type

pub mod epidemic;
pub mod parameters;

pub use epidemic::{
    time_grid, Compartment, CompartmentModel, CompartmentRow, InitialConditions, ScopeSnapshot,
    Trajectory,
};
pub use parameters::{
    CustomParameters, NamedScenario, Scenario, ScenarioParameters, ScenarioResolver,
};
