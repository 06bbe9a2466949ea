//! # vaxsim
//!
//! Regional epidemic forecasting and vaccine stockpile allocation.
//!
//! Two batch engines share one set of normalized input tables:
//! - Forecast: a five-compartment ODE (S, I, R, F, V) integrated with
//!   adaptive Dormand-Prince under a Jidoka guard
//! - Allocation: importance scores from recent case growth, proportional
//!   apportionment of a stockpile, and priority tiers
//!
//! ## Example
//!
//! ```rust
//! use vaxsim::prelude::*;
//!
//! let config = VaxConfig::builder()
//!     .vaccinated_init(VaccinatedInit::Cumulative)
//!     .lookback_months(3)
//!     .build();
//!
//! let scenario: Scenario = "adverse".parse().unwrap();
//! assert_eq!(scenario, Scenario::Named(NamedScenario::Adverse));
//! assert!(config.check().is_ok());
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops,  // Formulas are written as published
    clippy::imprecise_flops,
    clippy::too_many_lines,
    clippy::missing_const_for_fn,
    clippy::needless_range_loop,
)]

pub mod config;
pub mod data;
pub mod domains;
pub mod engine;
pub mod error;
pub mod scenarios;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{
        AllocationConfig, SimulationConfig, TierPolicy, VaccinatedInit, VaxConfig,
        VaxConfigBuilder,
    };
    pub use crate::data::{Datasets, RawDatasets, RawTable};
    pub use crate::domains::{
        allocate, simulate, AllocationEngine, AllocationTable, Priority, RegionScope, Simulator,
        Stockpile,
    };
    pub use crate::engine::{DormandPrince, JidokaConfig, JidokaGuard};
    pub use crate::error::{ErrorKind, SimError, SimResult};
    pub use crate::scenarios::{
        Compartment, CustomParameters, NamedScenario, Scenario, Trajectory,
    };
}

/// Re-export for public API
pub use error::{SimError, SimResult};
