//! Domain engines built on the normalized tables.
//!
//! - Forecast: epidemic trajectory for the territory or one region
//! - Allocation: importance scoring, stockpile apportionment, priority tiers

pub mod allocation;
pub mod forecast;

pub use allocation::{
    allocate, growth_rate, AllocationEngine, AllocationRow, AllocationTable, Priority,
    RegionScore, Stockpile,
};
pub use forecast::{simulate, RegionScope, Simulator};
