//! Configuration for the BigQuery storage driver.
//!
//! Holds the runtime [`Environment`], the layered configuration loader and the shared
//! configuration types consumed by the driver crate.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
