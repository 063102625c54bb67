//! Shared configuration types for the storage driver.

mod base;
mod driver;

pub use base::ValidationError;
pub use driver::{DriverConfig, DriverConfigWithoutSecrets, PreviewConfig};
