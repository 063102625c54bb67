//! Tracing setup for binaries and tests embedding the driver.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::driver_error;
use crate::error::{DriverResult, ErrorKind};

/// Installs a global subscriber printing driver events.
///
/// `RUST_LOG` takes precedence over `default_directive`, e.g. `driver=info`. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(default_directive: &str) -> DriverResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|err| {
            driver_error!(
                ErrorKind::ConfigError,
                "Tracing initialization failed",
                err.to_string(),
                source: err
            )
        })
}

/// Enables tracing output in tests when `ENABLE_TRACING` is set.
#[cfg(any(test, feature = "test-utils"))]
pub fn init_test_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();

    INIT.call_once(|| {
        if std::env::var_os("ENABLE_TRACING").is_some() {
            let _ = init_tracing("driver=debug");
        }
    });
}
