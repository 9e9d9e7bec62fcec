//! Logging setup for the relay and driver binaries.
//!
//! Filters resolve in order: `RIDELINK_LOG`, then `RUST_LOG`, then the
//! component's own default built from the configured level. Output always
//! goes to stderr so the driver can print offers and locations on stdout.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Binary whose logs are being configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Relay,
    Driver,
}

impl Component {
    /// Target name of the component's crate.
    pub const fn target(self) -> &'static str {
        match self {
            Self::Relay => "ridelink_relay",
            Self::Driver => "ridelink_driver",
        }
    }

    /// Default directives: the component and core at `level`, everything
    /// else at `warn`.
    pub fn default_directives(self, level: &str) -> String {
        format!("warn,{}={level},ridelink_core={level}", self.target())
    }
}

/// Picks the filter string. Blank env values count as unset.
fn resolve_directives(
    component: Component,
    level: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    ["RIDELINK_LOG", "RUST_LOG"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .find(|val| !val.trim().is_empty())
        .unwrap_or_else(|| component.default_directives(level))
}

fn build_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| Error::Config(format!("invalid log filter {directives:?}: {e}")))
}

/// Installs the global subscriber for `component`.
///
/// `level` is the configured default (`info`, `debug`, ...). With `json`,
/// each event is one JSON line. Fails on a malformed filter or when a
/// subscriber is already installed.
pub fn init_tracing(component: Component, level: &str, json: bool) -> Result<()> {
    let directives = resolve_directives(component, level, |key| std::env::var(key).ok());
    let filter = build_filter(&directives)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.map_err(|e| Error::Config(format!("logging already initialised: {e}")))
}
