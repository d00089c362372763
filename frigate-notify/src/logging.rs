//! Process-wide log subscriber.
//!
//! Components never touch global state themselves: they receive a
//! [`tracing::Span`] at construction and log under it. This module installs
//! the one subscriber the binary uses.

use chrono::Local;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "frigate_notify=info,frigate_stream=info";

/// Filter used when `debug = true`.
pub const DEBUG_LOG_FILTER: &str = "frigate_notify=debug,frigate_stream=debug";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Default filter directive for the given debug flag.
pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        DEBUG_LOG_FILTER
    } else {
        DEFAULT_LOG_FILTER
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging(debug: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .try_init()
        .map_err(|e| Error::other(format!("Failed to set global default subscriber: {}", e)))
}
