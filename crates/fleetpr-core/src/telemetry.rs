//! Log output of the `fleetpr` binary.
//!
//! Scan progress, batch steps and per-repository warnings are tracing events
//! and go to stderr. Scan listings, PR URLs and summaries are printed to
//! stdout, so `fleetpr scan > release.txt` captures only the results.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `level` applies when `RUST_LOG` is unset (`--verbose` maps to `DEBUG`).
/// With `json`, every event including the `scan.*`/`batch.*` lifecycle
/// events is one JSON object per line. A second call keeps the first
/// subscriber.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
