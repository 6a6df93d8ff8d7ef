//! Development-time tracing for debugging the pipeline.
//!
//! Tracing output goes to stderr and is never part of the pipeline's product
//! output (agent transcripts and gate logs are printed to stdout by the CLI).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG` when set; otherwise defaults to `info`, or `debug` when
/// `verbose` is requested. Output: stderr, compact format.
pub fn init(verbose: bool) {
    let default = if verbose { "redgreen=debug" } else { "redgreen=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
