//! Log setup for the `linkshelf` binary.
//!
//! The CLI prints its results on stdout: freshly issued tokens, one JSON
//! object per link, purge counts. Scripts capture that stream, so every log
//! line goes to stderr instead and `linkshelf login alice pw > token` never
//! picks up a log record. `RUST_LOG` takes precedence over the built-in
//! filter.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset or unparsable, e.g.
/// `"linkshelf=info,linkshelf_backend=info"`. With `log_json` each record is
/// a JSON line, for log shippers reading the process's stderr.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    if log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
