//! Log subscriber setup.

use tracing_subscriber::EnvFilter;

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `debug` selects
/// `earshot=debug,info` and anything else plain `info`. Returns `false` if
/// a subscriber was already installed.
pub fn init_logging(debug: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(debug));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}

fn default_directives(debug: bool) -> &'static str {
    if debug { "earshot=debug,info" } else { "info" }
}

fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::new(default_directives(debug))
}
