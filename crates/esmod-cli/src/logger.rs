//! Logging setup on the tracing stack.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global subscriber.
///
/// The level comes from `--log-level`; the `dev` command forces debug for
/// the esmod crates. A set `RUST_LOG` overrides both.
pub fn init(level: &str, dev: bool) {
    let default_filter = if dev {
        "esmod_engine=debug,esmod_cli=debug".to_string()
    } else {
        format!("esmod_engine={level},esmod_cli={level}")
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
