use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

/// ENV used to set the log level.
pub const FILTER_ENV: &str = "MEC_LOG";

/// Default log level when neither the environment nor the config sets one.
pub const DEFAULT_FILTER_LEVEL: &str = "info";

static INIT: Once = Once::new();

/// Install the global subscriber. Only the first call has any effect.
///
/// The filter comes from `MEC_LOG`, then `config_filter`, then `info`.
pub fn init(config_filter: Option<&str>) {
    INIT.call_once(|| {
        let directives = filter_directives(std::env::var(FILTER_ENV).ok(), config_filter);
        let filter = EnvFilter::try_new(&directives)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER_LEVEL));
        let _ = fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    });
}

fn filter_directives(env: Option<String>, config_filter: Option<&str>) -> String {
    env.filter(|s| !s.trim().is_empty())
        .or_else(|| config_filter.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_FILTER_LEVEL.to_string())
}
