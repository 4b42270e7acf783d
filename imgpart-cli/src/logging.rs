// SPDX-License-Identifier: GPL-3.0-only

use imgpart::LoggingLevel;
use tracing_subscriber::EnvFilter;

/// Log to stderr so stdout stays parseable. `RUST_LOG` overrides `level`.
pub(crate) fn init(level: LoggingLevel) {
    let directive = filter_directive(level, std::env::var(EnvFilter::DEFAULT_ENV).ok());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(level.as_directive())),
        )
        .init();
}

fn filter_directive(level: LoggingLevel, rust_log: Option<String>) -> String {
    rust_log
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| level.as_directive().to_string())
}
