//! Tracing subscriber for the node.
//!
//! Everything goes to stderr; stdout carries the `config` subcommand's JSON.
//! `RUST_LOG` wins over `--log-level` when both are set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use umbra_protocol::Address;

/// Crates whose level a bare `--log-level` sets.
const VAULT_TARGETS: [&str; 3] = ["umbra_node", "umbra_protocol", "umbra_adapters"];

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line, event fields flattened.
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else is pretty.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Filter directives for `level`.
///
/// A bare level such as `debug` is scoped to the vault crates, with
/// dependencies at `warn` and HTTP request spans at `info`. Anything
/// containing `=` or `,` is already a directive list and passes through.
pub fn directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let mut out = vec!["warn".to_string(), "tower_http=info".to_string()];
    out.extend(VAULT_TARGETS.iter().map(|target| format!("{target}={level}")));
    out.join(",")
}

/// Installs the global subscriber. Call once, before anything logs.
pub fn init_logging(level: &str, format: LogFormat, vault: &Address) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(level)));
    let shown = filter.to_string();

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    tracing::info!(target: "umbra_node::logging", %vault, ?format, filter = %shown, "logging initialized");
}
