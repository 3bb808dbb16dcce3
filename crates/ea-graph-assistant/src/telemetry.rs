use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Filtering follows `RUST_LOG` (default
/// `info`); set `RUST_LOG=ea_graph_assistant=debug` to see prompts and
/// generated queries. A second call is a no-op.
pub fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_level(true)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
