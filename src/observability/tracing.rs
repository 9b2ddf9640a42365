use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        tracing::warn!("Tracing subscriber already installed: {}", e);
    }
}

pub fn trace_source_update(source_id: &str) -> Span {
    tracing::info_span!(
        "source_update",
        source_id = %source_id,
    )
}

pub fn trace_refresh_read(source_id: Option<&str>, pair: Option<&str>) -> Span {
    tracing::debug_span!(
        "refresh_read",
        source_id = ?source_id,
        pair = ?pair,
    )
}
