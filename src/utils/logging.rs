/// Initialize tracing/logging for the relay.
///
/// Maps `default_level` onto a `tracing::Level`; unknown strings fall back to INFO.
pub fn init(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(parse_level(default_level))
        .with_target(false)
        .try_init();
}

pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" | "warning" => tracing::Level::WARN,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    }
}
