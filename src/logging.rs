use tracing::level_filters::LevelFilter;

/// Installs the process-wide subscriber. Level comes from `COURIER_LOG`
/// (e.g. `debug`), defaulting to info. Safe to call more than once; later
/// calls keep the first subscriber.
pub fn init() {
    let filter = std::env::var("COURIER_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
