use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Filter comes from `TROLLEY_LOG`
/// (default `trolley=info,sqlx=warn`). Safe to call more than once; only
/// the first installation wins.
pub fn init() {
    let filter = std::env::var("TROLLEY_LOG").unwrap_or_else(|_| "trolley=info,sqlx=warn".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .try_init();
}
