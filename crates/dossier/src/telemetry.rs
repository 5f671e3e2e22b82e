//! Tracing setup. Call once at startup; repeated calls are no-ops.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber: env-filtered fmt output, with `log`
/// records (rusqlite and friends) bridged into tracing.
pub fn init_tracing() {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
