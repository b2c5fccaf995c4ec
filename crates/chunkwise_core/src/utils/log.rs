use tracing_subscriber::{fmt, EnvFilter};

/// Installs a fmt subscriber filtered by `RUST_LOG`. Calling it more than once
/// is harmless, so every test may call it.
pub fn enable_tracing_by_env() {
    if std::env::var("RUST_LOG").is_err() {
        return;
    }
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
