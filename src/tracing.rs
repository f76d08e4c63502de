use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Installs the global fmt subscriber for the sync binary.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies. Request urls
/// carrying the Steam key are masked before they reach any log call, so no
/// redaction layer is installed here.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(f) => (f, true),
        Err(_) => (EnvFilter::new(default_filter), false),
    };

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))?;

    tracing::debug!(from_env, default_filter, "tracing initialized");
    Ok(())
}
