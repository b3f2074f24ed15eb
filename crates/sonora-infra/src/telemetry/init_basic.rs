use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sonora_core::ProcessingConfig;

/// Initialize tracing with an `EnvFilter` (`RUST_LOG`, default `sonora=info`).
///
/// Production environments get JSON lines; everything else the human-readable format.
pub fn init_telemetry(
    service_name: &str,
    config: &ProcessingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "sonora=info".into());
    let json = config.is_production();

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
    }

    tracing::info!(
        service = %service_name,
        environment = %config.environment,
        json_logs = json,
        "Tracing initialized"
    );
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}
