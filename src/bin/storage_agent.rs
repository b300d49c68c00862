use tracing::info;

use postgres_volume_operator::agent::{AgentConfig, run_agent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("postgres_volume_operator=info".parse()?),
        )
        .init();

    let config = AgentConfig::from_env()?;
    info!(
        instance = %config.instance,
        data_mount = %config.data_mount.display(),
        "Starting storage agent"
    );

    run_agent(config).await?;
    Ok(())
}
