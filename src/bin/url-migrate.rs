use anyhow::Context;
use stubby_url::config;
use tracing::info;

/// Applies pending schema migrations and exits, for deployments that
/// migrate before rolling out new servers.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    config::init_tracing();

    let settings = config::Settings::from_env().context("Failed to load settings")?;
    config::init_container(settings)
        .await
        .context("Failed to migrate database")?;

    info!("Database is up to date");
    Ok(())
}
