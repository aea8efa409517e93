use stubby_url::{api, config};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    config::init_tracing();

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded environment from file"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!(?err, "Failed to load .env file"),
    }

    let settings = config::Settings::from_env()?;
    let addr = settings.addr.clone();
    let container = config::init_container(settings).await?;

    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "Started listening on TCP");
    axum::serve(listener, api::router(container)).await?;
    Ok(())
}
