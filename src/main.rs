use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use trinketbot::config::Config;
use trinketbot::gateway::GatewayClient;
use trinketbot::listing::Publisher;
use trinketbot::rest::RestClient;
use trinketbot::runtime::Runtime;
use trinketbot::store::JsonFileStore;
use trinketbot::workflow::Engine;

#[tokio::main]
async fn main() -> trinketbot::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        forum = %config.forum_channel_id,
        panel = %config.panel_channel_id,
        "starting trinketbot"
    );

    let platform: Arc<dyn trinketbot::rest::Platform> = Arc::new(RestClient::new(&config)?);
    let store = JsonFileStore::new(config.data_dir.clone());
    let publisher = Publisher::new(platform.clone(), store, &config);
    let engine = Engine::new(platform.clone(), publisher, &config);

    let (gateway, events) = GatewayClient::new(&config).start();
    let runtime = Runtime::new(engine, platform);
    let loop_task = tokio::spawn(runtime.run(events));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    gateway.stop().await;
    if let Err(err) = loop_task.await {
        tracing::error!(error = %err, "event loop task failed");
    }

    Ok(())
}
