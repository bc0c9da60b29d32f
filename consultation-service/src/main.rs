use consultation_service::{ServiceConfig, create_app};
use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Bad model settings stop the service here, before any session exists
    let config = ServiceConfig::from_env()?;
    let port = config.port;
    info!(
        "Model {} at {}, corpora under {}",
        config.model.model,
        config.model.endpoint(),
        config.retrieval.data_dir.display()
    );

    let app = create_app(config).await?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    let addr = listener.local_addr()?;

    info!("Consultation Simulation Service starting on {}", addr);
    info!("API Documentation available at http://{}/", addr);
    info!("Health check endpoint: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
