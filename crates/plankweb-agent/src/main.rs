//! PlankWeb: protein binding-site analysis server
//! Entry point for the `plankweb` binary.

mod services;

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plankweb=debug,info")),
        )
        .init();

    info!("PlankWeb starting up, version {}", env!("CARGO_PKG_VERSION"));

    let config = plankweb_config::Config::load_or_default()?;
    info!(
        storage = ?config.storage.root,
        public_url = %config.storage.public_url,
        persistent_ids = config.identity.persistent,
        "Configuration ready"
    );

    let services = services::Services::build(&config).await?;
    info!(tasks = ?services.backend_tasks, "Backend queues running");

    let router = services::app(&config, services.state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Listening on http://{}", config.server.bind);
    info!("   Submit jobs:  POST /api/jobs");
    info!("   Task status:  GET  /api/status/{{task}}/{{job_id}}");
    info!("   Input files:  {}", config.storage.public_url);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await?;

    Ok(())
}
