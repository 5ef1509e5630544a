//! Wires stores, backends, queues and the orchestrator from configuration.

use anyhow::Context;
use axum::Router;
use plankweb_backends::{standard_registry, BackendContext};
use plankweb_common::fetch::{FetchClient, DEFAULT_ALLOWLIST};
use plankweb_common::TaskName;
use plankweb_config::Config;
use plankweb_dispatch::QueueDispatcher;
use plankweb_orchestrator::{InputMaterializer, Orchestrator, OrchestratorPool, OrchestratorSettings};
use plankweb_store::{
    ArtifactStore, FileIdentityStore, FsStatusTracker, IdentityStore, InMemoryIdentityStore, ResultAggregator,
    StatusTracker, StoreLayout,
};
use plankweb_web::AppState;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{info, warn};

pub struct Services {
    pub state: AppState,
    pub backend_tasks: Vec<TaskName>,
}

impl Services {
    /// Must be called inside a tokio runtime: queues and the pool spawn workers.
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let layout = StoreLayout::new(&config.storage.root);
        tokio::fs::create_dir_all(layout.root())
            .await
            .with_context(|| format!("creating storage root {:?}", layout.root()))?;

        let identity: Arc<dyn IdentityStore> = if config.identity.persistent {
            Arc::new(FileIdentityStore::open(&config.identity.path).await?)
        } else {
            warn!("Identity store is in memory; job ids will not survive a restart");
            Arc::new(InMemoryIdentityStore::new())
        };
        let tracker: Arc<dyn StatusTracker> = Arc::new(FsStatusTracker::new(layout.clone()));
        let artifacts = Arc::new(ArtifactStore::new(layout, config.storage.public_url.clone()));

        let hosts = DEFAULT_ALLOWLIST
            .iter()
            .map(|h| h.to_string())
            .chain(config.fetch.extra_hosts.iter().cloned());
        let client = FetchClient::new(hosts, config.fetch.timeout())?.with_local_files(config.fetch.allow_local_files);

        let registry = standard_registry(&config.backends, BackendContext::new(artifacts.clone()), client.clone())?;
        registry.require(&TaskName::BACKENDS)?;
        let dispatcher = QueueDispatcher::start(&registry, tracker.clone(), |task| {
            config.queue.workers_for(task.as_str())
        });
        let backend_tasks = dispatcher.tasks();

        let materializer = Arc::new(InputMaterializer::new(artifacts.clone(), Arc::new(client)));
        let orchestrator = Orchestrator::new(
            tracker.clone(),
            Arc::new(dispatcher),
            materializer,
            OrchestratorSettings::from(&config.orchestrator),
        );
        let pool = OrchestratorPool::start(Arc::new(orchestrator), config.queue.orchestrator_workers);

        let results = Arc::new(ResultAggregator::new(artifacts));
        info!(backends = backend_tasks.len(), "Services wired");
        Ok(Self { state: AppState::new(identity, tracker, results, pool), backend_tasks })
    }
}

/// Path under which the storage root is served, taken from the public URL.
pub fn data_mount(public_url: &str) -> String {
    let path = url::Url::parse(public_url)
        .map(|u| u.path().trim_end_matches('/').to_string())
        .unwrap_or_default();
    if path.is_empty() {
        "/data".to_string()
    } else {
        path
    }
}

/// API routes plus the storage root as static files, so `pdbUrl` links resolve.
pub fn app(config: &Config, state: AppState) -> Router {
    plankweb_web::build_router(state)
        .nest_service(&data_mount(&config.storage.public_url), ServeDir::new(&config.storage.root))
}
