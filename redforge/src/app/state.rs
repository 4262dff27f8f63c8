//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::executor::{Executor, ProcessRunner};
use crate::deploy::fsm::DeploymentStatus;
use crate::deploy::mesh::TailscaleClient;
use crate::deploy::orchestrator::Orchestrator;
use crate::deploy::reconciler::AwsImageCatalog;
use crate::errors::ForgeError;
use crate::filesys::file::File;
use crate::models::infrastructure::InfrastructureStatus;
use crate::store::Store;

/// Main application state
pub struct AppState {
    /// Persistent records
    pub store: Arc<Store>,

    /// Tool runner shared by every pipeline
    pub executor: Arc<Executor>,

    /// Lifecycle pipelines
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, ForgeError> {
        info!("Initializing application state...");

        options.layout.setup().await?;

        let store = Arc::new(match &options.snapshot {
            Some(path) => Store::open(File::new(path)).await?,
            None => Store::in_memory(),
        });
        recover_interrupted(&store).await?;

        let executor = Arc::new(Executor::new(
            Arc::new(ProcessRunner),
            store.clone(),
            options.tools.path.clone(),
            options.tools.timeout,
        ));
        let issuer = Arc::new(TailscaleClient::new(&options.tailscale_api_url)?);
        let images = Arc::new(AwsImageCatalog::new(executor.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            executor.clone(),
            issuer,
            images,
            options.layout.clone(),
        ));

        Ok(Self {
            store,
            executor,
            orchestrator,
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), ForgeError> {
        info!("Shutting down application state...");
        self.store.sync().await
    }
}

/// Fail deployments whose pipeline died with the previous process
pub async fn recover_interrupted(store: &Store) -> Result<usize, ForgeError> {
    let recovered = store
        .write(|t| {
            let mut recovered = Vec::new();
            for deployment in t.deployments.iter_mut() {
                if matches!(
                    deployment.status,
                    DeploymentStatus::Preparing
                        | DeploymentStatus::Deploying
                        | DeploymentStatus::Configuring
                        | DeploymentStatus::Destroying
                ) {
                    deployment.status = DeploymentStatus::Failed;
                    deployment.updated = chrono::Utc::now();
                    recovered.push(deployment.id.clone());
                }
            }
            for infra in t.infrastructure.iter_mut() {
                if infra.status == InfrastructureStatus::Building {
                    infra.status = InfrastructureStatus::Failed;
                }
            }
            recovered
        })
        .await?;

    for id in &recovered {
        warn!("Deployment {} was interrupted, marked failed", id);
    }
    Ok(recovered.len())
}
