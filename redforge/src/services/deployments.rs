//! Deployment records

use chrono::Utc;
use tracing::info;

use forge_api::{CreateDeploymentRequest, DeploymentQuery};

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::ForgeError;
use crate::models::catalog::Platform;
use crate::models::deployment::Deployment;
use crate::services::require;
use crate::store::Store;
use crate::utils::generate_uuid;

/// Validate `request` and store a new deployment in `ready-to-prepare`
pub async fn create_deployment(
    store: &Store,
    request: CreateDeploymentRequest,
) -> Result<Deployment, ForgeError> {
    require(&request.name, "name")?;
    require(&request.ssh_key_id, "sshKeyId")?;
    require(&request.platform_id, "platformId")?;
    require(&request.tailscale_id, "tailscaleId")?;
    require(&request.project_id, "projectId")?;
    require(&request.region, "region")?;

    let now = Utc::now();
    let deployment = Deployment {
        id: generate_uuid(),
        name: request.name.trim().to_string(),
        description: request.description,
        region: request.region.trim().to_string(),
        project_id: request.project_id,
        ssh_key_id: request.ssh_key_id,
        platform_id: request.platform_id,
        tailscale_id: request.tailscale_id,
        status: DeploymentStatus::ReadyToPrepare,
        log: String::new(),
        created: now,
        updated: now,
    };

    let created = deployment.clone();
    store
        .try_write(move |t| {
            if !t.ssh_keys.contains(&deployment.ssh_key_id) {
                return Err(ForgeError::NotFound("SSH key not found".to_string()));
            }
            match t.integrations.get(&deployment.platform_id) {
                Some(i) if i.platform.is_provisioning() => {}
                Some(i) => {
                    return Err(ForgeError::ValidationError(format!(
                        "Integration '{}' cannot provision infrastructure",
                        i.name
                    )))
                }
                None => return Err(ForgeError::NotFound("Platform integration not found".to_string())),
            }
            match t.integrations.get(&deployment.tailscale_id) {
                Some(i) if i.platform == Platform::Tailscale => {}
                Some(i) => {
                    return Err(ForgeError::ValidationError(format!(
                        "Integration '{}' is not a Tailscale integration",
                        i.name
                    )))
                }
                None => return Err(ForgeError::NotFound("Tailscale integration not found".to_string())),
            }
            t.deployments.upsert(deployment);
            Ok(())
        })
        .await?;

    info!("Created deployment {} ({})", created.id, created.name);
    Ok(created)
}

/// Deployments, optionally restricted to one project
pub async fn list_deployments(store: &Store, query: &DeploymentQuery) -> Vec<Deployment> {
    store
        .read(|t| {
            t.deployments.filter(|d| {
                query
                    .project_id
                    .as_deref()
                    .is_none_or(|project| d.project_id == project)
            })
        })
        .await
}

pub async fn get_deployment(store: &Store, deployment_id: &str) -> Result<Deployment, ForgeError> {
    store
        .read(|t| t.deployments.get(deployment_id).cloned())
        .await
        .ok_or_else(|| ForgeError::NotFound(format!("Deployment {} not found", deployment_id)))
}
