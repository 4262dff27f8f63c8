//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::error;

use forge_api::{
    CreateDeploymentRequest, CreateInfrastructureRequest, CreateIntegrationRequest,
    DeploymentQuery, DomainQuery, DomainRequest, FileRequest, HealthResponse, LogQuery,
    MessageResponse, SettingRequest, SshKeyRequest, TemplateRequest, UpdateInfrastructureRequest,
    VersionResponse,
};

use crate::deploy::orchestrator::Stage;
use crate::errors::ForgeError;
use crate::models::activity::{ActivityLog, LogSource, LogStatus};
use crate::models::deployment::Deployment;
use crate::server::auth::{AuthUser, Role};
use crate::server::state::ServerState;
use crate::services::{catalog, deployments, infrastructure};
use crate::utils::version_info;

type ApiResult<T> = Result<T, ForgeError>;

fn message(text: impl Into<String>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.into(),
    })
}

/// Record a user action against a deployment
async fn record(state: &ServerState, user: &AuthUser, deployment: &Deployment, action: &str) {
    let entry = ActivityLog::new(
        format!(
            "{} {} the deployment {} ({})",
            user.describe(),
            action,
            deployment.id,
            deployment.name
        ),
        &deployment.project_id,
        LogSource::Forge,
        LogStatus::Info,
        &deployment.id,
    );
    if let Err(e) = state.store.add_activity(entry).await {
        error!("Failed to record activity: {}", e);
    }
}

// ================================ HEALTH ===================================== //

pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "redforge".to_string(),
        version: version.version,
    })
}

pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

// ============================== DEPLOYMENTS ================================== //

pub async fn list_deployments_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Query(query): Query<DeploymentQuery>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(deployments::list_deployments(&state.store, &query).await))
}

pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(deployments::get_deployment(&state.store, &id).await?))
}

pub async fn create_deployment_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Json(request): Json<CreateDeploymentRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    let deployment = deployments::create_deployment(&state.store, request).await?;
    record(&state, &user, &deployment, "created").await;
    Ok((StatusCode::CREATED, Json(deployment)))
}

async fn trigger(
    state: &ServerState,
    user: &AuthUser,
    id: &str,
    stage: Stage,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    user.require(Role::Operator)?;
    let deployment = deployments::get_deployment(&state.store, id).await?;

    let orchestrator = &state.orchestrator;
    // Pipelines run detached; their outcome lands in the status and logs
    let handle = match stage {
        Stage::Prepare => orchestrator.prepare(id).await?,
        Stage::Deploy => orchestrator.deploy(id).await?,
        Stage::Configure => orchestrator.configure(id).await?,
        Stage::Destroy => orchestrator.destroy(id).await?,
        Stage::Delete => orchestrator.delete(id).await?,
    };
    drop(handle);

    let action = match stage {
        Stage::Prepare => "prepared",
        Stage::Deploy => "deployed",
        Stage::Configure => "configured",
        Stage::Destroy => "destroyed",
        Stage::Delete => "deleted",
    };
    record(state, user, &deployment, action).await;

    Ok((
        StatusCode::ACCEPTED,
        message(format!("Deployment {} {} started", deployment.id, stage)),
    ))
}

pub async fn prepare_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    trigger(&state, &user, &id, Stage::Prepare).await
}

pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    trigger(&state, &user, &id, Stage::Deploy).await
}

pub async fn configure_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    trigger(&state, &user, &id, Stage::Configure).await
}

pub async fn destroy_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    trigger(&state, &user, &id, Stage::Destroy).await
}

pub async fn delete_deployment_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    trigger(&state, &user, &id, Stage::Delete).await
}

// ============================ INFRASTRUCTURE ================================= //

pub async fn list_infrastructure_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(infrastructure::list_infrastructure(&state.store, &id).await?))
}

pub async fn create_infrastructure_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<CreateInfrastructureRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    let created = infrastructure::create_infrastructure(&state.store, &id, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_infrastructure_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path((id, infrastructure_id)): Path<(String, String)>,
    Json(request): Json<UpdateInfrastructureRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    Ok(Json(
        infrastructure::update_infrastructure(&state.store, &id, &infrastructure_id, request)
            .await?,
    ))
}

pub async fn delete_infrastructure_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path((id, infrastructure_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    infrastructure::delete_infrastructure(
        &state.store,
        state.orchestrator.layout(),
        &id,
        &infrastructure_id,
    )
    .await?;
    Ok(message("Infrastructure deleted"))
}

// ================================ DOMAINS ==================================== //

pub async fn list_domains_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Query(query): Query<DomainQuery>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(catalog::list_domains(&state.store, &query).await))
}

pub async fn create_domain_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Json(request): Json<DomainRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    Ok((
        StatusCode::CREATED,
        Json(catalog::create_domain(&state.store, request).await?),
    ))
}

pub async fn update_domain_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<DomainRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    Ok(Json(catalog::update_domain(&state.store, &id, request).await?))
}

pub async fn delete_domain_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    catalog::delete_domain(&state.store, &id).await?;
    Ok(message("Domain deleted"))
}

// =============================== TEMPLATES =================================== //

pub async fn list_templates_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(catalog::list_templates(&state.store).await))
}

pub async fn create_template_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Json(request): Json<TemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    Ok((
        StatusCode::CREATED,
        Json(catalog::create_template(&state.store, request).await?),
    ))
}

pub async fn update_template_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<TemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    Ok(Json(catalog::update_template(&state.store, &id, request).await?))
}

pub async fn delete_template_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    catalog::delete_template(&state.store, &id).await?;
    Ok(message("Template deleted"))
}

// =============================== SSH KEYS ==================================== //

pub async fn list_ssh_keys_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(catalog::list_ssh_keys(&state.store).await))
}

pub async fn create_ssh_key_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Json(request): Json<SshKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    Ok((
        StatusCode::CREATED,
        Json(catalog::create_ssh_key(&state.store, request).await?),
    ))
}

pub async fn update_ssh_key_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<SshKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    Ok(Json(catalog::update_ssh_key(&state.store, &id, request).await?))
}

pub async fn delete_ssh_key_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    catalog::delete_ssh_key(&state.store, &id).await?;
    Ok(message("SSH key deleted"))
}

// ================================= FILES ===================================== //

pub async fn list_files_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(catalog::list_files(&state.store).await))
}

pub async fn create_file_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Json(request): Json<FileRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    Ok((
        StatusCode::CREATED,
        Json(catalog::create_file(&state.store, request).await?),
    ))
}

pub async fn update_file_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<FileRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    Ok(Json(catalog::update_file(&state.store, &id, request).await?))
}

pub async fn delete_file_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Operator)?;
    catalog::delete_file(&state.store, &id).await?;
    Ok(message("File deleted"))
}

// ============================== INTEGRATIONS ================================= //

pub async fn list_integrations_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(catalog::list_integrations(&state.store).await))
}

pub async fn create_integration_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Json(request): Json<CreateIntegrationRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Admin)?;
    Ok((
        StatusCode::CREATED,
        Json(catalog::create_integration(&state.store, request).await?),
    ))
}

pub async fn delete_integration_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Admin)?;
    catalog::delete_integration(&state.store, &id).await?;
    Ok(message("Integration deleted"))
}

// ================================ SETTINGS =================================== //

pub async fn list_settings_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(catalog::list_settings(&state.store).await))
}

pub async fn set_setting_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Json(request): Json<SettingRequest>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::Admin)?;
    Ok(Json(catalog::set_setting(&state.store, request).await?))
}

// ================================== LOGS ===================================== //

pub async fn list_logs_handler(
    State(state): State<Arc<ServerState>>,
    user: AuthUser,
    Query(query): Query<LogQuery>,
) -> ApiResult<impl IntoResponse> {
    user.require(Role::ReadOnly)?;
    Ok(Json(catalog::list_logs(&state.store, &query).await))
}
