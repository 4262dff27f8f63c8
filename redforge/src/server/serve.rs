//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::ForgeError;
use crate::server::handlers::*;
use crate::server::state::ServerState;

/// Every route of the API
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route(
            "/deployments",
            get(list_deployments_handler).post(create_deployment_handler),
        )
        .route(
            "/deployments/{id}",
            get(get_deployment_handler).delete(delete_deployment_handler),
        )
        .route("/deployments/{id}/prepare", post(prepare_handler))
        .route("/deployments/{id}/deploy", post(deploy_handler))
        .route("/deployments/{id}/configure", post(configure_handler))
        .route("/deployments/{id}/destroy", post(destroy_handler))
        // Infrastructure
        .route(
            "/deployments/{id}/infrastructure",
            get(list_infrastructure_handler).post(create_infrastructure_handler),
        )
        .route(
            "/deployments/{id}/infrastructure/{infrastructure_id}",
            put(update_infrastructure_handler).delete(delete_infrastructure_handler),
        )
        // Catalog
        .route(
            "/domains",
            get(list_domains_handler).post(create_domain_handler),
        )
        .route(
            "/domains/{id}",
            put(update_domain_handler).delete(delete_domain_handler),
        )
        .route(
            "/templates",
            get(list_templates_handler).post(create_template_handler),
        )
        .route(
            "/templates/{id}",
            put(update_template_handler).delete(delete_template_handler),
        )
        .route(
            "/ssh-keys",
            get(list_ssh_keys_handler).post(create_ssh_key_handler),
        )
        .route(
            "/ssh-keys/{id}",
            put(update_ssh_key_handler).delete(delete_ssh_key_handler),
        )
        .route("/files", get(list_files_handler).post(create_file_handler))
        .route(
            "/files/{id}",
            put(update_file_handler).delete(delete_file_handler),
        )
        .route(
            "/integrations",
            get(list_integrations_handler).post(create_integration_handler),
        )
        .route(
            "/integrations/{id}",
            axum::routing::delete(delete_integration_handler),
        )
        .route(
            "/settings",
            get(list_settings_handler).post(set_setting_handler),
        )
        .route("/logs", get(list_logs_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), ForgeError>>, ForgeError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ForgeError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ForgeError::ServerError(e.to_string()))
    });

    Ok(handle)
}
