//! Deployment lifecycle pipelines

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::deploy::baseline::{self, openssh_public_key, BASELINE_DESCRIPTION, BASELINE_NAME};
use crate::deploy::compiler::{compile_infrastructure, CompiledInfrastructure, HostProvisioning};
use crate::deploy::configurator::Configurator;
use crate::deploy::credentials::{mesh_api_key, provisioning_env};
use crate::deploy::executor::{Executor, RunContext, ToolInvocation, ToolOutput};
use crate::deploy::fsm::{next_status, DeploymentEvent, DeploymentStatus};
use crate::deploy::lease::{LeaseGuard, LeaseRegistry};
use crate::deploy::mesh::MeshKeyIssuer;
use crate::deploy::reconciler::{baseline_resources, ImageCatalog, Reconciler, TerraformState};
use crate::deploy::variables::VariableResolver;
use crate::errors::ForgeError;
use crate::models::activity::{ActivityLog, LogSource, LogStatus};
use crate::models::catalog::{setting_names, Integration, SshKey, Template, TemplateKind};
use crate::models::deployment::Deployment;
use crate::models::infrastructure::{Infrastructure, InfrastructureStatus};
use crate::storage::layout::{DeploymentDir, WorkspaceLayout};
use crate::store::Store;
use crate::utils::{dns_label, generate_uuid};

/// Pipeline stage, used for logging and failure handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Prepare,
    Deploy,
    Configure,
    Destroy,
    Delete,
}

impl Stage {
    /// Status the deployment holds while this stage runs
    fn running_status(&self) -> Option<DeploymentStatus> {
        match self {
            Stage::Prepare => Some(DeploymentStatus::Preparing),
            Stage::Deploy => Some(DeploymentStatus::Deploying),
            Stage::Configure => Some(DeploymentStatus::Configuring),
            Stage::Destroy => Some(DeploymentStatus::Destroying),
            Stage::Delete => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Prepare => "prepare",
            Stage::Deploy => "deploy",
            Stage::Configure => "configure",
            Stage::Destroy => "destroy",
            Stage::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A spawned pipeline. Dropping the handle detaches it.
#[derive(Debug)]
pub struct PipelineHandle {
    deployment_id: String,
    stage: Stage,
    handle: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the pipeline to finish
    pub async fn wait(self) -> Result<(), ForgeError> {
        self.handle
            .await
            .map_err(|e| ForgeError::Internal(format!("Pipeline task failed: {}", e)))
    }
}

/// Drives deployments through prepare, deploy, configure, destroy and delete
pub struct Orchestrator {
    store: Arc<Store>,
    executor: Arc<Executor>,
    issuer: Arc<dyn MeshKeyIssuer>,
    images: Arc<dyn ImageCatalog>,
    layout: WorkspaceLayout,
    leases: LeaseRegistry,
}

impl Orchestrator {
    pub fn new(
        store: Arc<Store>,
        executor: Arc<Executor>,
        issuer: Arc<dyn MeshKeyIssuer>,
        images: Arc<dyn ImageCatalog>,
        layout: WorkspaceLayout,
    ) -> Self {
        Self {
            store,
            executor,
            issuer,
            images,
            layout,
            leases: LeaseRegistry::new(),
        }
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    /// Whether a pipeline currently holds the lease of `deployment_id`
    pub fn is_running(&self, deployment_id: &str) -> bool {
        self.leases.is_held(deployment_id)
    }

    async fn deployment(&self, deployment_id: &str) -> Result<Deployment, ForgeError> {
        self.store
            .read(|t| t.deployments.get(deployment_id).cloned())
            .await
            .ok_or_else(|| ForgeError::NotFound(format!("Deployment {} not found", deployment_id)))
    }

    async fn integration(&self, integration_id: &str) -> Result<Integration, ForgeError> {
        self.store
            .read(|t| t.integrations.get(integration_id).cloned())
            .await
            .ok_or_else(|| {
                ForgeError::NotFound(format!("Integration {} not found", integration_id))
            })
    }

    /// Apply `event` to the stored status
    async fn transition(
        &self,
        deployment_id: &str,
        event: DeploymentEvent,
    ) -> Result<DeploymentStatus, ForgeError> {
        self.store
            .try_write(|t| {
                let current = t
                    .deployments
                    .get(deployment_id)
                    .ok_or_else(|| {
                        ForgeError::NotFound(format!("Deployment {} not found", deployment_id))
                    })?
                    .status;
                let next = next_status(current, event).map_err(ForgeError::InvalidTransition)?;
                t.set_deployment_status(deployment_id, next);
                Ok(next)
            })
            .await
    }

    /// Final transition of a pipeline, skipped once it has been cancelled
    async fn complete(
        &self,
        ctx: &RunContext,
        event: DeploymentEvent,
    ) -> Result<(), ForgeError> {
        if ctx.cancel.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }
        let status = self.transition(&ctx.deployment_id, event).await?;
        info!("Deployment {} is now {}", ctx.deployment_id, status);
        Ok(())
    }

    /// Validate `event`, take the lease and flip the status
    async fn begin(
        &self,
        deployment_id: &str,
        event: DeploymentEvent,
    ) -> Result<(Deployment, LeaseGuard), ForgeError> {
        let deployment = self.deployment(deployment_id).await?;
        next_status(deployment.status, event).map_err(ForgeError::InvalidTransition)?;
        let guard = self.leases.try_acquire(deployment_id)?;
        self.transition(deployment_id, event).await?;
        Ok((deployment, guard))
    }

    fn context(deployment: &Deployment, guard: &LeaseGuard) -> RunContext {
        RunContext {
            deployment_id: deployment.id.clone(),
            project_id: deployment.project_id.clone(),
            cancel: guard.cancel_token(),
        }
    }

    /// Record the outcome of a pipeline
    async fn finish(&self, deployment: &Deployment, stage: Stage, result: Result<(), ForgeError>) {
        let e = match result {
            Ok(()) => {
                info!("Deployment {} {} finished", deployment.id, stage);
                return;
            }
            Err(ForgeError::Cancelled) => {
                info!("Deployment {} {} cancelled", deployment.id, stage);
                return;
            }
            Err(e) => e,
        };

        error!("Deployment {} {} failed: {}", deployment.id, stage, e);
        let running = stage.running_status();
        let deployment_id = deployment.id.clone();
        let written = self
            .store
            .write(move |t| {
                let current = t.deployments.get(&deployment_id).map(|d| d.status);
                if running.is_some() && current == running {
                    t.set_deployment_status(&deployment_id, DeploymentStatus::Failed);
                }
                for infra in t.infrastructure.iter_mut() {
                    if infra.deployment_id == deployment_id
                        && infra.status == InfrastructureStatus::Building
                    {
                        infra.status = InfrastructureStatus::Failed;
                    }
                }
            })
            .await;
        if let Err(e) = written {
            error!("Failed to record failure of deployment {}: {}", deployment.id, e);
        }

        let entry = ActivityLog::new(
            format!(
                "Failed to {} the deployment {} ({}): {}",
                stage, deployment.id, deployment.name, e
            ),
            &deployment.project_id,
            LogSource::Forge,
            LogStatus::Error,
            &deployment.id,
        );
        if let Err(e) = self.store.add_activity(entry).await {
            error!("Failed to record activity: {}", e);
        }
    }

    async fn terraform(
        &self,
        ctx: &RunContext,
        dir: &DeploymentDir,
        integration: &Integration,
        args: &[&str],
    ) -> Result<ToolOutput, ForgeError> {
        let env = provisioning_env(integration)?.with("TF_CLI_ARGS", "-no-color");
        self.executor
            .run(
                ctx,
                ToolInvocation::new("terraform")
                    .args(args.iter().copied())
                    .env(env)
                    .cwd(dir.terraform_dir().path()),
            )
            .await
    }

    // ---- prepare ----

    /// Apply the baseline network and key pair
    pub async fn prepare(self: &Arc<Self>, deployment_id: &str) -> Result<PipelineHandle, ForgeError> {
        let deployment = self.deployment(deployment_id).await?;
        let key = self
            .store
            .read(|t| t.ssh_keys.get(&deployment.ssh_key_id).cloned())
            .await
            .ok_or_else(|| ForgeError::NotFound("SSH key not found".to_string()))?;
        let platform = self.integration(&deployment.platform_id).await?;
        if !platform.platform.is_provisioning() {
            return Err(ForgeError::ValidationError(format!(
                "Integration '{}' cannot provision infrastructure",
                platform.name
            )));
        }

        let (deployment, guard) = self.begin(deployment_id, DeploymentEvent::Prepare).await?;
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let ctx = Self::context(&deployment, &guard);
            let result = this.run_prepare(&ctx, &deployment, &key, &platform).await;
            this.finish(&deployment, Stage::Prepare, result).await;
            drop(guard);
        });

        Ok(PipelineHandle {
            deployment_id: deployment_id.to_string(),
            stage: Stage::Prepare,
            handle,
        })
    }

    async fn run_prepare(
        &self,
        ctx: &RunContext,
        deployment: &Deployment,
        key: &SshKey,
        platform: &Integration,
    ) -> Result<(), ForgeError> {
        let dir = self.layout.deployment(&deployment.id);
        dir.scaffold().await?;

        let public_key = openssh_public_key(&self.executor, ctx, &dir, &key.public).await?;
        let files = baseline::render(
            platform.platform,
            &deployment.id,
            &deployment.region,
            &dns_label(&key.name),
            &public_key,
        )?;
        let terraform_dir = dir.terraform_dir();
        terraform_dir.file("main.tf").write_string(&files.main).await?;
        terraform_dir.file("network.tf").write_string(&files.network).await?;
        terraform_dir.file("key.tf").write_string(&files.key).await?;
        dir.private_key_file().write_owner_read_only(&key.private).await?;

        self.terraform(ctx, &dir, platform, &["init"]).await?;
        self.terraform(ctx, &dir, platform, &["apply", "-auto-approve"]).await?;

        let state = TerraformState::load(&dir.state_file()).await?;
        let deployment_id = deployment.id.clone();
        self.store
            .write(move |t| {
                let baseline_id = match t.baseline_of(&deployment_id) {
                    Some(existing) => existing.id.clone(),
                    None => {
                        let infra = Infrastructure {
                            id: generate_uuid(),
                            deployment_id: deployment_id.clone(),
                            name: BASELINE_NAME.to_string(),
                            description: Some(BASELINE_DESCRIPTION.to_string()),
                            template: None,
                            configurations: vec![],
                            deployed_configurations: vec![],
                            status: InfrastructureStatus::Default,
                            username: None,
                            baseline: true,
                        };
                        let id = infra.id.clone();
                        t.infrastructure.upsert(infra);
                        id
                    }
                };
                t.infrastructure
                    .update(&baseline_id, |i| i.status = InfrastructureStatus::Default);
                t.resources.retain(|r| r.infrastructure_id != baseline_id);
                for resource in baseline_resources(&state, &baseline_id) {
                    t.resources.upsert(resource);
                }
            })
            .await?;

        self.complete(ctx, DeploymentEvent::PrepareSuccess).await
    }

    // ---- deploy ----

    /// Compile and apply every deployable infrastructure
    pub async fn deploy(self: &Arc<Self>, deployment_id: &str) -> Result<PipelineHandle, ForgeError> {
        let deployment = self.deployment(deployment_id).await?;
        next_status(deployment.status, DeploymentEvent::Deploy)
            .map_err(ForgeError::InvalidTransition)?;
        let guard = self.leases.try_acquire(deployment_id)?;

        let claimed = self
            .store
            .try_write(|t| {
                let current = t
                    .deployments
                    .get(deployment_id)
                    .ok_or_else(|| {
                        ForgeError::NotFound(format!("Deployment {} not found", deployment_id))
                    })?
                    .status;
                let next = next_status(current, DeploymentEvent::Deploy)
                    .map_err(ForgeError::InvalidTransition)?;
                t.set_deployment_status(deployment_id, next);
                Ok(t.claim_for_deploy(deployment_id))
            })
            .await?;
        info!(
            "Deploying {} infrastructure for deployment {}",
            claimed.len(),
            deployment_id
        );

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let ctx = Self::context(&deployment, &guard);
            let result = this.run_deploy(&ctx, &deployment, &claimed).await;
            this.finish(&deployment, Stage::Deploy, result).await;
            drop(guard);
        });

        Ok(PipelineHandle {
            deployment_id: deployment_id.to_string(),
            stage: Stage::Deploy,
            handle,
        })
    }

    async fn compile(
        &self,
        dir: &DeploymentDir,
        infra: &Infrastructure,
        templates: &[Template],
        hosts: &HostProvisioning<'_>,
    ) -> Result<CompiledInfrastructure, ForgeError> {
        let template_ref = infra.template.as_ref().ok_or_else(|| {
            ForgeError::TemplateError(format!("Infrastructure {} has no template", infra.name))
        })?;
        let template = templates
            .iter()
            .find(|t| t.id == template_ref.id)
            .ok_or_else(|| ForgeError::NotFound(format!("Template {} not found", template_ref.id)))?;

        let resolver = VariableResolver::new(&self.store, dir.files_dir(), &infra.id);
        let bindings = resolver.resolve(&template_ref.variables).await?;
        let compiled =
            compile_infrastructure(&template.value, &infra.id, &infra.name, &bindings, hosts).await?;
        dir.infrastructure_file(&infra.id)
            .write_string(&compiled.code)
            .await?;
        Ok(compiled)
    }

    async fn run_deploy(
        &self,
        ctx: &RunContext,
        deployment: &Deployment,
        claimed: &[Infrastructure],
    ) -> Result<(), ForgeError> {
        let platform = self.integration(&deployment.platform_id).await?;
        let tailscale = self.integration(&deployment.tailscale_id).await?;
        let (tag, user_data, templates) = self
            .store
            .read(|t| {
                (
                    t.setting(setting_names::TAILSCALE_TAG).map(str::to_string),
                    t.setting(setting_names::USER_DATA).map(str::to_string),
                    t.templates
                        .filter(|tpl| tpl.kind == TemplateKind::Infrastructure),
                )
            })
            .await;

        let api_key = mesh_api_key(&tailscale)?;
        let hosts = HostProvisioning {
            region: &deployment.region,
            issuer: self.issuer.as_ref(),
            api_key: &api_key,
            tag: tag.as_deref(),
            user_data: user_data.as_deref(),
        };

        let dir = self.layout.deployment(&deployment.id);
        dir.terraform_dir().create().await?;
        let compiled = join_all(
            claimed
                .iter()
                .map(|infra| self.compile(&dir, infra, &templates, &hosts)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        let rows: Vec<_> = claimed
            .iter()
            .map(|i| i.id.clone())
            .zip(compiled.into_iter().map(|c| c.resources))
            .collect();
        self.store
            .write(move |t| {
                for (infrastructure_id, resources) in rows {
                    t.resources
                        .retain(|r| r.infrastructure_id != infrastructure_id);
                    for resource in resources {
                        t.resources.upsert(resource);
                    }
                }
            })
            .await?;

        self.terraform(ctx, &dir, &platform, &["fmt"]).await?;
        self.terraform(ctx, &dir, &platform, &["apply", "-auto-approve"]).await?;

        let state = TerraformState::load(&dir.state_file()).await?;
        let reconciler = Reconciler {
            store: &self.store,
            images: self.images.as_ref(),
            ctx,
            deployment,
            integration: &platform,
        };
        let failed = reconciler.reconcile_deploy(&state, claimed).await?;
        if !failed.is_empty() {
            warn!(
                "Deployment {} deployed with {} failed infrastructure",
                deployment.id,
                failed.len()
            );
        }

        self.complete(ctx, DeploymentEvent::DeploySuccess).await
    }

    // ---- configure ----

    /// Run the configuration pass over the mesh
    pub async fn configure(self: &Arc<Self>, deployment_id: &str) -> Result<PipelineHandle, ForgeError> {
        let (deployment, guard) = self.begin(deployment_id, DeploymentEvent::Configure).await?;

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let ctx = Self::context(&deployment, &guard);
            let result = this.run_configure(&ctx, &deployment).await;
            this.finish(&deployment, Stage::Configure, result).await;
            drop(guard);
        });

        Ok(PipelineHandle {
            deployment_id: deployment_id.to_string(),
            stage: Stage::Configure,
            handle,
        })
    }

    async fn run_configure(&self, ctx: &RunContext, deployment: &Deployment) -> Result<(), ForgeError> {
        let tailscale = self.integration(&deployment.tailscale_id).await?;
        let dir = self.layout.deployment(&deployment.id);
        dir.ansible_dir().create().await?;

        let configurator = Configurator {
            store: &self.store,
            executor: &self.executor,
            issuer: self.issuer.as_ref(),
            ctx,
            deployment,
            dir: &dir,
            tailscale: &tailscale,
        };
        let targets = configurator.run().await?;

        let ids: Vec<String> = targets.into_iter().map(|i| i.id).collect();
        self.store
            .write(move |t| {
                for id in &ids {
                    t.infrastructure.update(id, |i| {
                        i.deployed_configurations = i.configurations.clone();
                    });
                }
            })
            .await?;

        self.complete(ctx, DeploymentEvent::ConfigureSuccess).await
    }

    // ---- destroy ----

    /// Tear the deployment down, cancelling any running pipeline first
    pub async fn destroy(self: &Arc<Self>, deployment_id: &str) -> Result<PipelineHandle, ForgeError> {
        let deployment = self.deployment(deployment_id).await?;
        self.transition(deployment_id, DeploymentEvent::Destroy).await?;

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let guard = this.leases.preempt(&deployment.id).await;
            let ctx = Self::context(&deployment, &guard);
            let result = this.run_destroy(&ctx, &deployment).await;
            this.finish(&deployment, Stage::Destroy, result).await;
            drop(guard);
        });

        Ok(PipelineHandle {
            deployment_id: deployment_id.to_string(),
            stage: Stage::Destroy,
            handle,
        })
    }

    async fn run_destroy(&self, ctx: &RunContext, deployment: &Deployment) -> Result<(), ForgeError> {
        let dir = self.layout.deployment(&deployment.id);
        if !dir.state_file().exists().await {
            info!(
                "Deployment {} has no provider state, nothing to tear down",
                deployment.id
            );
            return self.complete(ctx, DeploymentEvent::DestroySuccess).await;
        }

        let platform = self.integration(&deployment.platform_id).await?;
        self.terraform(ctx, &dir, &platform, &["apply", "-destroy", "-auto-approve"])
            .await?;

        dir.ansible_dir().delete().await?;
        let infrastructure = self
            .store
            .read(|t| t.infrastructure_of(&deployment.id))
            .await;
        for infra in infrastructure.iter().filter(|i| !i.baseline) {
            dir.infrastructure_file(&infra.id).delete().await?;
        }

        let ids: HashSet<String> = infrastructure.into_iter().map(|i| i.id).collect();
        self.store
            .write(move |t| {
                for infra in t.infrastructure.iter_mut() {
                    if !ids.contains(&infra.id) {
                        continue;
                    }
                    if !infra.baseline {
                        infra.configurations.clear();
                        infra.deployed_configurations.clear();
                    }
                    infra.status = InfrastructureStatus::Destroyed;
                }
                for resource in t.resources.iter_mut() {
                    if ids.contains(&resource.infrastructure_id) {
                        resource.clear_provider_fields();
                    }
                }
            })
            .await?;

        self.complete(ctx, DeploymentEvent::DestroySuccess).await
    }

    // ---- delete ----

    /// Remove a destroyed deployment, its directory and its records
    pub async fn delete(self: &Arc<Self>, deployment_id: &str) -> Result<PipelineHandle, ForgeError> {
        let deployment = self.deployment(deployment_id).await?;
        if !deployment.status.can_delete() {
            return Err(ForgeError::InvalidTransition(
                "Deployment must be destroyed before it can be deleted".to_string(),
            ));
        }

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let guard = this.leases.preempt(&deployment.id).await;
            let result = this.run_delete(&deployment).await;
            drop(guard);
            if result.is_ok() {
                this.leases.forget(&deployment.id);
            }
            this.finish(&deployment, Stage::Delete, result).await;
        });

        Ok(PipelineHandle {
            deployment_id: deployment_id.to_string(),
            stage: Stage::Delete,
            handle,
        })
    }

    async fn run_delete(&self, deployment: &Deployment) -> Result<(), ForgeError> {
        self.layout.deployment(&deployment.id).root().delete().await?;
        let deployment_id = deployment.id.clone();
        self.store
            .write(move |t| t.delete_deployment(&deployment_id))
            .await?;
        Ok(())
    }
}
