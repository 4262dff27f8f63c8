//! Reconciles the provider state artifact back into resource records

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::deploy::credentials::aws_cli_env;
use crate::deploy::executor::{Executor, RunContext, ToolInvocation};
use crate::errors::ForgeError;
use crate::filesys::file::File;
use crate::models::catalog::Integration;
use crate::models::deployment::Deployment;
use crate::models::infrastructure::{Infrastructure, InfrastructureStatus, Resource, ResourceStatus};
use crate::store::Store;
use crate::utils::generate_uuid;

/// The parts of `terraform.tfstate` that are reconciled
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformState {
    #[serde(default)]
    pub resources: Vec<StateResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateResource {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub instances: Vec<StateInstance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateInstance {
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl TerraformState {
    pub async fn load(file: &File) -> Result<Self, ForgeError> {
        file.read_json().await
    }

    pub fn find(&self, name: &str) -> Option<&StateResource> {
        self.resources.iter().find(|r| r.name == name)
    }
}

impl StateResource {
    /// First non-null, non-empty string attribute among `names`
    pub fn first_attr(&self, names: &[&str]) -> Option<String> {
        let attributes = &self.instances.first()?.attributes;
        names.iter().find_map(|name| match attributes.get(*name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.first_attr(&[name])
    }

    pub fn private_address(&self) -> Option<String> {
        self.first_attr(&["private_ip", "ipv4_address_private", "cidr_block", "ip_range"])
    }

    pub fn public_address(&self) -> Option<String> {
        self.first_attr(&["public_ip", "ipv4_address"])
    }
}

/// Login user implied by an image name and description
pub fn username_for_image(name: &str, description: &str) -> &'static str {
    let name = name.to_lowercase();
    let description = description.to_lowercase();
    if name.contains("ubuntu") || description.contains("ubuntu") {
        "ubuntu"
    } else if name.contains("centos") {
        "centos"
    } else if name.contains("debian") {
        "admin"
    } else if name.contains("fedora") {
        "fedora"
    } else {
        "ec2-user"
    }
}

/// Image metadata returned by `aws ec2 describe-images`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageInfo {
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
}

/// Looks up machine images by id
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    async fn describe(
        &self,
        ctx: &RunContext,
        integration: &Integration,
        region: &str,
        image_id: &str,
    ) -> Result<ImageInfo, ForgeError>;
}

/// Image lookups through the `aws` CLI
pub struct AwsImageCatalog {
    executor: Arc<Executor>,
}

impl AwsImageCatalog {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ImageCatalog for AwsImageCatalog {
    async fn describe(
        &self,
        ctx: &RunContext,
        integration: &Integration,
        region: &str,
        image_id: &str,
    ) -> Result<ImageInfo, ForgeError> {
        let output = self
            .executor
            .run(
                ctx,
                ToolInvocation::new("aws")
                    .args([
                        "ec2",
                        "describe-images",
                        "--image-ids",
                        image_id,
                        "--query",
                        "Images[0].{Name:Name,Description:Description}",
                        "--output",
                        "json",
                    ])
                    .env(aws_cli_env(integration, region)?),
            )
            .await?;

        let info: Option<ImageInfo> = serde_json::from_str(output.stdout.trim())?;
        info.ok_or_else(|| ForgeError::ReconciliationError(format!("Image {} not found", image_id)))
    }
}

/// Resource rows for the baseline infrastructure, one per state entry
pub fn baseline_resources(state: &TerraformState, infrastructure_id: &str) -> Vec<Resource> {
    state
        .resources
        .iter()
        .map(|entry| {
            let mut resource = Resource::pending(
                generate_uuid(),
                infrastructure_id,
                &entry.resource_type,
                &entry.name,
            );
            resource.status = ResourceStatus::Provisioned;
            resource.provider_id = entry.attr("id");
            resource.private_ip = entry.private_address();
            resource.public_ip = entry.public_address();
            resource
        })
        .collect()
}

/// Reconciles compiled infrastructure of one deployment
pub struct Reconciler<'a> {
    pub store: &'a Store,
    pub images: &'a dyn ImageCatalog,
    pub ctx: &'a RunContext,
    pub deployment: &'a Deployment,
    pub integration: &'a Integration,
}

impl Reconciler<'_> {
    fn region_for(&self, entry: &StateResource) -> String {
        if !self.deployment.region.is_empty() {
            return self.deployment.region.clone();
        }
        entry
            .attr("arn")
            .and_then(|arn| arn.split(':').nth(3).map(str::to_string))
            .unwrap_or_default()
    }

    /// Fill one row from its state entry. Also yields the login user its image
    /// implies and any domain the provider reported
    async fn reconcile_row(
        &self,
        state: &TerraformState,
        mut row: Resource,
    ) -> Result<(Resource, Option<&'static str>, Option<String>), ForgeError> {
        let entry = state.find(&row.resource_name).ok_or_else(|| {
            ForgeError::ReconciliationError(format!(
                "Resource {} missing from state",
                row.resource_name
            ))
        })?;

        let mut username = None;
        if let Some(ami) = entry.attr("ami") {
            let region = self.region_for(entry);
            let image = self
                .images
                .describe(self.ctx, self.integration, &region, &ami)
                .await?;
            username = Some(username_for_image(
                image.name.as_deref().unwrap_or_default(),
                image.description.as_deref().unwrap_or_default(),
            ));
        } else if entry.attr("image").is_some() {
            username = Some("root");
        }

        row.status = ResourceStatus::Provisioned;
        row.provider_id = entry.attr("id");
        row.private_ip = entry.private_address();
        row.public_ip = entry.public_address();
        let domain = entry.attr("domain_name");
        if domain.is_some() {
            row.domain = domain.clone();
        }
        Ok((row, username, domain))
    }

    /// Copy provider output onto every resource row of `infrastructure`
    pub async fn reconcile_infrastructure(
        &self,
        state: &TerraformState,
        infrastructure: &Infrastructure,
    ) -> Result<(), ForgeError> {
        let rows = self
            .store
            .read(|t| t.resources_of(&infrastructure.id))
            .await;

        let reconciled = join_all(rows.into_iter().map(|row| self.reconcile_row(state, row)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let mut updated = Vec::with_capacity(reconciled.len());
        let mut username = None;
        let mut domains = Vec::new();
        for (row, user, domain) in reconciled {
            username = user.or(username);
            domains.extend(domain);
            updated.push(row);
        }

        let project_id = self.deployment.project_id.clone();
        let infrastructure_id = infrastructure.id.clone();
        self.store
            .write(move |t| {
                for domain in &domains {
                    t.ensure_domain(&project_id, domain);
                }
                for row in updated {
                    t.resources.upsert(row);
                }
                t.infrastructure.update(&infrastructure_id, |i| {
                    i.status = if i.baseline {
                        InfrastructureStatus::Default
                    } else {
                        InfrastructureStatus::Running
                    };
                    if let Some(username) = username {
                        i.username = Some(username.to_string());
                    }
                });
            })
            .await?;

        info!("Reconciled infrastructure {}", infrastructure.id);
        Ok(())
    }

    /// Reconcile every infrastructure concurrently, marking failures.
    ///
    /// Returns the ids of infrastructure that failed.
    pub async fn reconcile_deploy(
        &self,
        state: &TerraformState,
        infrastructure: &[Infrastructure],
    ) -> Result<Vec<String>, ForgeError> {
        let results = join_all(
            infrastructure
                .iter()
                .map(|infra| self.reconcile_infrastructure(state, infra)),
        )
        .await;

        let mut failed = Vec::new();
        for (infra, result) in infrastructure.iter().zip(results) {
            match result {
                Ok(()) => {}
                Err(ForgeError::Cancelled) => return Err(ForgeError::Cancelled),
                Err(e) => {
                    error!("Failed to reconcile infrastructure {}: {}", infra.id, e);
                    failed.push(infra.id.clone());
                }
            }
        }

        if !failed.is_empty() {
            warn!("{} infrastructure failed reconciliation", failed.len());
            let ids = failed.clone();
            self.store
                .write(move |t| {
                    for id in &ids {
                        t.infrastructure
                            .update(id, |i| i.status = InfrastructureStatus::Failed);
                    }
                })
                .await?;
        }
        Ok(failed)
    }
}
