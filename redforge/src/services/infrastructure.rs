//! Infrastructure records of a deployment

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use forge_api::{CreateInfrastructureRequest, UpdateInfrastructureRequest};

use crate::errors::ForgeError;
use crate::models::catalog::TemplateKind;
use crate::models::infrastructure::{
    Infrastructure, InfrastructureStatus, Resource, TemplateRef, Variable, VariableKind,
};
use crate::services::{require, require_identifier};
use crate::storage::layout::WorkspaceLayout;
use crate::store::{Store, Tables};
use crate::utils::generate_uuid;

/// An infrastructure with its resource rows
#[derive(Debug, Clone, Serialize)]
pub struct InfrastructureDetail {
    #[serde(flatten)]
    pub infrastructure: Infrastructure,
    pub resources: Vec<Resource>,
}

/// Point every `infrastructure-id` variable, nested ones included, at `id`
pub fn bind_infrastructure_id(variables: &mut [Variable], id: &str) {
    for variable in variables {
        if variable.kind == VariableKind::InfrastructureId {
            variable.value = id.to_string();
        }
        bind_infrastructure_id(&mut variable.variables, id);
    }
}

/// Every variable except `infrastructure-id` needs a name and a value
pub fn validate_variables(variables: &[Variable]) -> Result<(), ForgeError> {
    for variable in variables {
        if variable.kind == VariableKind::InfrastructureId {
            continue;
        }
        if variable.name.trim().is_empty() {
            return Err(ForgeError::ValidationError(
                "Variable name is required".to_string(),
            ));
        }
        if variable.value.trim().is_empty() {
            return Err(ForgeError::ValidationError(format!(
                "Variable {} needs a value",
                variable.name
            )));
        }
        validate_variables(&variable.variables)?;
    }
    Ok(())
}

fn domain_values(variables: &[Variable], out: &mut Vec<String>) {
    for variable in variables {
        if variable.kind == VariableKind::Domain && !variable.value.trim().is_empty() {
            out.push(variable.value.trim().to_string());
        }
        domain_values(&variable.variables, out);
    }
}

fn owned<'t>(
    t: &'t Tables,
    deployment_id: &str,
    infrastructure_id: &str,
) -> Result<&'t Infrastructure, ForgeError> {
    t.infrastructure
        .get(infrastructure_id)
        .filter(|i| i.deployment_id == deployment_id)
        .ok_or_else(|| {
            ForgeError::NotFound(format!("Infrastructure {} not found", infrastructure_id))
        })
}

fn require_template(t: &Tables, template_id: &str, kind: TemplateKind) -> Result<(), ForgeError> {
    match t.templates.get(template_id) {
        Some(template) if template.kind == kind => Ok(()),
        Some(template) => Err(ForgeError::ValidationError(format!(
            "Template '{}' has the wrong type",
            template.name
        ))),
        None => Err(ForgeError::NotFound(format!("Template {} not found", template_id))),
    }
}

pub async fn list_infrastructure(
    store: &Store,
    deployment_id: &str,
) -> Result<Vec<InfrastructureDetail>, ForgeError> {
    store
        .read(|t| {
            if !t.deployments.contains(deployment_id) {
                return Err(ForgeError::NotFound(format!(
                    "Deployment {} not found",
                    deployment_id
                )));
            }
            Ok(t.infrastructure_of(deployment_id)
                .into_iter()
                .map(|infrastructure| InfrastructureDetail {
                    resources: t.resources_of(&infrastructure.id),
                    infrastructure,
                })
                .collect())
        })
        .await
}

/// Add a pending infrastructure built from an infrastructure template
pub async fn create_infrastructure(
    store: &Store,
    deployment_id: &str,
    request: CreateInfrastructureRequest,
) -> Result<Infrastructure, ForgeError> {
    require(&request.name, "name")?;
    require(&request.infrastructure_template_id, "infrastructureTemplateId")?;
    validate_variables(&request.variables)?;

    let id = generate_uuid();
    let mut variables = request.variables;
    bind_infrastructure_id(&mut variables, &id);

    let infrastructure = Infrastructure {
        id,
        deployment_id: deployment_id.to_string(),
        name: request.name.trim().to_string(),
        description: request.description,
        template: Some(TemplateRef {
            id: request.infrastructure_template_id,
            variables,
        }),
        configurations: vec![],
        deployed_configurations: vec![],
        status: InfrastructureStatus::Pending,
        username: None,
        baseline: false,
    };

    let created = infrastructure.clone();
    store
        .try_write(move |t| {
            if !t.deployments.contains(&infrastructure.deployment_id) {
                return Err(ForgeError::NotFound(format!(
                    "Deployment {} not found",
                    infrastructure.deployment_id
                )));
            }
            if let Some(template) = &infrastructure.template {
                require_template(t, &template.id, TemplateKind::Infrastructure)?;
            }
            t.infrastructure.upsert(infrastructure);
            Ok(())
        })
        .await?;

    info!("Created infrastructure {} in deployment {}", created.id, deployment_id);
    Ok(created)
}

/// Rename, describe and attach configurations.
///
/// `domain` variables bind their domain to the host resources.
pub async fn update_infrastructure(
    store: &Store,
    deployment_id: &str,
    infrastructure_id: &str,
    request: UpdateInfrastructureRequest,
) -> Result<Infrastructure, ForgeError> {
    if let Some(name) = &request.name {
        require(name, "name")?;
    }

    let mut configurations = request.configurations;
    let mut seen = HashSet::new();
    for configuration in configurations.iter_mut() {
        require(&configuration.template, "template")?;
        if configuration.id.trim().is_empty() {
            configuration.id = generate_uuid();
        }
        require_identifier(&configuration.id, "configuration id")?;
        if !seen.insert(configuration.id.clone()) {
            return Err(ForgeError::ValidationError(format!(
                "Duplicate configuration id {}",
                configuration.id
            )));
        }
        validate_variables(&configuration.variables)?;
        bind_infrastructure_id(&mut configuration.variables, infrastructure_id);
    }

    let mut domains = Vec::new();
    for configuration in &configurations {
        domain_values(&configuration.variables, &mut domains);
    }

    store
        .try_write(|t| {
            let current = owned(t, deployment_id, infrastructure_id)?;
            if current.status == InfrastructureStatus::Building {
                return Err(ForgeError::Conflict(format!(
                    "Infrastructure {} is being deployed",
                    current.name
                )));
            }
            for configuration in &configurations {
                require_template(t, &configuration.template, TemplateKind::Configuration)?;
            }
            let project_id = t
                .deployments
                .get(deployment_id)
                .map(|d| d.project_id.clone())
                .unwrap_or_default();

            for domain in &domains {
                t.ensure_domain(&project_id, domain);
            }
            if let Some(domain) = domains.last() {
                for resource in t.resources.iter_mut() {
                    if resource.infrastructure_id == infrastructure_id && resource.is_host() {
                        resource.domain = Some(domain.clone());
                    }
                }
            }

            t.infrastructure
                .update(infrastructure_id, |i| {
                    if let Some(name) = request.name {
                        i.name = name.trim().to_string();
                    }
                    if request.description.is_some() {
                        i.description = request.description;
                    }
                    i.configurations = configurations;
                })
                .ok_or_else(|| {
                    ForgeError::NotFound(format!("Infrastructure {} not found", infrastructure_id))
                })
        })
        .await
}

/// Remove an infrastructure, its compiled code and its resources
pub async fn delete_infrastructure(
    store: &Store,
    layout: &WorkspaceLayout,
    deployment_id: &str,
    infrastructure_id: &str,
) -> Result<Infrastructure, ForgeError> {
    let infrastructure = store
        .read(|t| owned(t, deployment_id, infrastructure_id).cloned())
        .await?;
    if infrastructure.baseline {
        return Err(ForgeError::ValidationError(
            "The default infrastructure cannot be deleted".to_string(),
        ));
    }
    if infrastructure.status == InfrastructureStatus::Building {
        return Err(ForgeError::Conflict(format!(
            "Infrastructure {} is being deployed",
            infrastructure.name
        )));
    }

    layout
        .deployment(deployment_id)
        .infrastructure_file(infrastructure_id)
        .delete()
        .await?;
    store
        .write(|t| t.delete_infrastructure(infrastructure_id))
        .await?;

    info!("Deleted infrastructure {}", infrastructure_id);
    Ok(infrastructure)
}
