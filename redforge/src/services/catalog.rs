//! Integrations, templates, domains, SSH keys, stored files, settings and
//! activity logs

use serde::Serialize;
use tracing::info;

use forge_api::{
    CreateIntegrationRequest, DomainQuery, DomainRequest, FileRequest, IntegrationSummary,
    LogQuery, SettingRequest, SshKeyRequest, SshKeySummary, TemplateRequest,
};

use crate::errors::ForgeError;
use crate::models::activity::ActivityLog;
use crate::models::catalog::{
    setting_names, Domain, Integration, Platform, Setting, SshKey, StoredFile, Template,
    TemplateKind, IAM_ROLE_MARKER,
};
use crate::services::{file_extension, require};
use crate::store::{Record, Store, Table};
use crate::utils::generate_uuid;

/// Settings the pipelines understand
pub const KNOWN_SETTINGS: [&str; 3] = [
    setting_names::TAILSCALE_TAG,
    setting_names::USER_DATA,
    setting_names::ANSIBLE_OUTPUT,
];

fn not_found(kind: &str, id: &str) -> ForgeError {
    ForgeError::NotFound(format!("{} {} not found", kind, id))
}

fn remove<T: Record>(table: &mut Table<T>, kind: &str, id: &str) -> Result<T, ForgeError> {
    table.remove(id).ok_or_else(|| not_found(kind, id))
}

// ================================ INTEGRATIONS ================================== //

/// Validate and store an integration; AWS may use the ambient role
pub async fn create_integration(
    store: &Store,
    request: CreateIntegrationRequest,
) -> Result<IntegrationSummary, ForgeError> {
    require(&request.name, "name")?;
    let platform: Platform = request.platform.parse().map_err(ForgeError::ValidationError)?;

    let key_id = request.key_id.unwrap_or_default();
    let secret_key = request.secret_key.unwrap_or_default();
    let (key_id, secret_key) = match platform {
        Platform::Aws if request.use_iam_role => (IAM_ROLE_MARKER.to_string(), String::new()),
        Platform::Aws => {
            require(&key_id, "keyId")?;
            require(&secret_key, "secretKey")?;
            (key_id, secret_key)
        }
        Platform::DigitalOcean | Platform::Tailscale => {
            require(&secret_key, "secretKey")?;
            (key_id, secret_key)
        }
    };

    let integration = Integration {
        id: generate_uuid(),
        name: request.name.trim().to_string(),
        platform,
        key_id,
        secret_key,
    };
    let summary = integration.summary();
    store.write(|t| t.integrations.upsert(integration)).await?;

    info!("Created {} integration {}", platform.as_str(), summary.id);
    Ok(summary)
}

/// Integrations without their secrets
pub async fn list_integrations(store: &Store) -> Vec<IntegrationSummary> {
    store
        .read(|t| t.integrations.iter().map(Integration::summary).collect())
        .await
}

pub async fn delete_integration(store: &Store, id: &str) -> Result<(), ForgeError> {
    store
        .try_write(|t| {
            let in_use = t
                .deployments
                .find(|d| d.platform_id == id || d.tailscale_id == id);
            if let Some(deployment) = in_use {
                return Err(ForgeError::Conflict(format!(
                    "Integration is used by deployment {}",
                    deployment.name
                )));
            }
            remove(&mut t.integrations, "Integration", id).map(|_| ())
        })
        .await
}

// =================================== DOMAINS ===================================== //

/// Infrastructure a domain is bound to through its resources
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundInfrastructure {
    pub id: String,
    pub name: String,
    pub deployment_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainDetail {
    #[serde(flatten)]
    pub domain: Domain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infrastructure: Option<Vec<BoundInfrastructure>>,
}

pub async fn list_domains(store: &Store, query: &DomainQuery) -> Vec<DomainDetail> {
    store
        .read(|t| {
            t.domains
                .iter()
                .filter(|d| {
                    query
                        .project_id
                        .as_deref()
                        .is_none_or(|project| d.project_id == project)
                })
                .map(|domain| {
                    let infrastructure = query.include_infrastructure.then(|| {
                        let mut bound: Vec<BoundInfrastructure> = Vec::new();
                        let resources = t
                            .resources
                            .iter()
                            .filter(|r| r.domain.as_deref() == Some(domain.domain.as_str()));
                        for resource in resources {
                            if bound.iter().any(|b| b.id == resource.infrastructure_id) {
                                continue;
                            }
                            if let Some(infra) = t.infrastructure.get(&resource.infrastructure_id) {
                                bound.push(BoundInfrastructure {
                                    id: infra.id.clone(),
                                    name: infra.name.clone(),
                                    deployment_id: infra.deployment_id.clone(),
                                });
                            }
                        }
                        bound
                    });
                    DomainDetail {
                        domain: domain.clone(),
                        infrastructure,
                    }
                })
                .collect()
        })
        .await
}

pub async fn create_domain(store: &Store, request: DomainRequest) -> Result<Domain, ForgeError> {
    require(&request.domain, "domain")?;
    require(&request.project_id, "projectId")?;

    let domain = Domain {
        id: generate_uuid(),
        domain: request.domain.trim().to_string(),
        project_id: request.project_id,
        notes: request.notes,
    };
    let created = domain.clone();
    store
        .try_write(move |t| {
            if t
                .domains
                .find(|d| d.project_id == domain.project_id && d.domain == domain.domain)
                .is_some()
            {
                return Err(ForgeError::Conflict(format!(
                    "Domain {} already exists",
                    domain.domain
                )));
            }
            t.domains.upsert(domain);
            Ok(())
        })
        .await?;
    Ok(created)
}

pub async fn update_domain(
    store: &Store,
    id: &str,
    request: DomainRequest,
) -> Result<Domain, ForgeError> {
    require(&request.domain, "domain")?;
    store
        .try_write(|t| {
            t.domains
                .update(id, |d| {
                    d.domain = request.domain.trim().to_string();
                    if !request.project_id.trim().is_empty() {
                        d.project_id = request.project_id;
                    }
                    d.notes = request.notes;
                })
                .ok_or_else(|| not_found("Domain", id))
        })
        .await
}

pub async fn delete_domain(store: &Store, id: &str) -> Result<(), ForgeError> {
    store
        .try_write(|t| {
            let domain = remove(&mut t.domains, "Domain", id)?;
            for resource in t.resources.iter_mut() {
                if resource.domain.as_deref() == Some(domain.domain.as_str()) {
                    resource.domain = None;
                }
            }
            Ok(())
        })
        .await
}

// ================================== TEMPLATES ==================================== //

fn template_fields(request: &TemplateRequest) -> Result<TemplateKind, ForgeError> {
    require(&request.name, "name")?;
    require(&request.value, "value")?;
    require(&request.kind, "type")?;
    request.kind.parse().map_err(ForgeError::ValidationError)
}

pub async fn list_templates(store: &Store) -> Vec<Template> {
    store.read(|t| t.templates.all()).await
}

pub async fn create_template(
    store: &Store,
    request: TemplateRequest,
) -> Result<Template, ForgeError> {
    let kind = template_fields(&request)?;
    let template = Template {
        id: generate_uuid(),
        name: request.name.trim().to_string(),
        description: request.description,
        kind,
        value: request.value,
    };
    let created = template.clone();
    store.write(|t| t.templates.upsert(template)).await?;
    Ok(created)
}

pub async fn update_template(
    store: &Store,
    id: &str,
    request: TemplateRequest,
) -> Result<Template, ForgeError> {
    let kind = template_fields(&request)?;
    store
        .try_write(|t| {
            t.templates
                .update(id, |tpl| {
                    tpl.name = request.name.trim().to_string();
                    tpl.description = request.description;
                    tpl.kind = kind;
                    tpl.value = request.value;
                })
                .ok_or_else(|| not_found("Template", id))
        })
        .await
}

/// Delete a template no infrastructure references
pub async fn delete_template(store: &Store, id: &str) -> Result<(), ForgeError> {
    store
        .try_write(|t| {
            let referenced = t.infrastructure.find(|i| {
                i.template.as_ref().is_some_and(|tpl| tpl.id == id)
                    || i.configurations.iter().any(|c| c.template == id)
            });
            if let Some(infra) = referenced {
                return Err(ForgeError::Conflict(format!(
                    "Template is used by infrastructure {}",
                    infra.name
                )));
            }
            remove(&mut t.templates, "Template", id).map(|_| ())
        })
        .await
}

// =================================== SSH KEYS ==================================== //

pub async fn list_ssh_keys(store: &Store) -> Vec<SshKeySummary> {
    store
        .read(|t| t.ssh_keys.iter().map(SshKey::summary).collect())
        .await
}

pub async fn create_ssh_key(
    store: &Store,
    request: SshKeyRequest,
) -> Result<SshKeySummary, ForgeError> {
    require(&request.name, "name")?;
    require(&request.public, "public")?;
    require(&request.private, "private")?;

    let key = SshKey {
        id: generate_uuid(),
        name: request.name.trim().to_string(),
        public: request.public.trim().to_string(),
        private: request.private,
    };
    let summary = key.summary();
    store.write(|t| t.ssh_keys.upsert(key)).await?;
    Ok(summary)
}

pub async fn update_ssh_key(
    store: &Store,
    id: &str,
    request: SshKeyRequest,
) -> Result<SshKeySummary, ForgeError> {
    require(&request.name, "name")?;
    store
        .try_write(|t| {
            t.ssh_keys
                .update(id, |k| {
                    k.name = request.name.trim().to_string();
                    if !request.public.trim().is_empty() {
                        k.public = request.public.trim().to_string();
                    }
                    if !request.private.trim().is_empty() {
                        k.private = request.private;
                    }
                })
                .map(|k| k.summary())
                .ok_or_else(|| not_found("SSH key", id))
        })
        .await
}

pub async fn delete_ssh_key(store: &Store, id: &str) -> Result<(), ForgeError> {
    store
        .try_write(|t| {
            if let Some(deployment) = t.deployments.find(|d| d.ssh_key_id == id) {
                return Err(ForgeError::Conflict(format!(
                    "SSH key is used by deployment {}",
                    deployment.name
                )));
            }
            remove(&mut t.ssh_keys, "SSH key", id).map(|_| ())
        })
        .await
}

// ==================================== FILES ====================================== //

pub async fn list_files(store: &Store) -> Vec<StoredFile> {
    store.read(|t| t.files.all()).await
}

pub async fn create_file(store: &Store, request: FileRequest) -> Result<StoredFile, ForgeError> {
    require(&request.name, "name")?;
    let extension = file_extension(&request.extension)?;
    let file = StoredFile {
        id: generate_uuid(),
        name: request.name.trim().to_string(),
        extension,
        value: request.value,
    };
    let created = file.clone();
    store.write(|t| t.files.upsert(file)).await?;
    Ok(created)
}

pub async fn update_file(
    store: &Store,
    id: &str,
    request: FileRequest,
) -> Result<StoredFile, ForgeError> {
    require(&request.name, "name")?;
    let extension = file_extension(&request.extension)?;
    store
        .try_write(|t| {
            t.files
                .update(id, |f| {
                    f.name = request.name.trim().to_string();
                    f.extension = extension;
                    f.value = request.value;
                })
                .ok_or_else(|| not_found("File", id))
        })
        .await
}

pub async fn delete_file(store: &Store, id: &str) -> Result<(), ForgeError> {
    store
        .try_write(|t| remove(&mut t.files, "File", id).map(|_| ()))
        .await
}

// =================================== SETTINGS ==================================== //

pub async fn list_settings(store: &Store) -> Vec<Setting> {
    store.read(|t| t.settings.all()).await
}

/// Create or replace a runtime setting
pub async fn set_setting(store: &Store, request: SettingRequest) -> Result<Setting, ForgeError> {
    require(&request.name, "name")?;
    if !KNOWN_SETTINGS.contains(&request.name.as_str()) {
        return Err(ForgeError::ValidationError(format!(
            "Unknown setting {}",
            request.name
        )));
    }

    let setting = Setting {
        name: request.name,
        value: request.value,
    };
    let saved = setting.clone();
    store.write(|t| t.settings.upsert(setting)).await?;
    Ok(saved)
}

// ================================ ACTIVITY LOGS ================================== //

/// Activity entries, newest first
pub async fn list_logs(store: &Store, query: &LogQuery) -> Vec<ActivityLog> {
    let mut logs = store
        .read(|t| {
            t.logs.filter(|l| {
                query
                    .project_id
                    .as_deref()
                    .is_none_or(|project| l.project_id == project)
                    && query
                        .resource
                        .as_deref()
                        .is_none_or(|resource| l.resource == resource)
            })
        })
        .await;
    logs.sort_by(|a, b| b.created.cmp(&a.created));
    logs
}
