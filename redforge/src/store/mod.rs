//! In-process persistence with an optional JSON snapshot

pub mod table;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::deploy::fsm::DeploymentStatus;
use crate::errors::ForgeError;
use crate::filesys::file::File;
use crate::models::activity::ActivityLog;
use crate::models::catalog::{Domain, Integration, Setting, SshKey, StoredFile, Template};
use crate::models::deployment::Deployment;
use crate::models::infrastructure::{Infrastructure, InfrastructureStatus, Resource};
use crate::utils::generate_uuid;

pub use table::{Record, Table};

/// Every persisted collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub deployments: Table<Deployment>,
    pub infrastructure: Table<Infrastructure>,
    pub resources: Table<Resource>,
    pub integrations: Table<Integration>,
    pub templates: Table<Template>,
    pub domains: Table<Domain>,
    pub ssh_keys: Table<SshKey>,
    pub files: Table<StoredFile>,
    pub settings: Table<Setting>,
    pub logs: Table<ActivityLog>,
}

impl Tables {
    /// Value of a runtime setting
    pub fn setting(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(|s| s.value.as_str())
    }

    pub fn set_deployment_status(&mut self, deployment_id: &str, status: DeploymentStatus) {
        self.deployments.update(deployment_id, |d| {
            d.status = status;
            d.updated = Utc::now();
        });
    }

    /// Infrastructure of a deployment in insertion order
    pub fn infrastructure_of(&self, deployment_id: &str) -> Vec<Infrastructure> {
        self.infrastructure
            .filter(|i| i.deployment_id == deployment_id)
    }

    pub fn resources_of(&self, infrastructure_id: &str) -> Vec<Resource> {
        self.resources
            .filter(|r| r.infrastructure_id == infrastructure_id)
    }

    /// The network and key pair created at prepare time
    pub fn baseline_of(&self, deployment_id: &str) -> Option<&Infrastructure> {
        self.infrastructure
            .find(|i| i.deployment_id == deployment_id && i.baseline)
    }

    /// Flip every deployable non-baseline infrastructure to `building`.
    ///
    /// Resources of previously destroyed infrastructure are dropped so the
    /// compiler mints fresh rows.
    pub fn claim_for_deploy(&mut self, deployment_id: &str) -> Vec<Infrastructure> {
        let mut claimed = Vec::new();
        for infra in self.infrastructure.iter_mut() {
            if infra.deployment_id != deployment_id
                || infra.baseline
                || !infra.status.is_deployable()
            {
                continue;
            }
            if infra.status == InfrastructureStatus::Destroyed {
                let id = infra.id.clone();
                self.resources.retain(|r| r.infrastructure_id != id);
            }
            infra.status = InfrastructureStatus::Building;
            claimed.push(infra.clone());
        }
        claimed
    }

    /// Id of the domain record for `name` in `project_id`, created if absent
    pub fn ensure_domain(&mut self, project_id: &str, name: &str) -> String {
        if let Some(existing) = self
            .domains
            .find(|d| d.project_id == project_id && d.domain == name)
        {
            return existing.id.clone();
        }

        let domain = Domain {
            id: generate_uuid(),
            domain: name.to_string(),
            project_id: project_id.to_string(),
            notes: None,
        };
        let id = domain.id.clone();
        self.domains.upsert(domain);
        id
    }

    /// Remove an infrastructure and its resources
    pub fn delete_infrastructure(&mut self, infrastructure_id: &str) -> Option<Infrastructure> {
        self.resources
            .retain(|r| r.infrastructure_id != infrastructure_id);
        self.infrastructure.remove(infrastructure_id)
    }

    /// Remove a deployment with its infrastructure and resources
    pub fn delete_deployment(&mut self, deployment_id: &str) -> Option<Deployment> {
        for infra in self.infrastructure_of(deployment_id) {
            self.delete_infrastructure(&infra.id);
        }
        self.deployments.remove(deployment_id)
    }
}

/// Shared store guarded by an async read/write lock
pub struct Store {
    tables: RwLock<Tables>,
    snapshot: Option<File>,
}

impl Store {
    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            snapshot: None,
        }
    }

    /// Open a store backed by `snapshot`, loading it if present
    pub async fn open(snapshot: File) -> Result<Self, ForgeError> {
        let tables = if snapshot.exists().await {
            let tables: Tables = snapshot.read_json().await?;
            info!(
                "Loaded store snapshot from {:?} ({} deployments)",
                snapshot.path(),
                tables.deployments.len()
            );
            tables
        } else {
            Tables::default()
        };

        Ok(Self {
            tables: RwLock::new(tables),
            snapshot: Some(snapshot),
        })
    }

    /// Run `f` against a consistent view of every table
    pub async fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let tables = self.tables.read().await;
        f(&tables)
    }

    /// Run `f` under the write lock, then flush the snapshot
    pub async fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> Result<R, ForgeError> {
        let mut tables = self.tables.write().await;
        let result = f(&mut tables);
        self.flush(&tables).await?;
        Ok(result)
    }

    /// Like [`Store::write`] for fallible mutations; nothing is flushed on error
    pub async fn try_write<R>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<R, ForgeError>,
    ) -> Result<R, ForgeError> {
        let mut tables = self.tables.write().await;
        let result = f(&mut tables)?;
        self.flush(&tables).await?;
        Ok(result)
    }

    /// Append a chunk of tool output to a deployment log
    pub async fn append_log(&self, deployment_id: &str, chunk: &str) {
        let mut tables = self.tables.write().await;
        if let Some(deployment) = tables.deployments.get_mut(deployment_id) {
            deployment.log.push_str(chunk);
        }
    }

    /// Record an activity log entry
    pub async fn add_activity(&self, entry: ActivityLog) -> Result<(), ForgeError> {
        self.write(|t| t.logs.upsert(entry)).await
    }

    /// Persist the current tables
    pub async fn sync(&self) -> Result<(), ForgeError> {
        let tables = self.tables.read().await;
        self.flush(&tables).await
    }

    async fn flush(&self, tables: &Tables) -> Result<(), ForgeError> {
        if let Some(snapshot) = &self.snapshot {
            debug!("Flushing store snapshot to {:?}", snapshot.path());
            snapshot.write_json(tables).await?;
        }
        Ok(())
    }
}
