//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentStatus;

/// A provisioning attempt: one cloud platform, one mesh network, one project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Cloud region passed to the provider
    pub region: String,

    /// Owning project
    pub project_id: String,

    /// SSH key used for the generated key pair
    pub ssh_key_id: String,

    /// Provisioning platform integration (aws / digitalocean)
    pub platform_id: String,

    /// Mesh network integration (tailscale)
    pub tailscale_id: String,

    /// Current lifecycle status
    pub status: DeploymentStatus,

    /// Combined output of every tool run for this deployment
    #[serde(default)]
    pub log: String,

    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,
}

impl Deployment {
    /// First segment of the id, used in hostnames and resource tags
    pub fn short_id(&self) -> &str {
        self.id.split('-').next().unwrap_or(&self.id)
    }
}
