//! Infrastructure and resource models

use serde::{Deserialize, Serialize};

pub use forge_api::{Configuration, Variable, VariableKind};

/// Infrastructure status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfrastructureStatus {
    /// Created, never deployed
    Pending,
    /// Claimed by a deploy pass
    Building,
    /// Deployed and reconciled
    Running,
    /// Live status of the baseline infrastructure
    Default,
    Failed,
    Destroyed,
}

impl InfrastructureStatus {
    /// Whether a deploy pass may pick this infrastructure up
    pub fn is_deployable(&self) -> bool {
        matches!(
            self,
            InfrastructureStatus::Pending
                | InfrastructureStatus::Failed
                | InfrastructureStatus::Destroyed
        )
    }
}

/// Infrastructure template reference with resolved variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub id: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

/// An independently deployable group of resources inside a deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Infrastructure {
    pub id: String,

    pub deployment_id: String,

    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Template compiled at deploy time; the baseline has none
    #[serde(default)]
    pub template: Option<TemplateRef>,

    /// Configurations applied at configure time
    #[serde(default)]
    pub configurations: Vec<Configuration>,

    /// Configurations applied by the last successful configure pass
    #[serde(default)]
    pub deployed_configurations: Vec<Configuration>,

    pub status: InfrastructureStatus,

    /// Login user for the configuration pass
    #[serde(default)]
    pub username: Option<String>,

    /// Marks the network and key pair created at prepare time
    #[serde(default)]
    pub baseline: bool,
}

impl Infrastructure {
    /// Inventory alias for this infrastructure
    pub fn host_alias(&self) -> String {
        self.id.replace('-', "_")
    }
}

/// Resource status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Pending,
    Provisioned,
}

/// One concrete provisioned object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,

    pub infrastructure_id: String,

    /// Name as emitted by the compiler (uniquified)
    pub resource_name: String,

    pub resource_type: String,

    pub status: ResourceStatus,

    #[serde(default)]
    pub provider_id: Option<String>,

    #[serde(default)]
    pub public_ip: Option<String>,

    #[serde(default)]
    pub private_ip: Option<String>,

    #[serde(default)]
    pub tailscale_ip: Option<String>,

    #[serde(default)]
    pub domain: Option<String>,
}

impl Resource {
    /// A fresh resource row awaiting reconciliation
    pub fn pending(
        id: impl Into<String>,
        infrastructure_id: impl Into<String>,
        resource_type: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            infrastructure_id: infrastructure_id.into(),
            resource_name: resource_name.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Pending,
            provider_id: None,
            public_ip: None,
            private_ip: None,
            tailscale_ip: None,
            domain: None,
        }
    }

    /// Whether this resource is a compute host that joins the mesh
    pub fn is_host(&self) -> bool {
        is_host_type(&self.resource_type)
    }

    /// Blank every provider-assigned field
    pub fn clear_provider_fields(&mut self) {
        self.provider_id = None;
        self.public_ip = None;
        self.private_ip = None;
        self.tailscale_ip = None;
    }
}

/// Compute resource types that receive key pairs and bootstrap scripts
pub const HOST_RESOURCE_TYPES: [&str; 2] = ["aws_instance", "digitalocean_droplet"];

pub fn is_host_type(resource_type: &str) -> bool {
    HOST_RESOURCE_TYPES.contains(&resource_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployable_statuses() {
        assert!(InfrastructureStatus::Pending.is_deployable());
        assert!(InfrastructureStatus::Failed.is_deployable());
        assert!(InfrastructureStatus::Destroyed.is_deployable());
        assert!(!InfrastructureStatus::Running.is_deployable());
        assert!(!InfrastructureStatus::Default.is_deployable());
        assert!(!InfrastructureStatus::Building.is_deployable());
    }

    #[test]
    fn test_host_alias() {
        let infra = Infrastructure {
            id: "a1b2-c3d4".to_string(),
            deployment_id: "d".to_string(),
            name: "c2".to_string(),
            description: None,
            template: None,
            configurations: vec![],
            deployed_configurations: vec![],
            status: InfrastructureStatus::Pending,
            username: None,
            baseline: false,
        };
        assert_eq!(infra.host_alias(), "a1b2_c3d4");
    }
}
