//! Finite State Machine for the deployment lifecycle

use serde::{Deserialize, Serialize};

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    /// Created, nothing on disk yet
    ReadyToPrepare,

    /// Baseline network and key pair being applied
    Preparing,

    /// Baseline applied
    ReadyToDeploy,

    /// Infrastructure templates being compiled and applied
    Deploying,

    /// Infrastructure applied and reconciled
    ReadyToConfigure,

    /// Playbooks running over the mesh
    Configuring,

    /// Configured
    Live,

    /// A pipeline stage failed
    Failed,

    /// Tear-down in progress
    Destroying,

    /// Torn down, may be deleted
    Destroyed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::ReadyToPrepare => "ready-to-prepare",
            DeploymentStatus::Preparing => "preparing",
            DeploymentStatus::ReadyToDeploy => "ready-to-deploy",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::ReadyToConfigure => "ready-to-configure",
            DeploymentStatus::Configuring => "configuring",
            DeploymentStatus::Live => "live",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Destroying => "destroying",
            DeploymentStatus::Destroyed => "destroyed",
        }
    }

    /// Only destroyed deployments may be deleted
    pub fn can_delete(&self) -> bool {
        *self == DeploymentStatus::Destroyed
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// Start the prepare stage
    Prepare,

    /// Baseline applied
    PrepareSuccess,

    /// Start the deploy stage
    Deploy,

    /// Infrastructure applied and reconciled
    DeploySuccess,

    /// Start the configure stage
    Configure,

    /// Playbooks applied
    ConfigureSuccess,

    /// The running stage failed
    Fail,

    /// Start tear-down
    Destroy,

    /// Tear-down finished
    DestroySuccess,
}

/// Compute the status reached from `status` on `event`
pub fn next_status(
    status: DeploymentStatus,
    event: DeploymentEvent,
) -> Result<DeploymentStatus, String> {
    use DeploymentEvent as E;
    use DeploymentStatus as S;

    let next = match (status, event) {
        // Prepare
        (S::ReadyToPrepare | S::Failed, E::Prepare) => S::Preparing,
        (S::Preparing, E::PrepareSuccess) => S::ReadyToDeploy,

        // Deploy
        (S::ReadyToDeploy | S::ReadyToConfigure | S::Live | S::Failed, E::Deploy) => S::Deploying,
        (S::Deploying, E::DeploySuccess) => S::ReadyToConfigure,

        // Configure
        (S::ReadyToConfigure | S::Live | S::Failed, E::Configure) => S::Configuring,
        (S::Configuring, E::ConfigureSuccess) => S::Live,

        // Failure of a running stage
        (S::Preparing | S::Deploying | S::Configuring | S::Destroying, E::Fail) => S::Failed,

        // Destroy
        (S::Destroying | S::Destroyed, E::Destroy) => {
            return Err("Deployment is already being destroyed or destroyed".to_string());
        }
        (_, E::Destroy) => S::Destroying,
        (S::Destroying, E::DestroySuccess) => S::Destroyed,

        (S::Deploying, E::Deploy) => {
            return Err("Deployment is already deploying".to_string());
        }

        // Invalid transitions
        (status, event) => {
            return Err(format!(
                "Invalid transition: {} -> {:?}",
                status, event
            ));
        }
    };

    Ok(next)
}
