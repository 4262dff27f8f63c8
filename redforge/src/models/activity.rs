//! Activity log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Originating tool of an activity entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Terraform,
    Tailscale,
    Ansible,
    Forge,
}

impl LogSource {
    /// Infer the source from the invoked program name
    pub fn from_program(program: &str) -> Self {
        if program.contains("terraform") {
            LogSource::Terraform
        } else if program.contains("tailscale") {
            LogSource::Tailscale
        } else if program.contains("ansible") {
            LogSource::Ansible
        } else {
            LogSource::Forge
        }
    }
}

/// Activity entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Info,
    Error,
}

/// A structured activity log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: String,
    pub message: String,
    pub project_id: String,
    pub source: LogSource,
    pub status: LogStatus,
    /// Id of the affected record
    pub resource: String,
    pub created: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(
        message: impl Into<String>,
        project_id: impl Into<String>,
        source: LogSource,
        status: LogStatus,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            id: crate::utils::generate_uuid(),
            message: message.into(),
            project_id: project_id.into(),
            source,
            status,
            resource: resource.into(),
            created: Utc::now(),
        }
    }
}
