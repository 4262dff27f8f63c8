//! API request and response models

use serde::{Deserialize, Serialize};

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Generic acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

// ================================ VARIABLES ===================================== //

/// How a template variable is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariableKind {
    /// Substituted verbatim
    #[default]
    Literal,
    /// `value` is a stored file id; the rendered file path is substituted
    File,
    /// A domain name; also binds the domain to the host resources
    Domain,
    /// Replaced with the owning infrastructure id
    InfrastructureId,
}

/// A template variable, possibly carrying nested variables for `file` kinds
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: VariableKind,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
}

impl Variable {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VariableKind::Literal,
            value: value.into(),
            variables: Vec::new(),
        }
    }
}

/// A configuration applied to an infrastructure at configure time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: String,
    /// Configuration template id
    pub template: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

// ================================ DEPLOYMENTS ==================================== //

/// Create deployment request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ssh_key_id: String,
    #[serde(default)]
    pub platform_id: String,
    #[serde(default)]
    pub tailscale_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub region: String,
}

/// Deployment listing query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentQuery {
    pub project_id: Option<String>,
}

// ============================== INFRASTRUCTURE ================================== //

/// Create infrastructure request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInfrastructureRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub infrastructure_template_id: String,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

/// Update infrastructure request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInfrastructureRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub configurations: Vec<Configuration>,
}

// ================================= CATALOG ====================================== //

/// Create or update domain request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRequest {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Domain listing query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainQuery {
    pub project_id: Option<String>,
    #[serde(default)]
    pub include_infrastructure: bool,
}

/// Create integration request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntegrationRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub use_iam_role: bool,
}

/// Integration as returned by the API (never carries secrets)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSummary {
    pub id: String,
    pub name: String,
    pub platform: String,
    pub use_iam_role: bool,
}

/// Create or update template request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

/// Create SSH key request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshKeyRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub public: String,
    #[serde(default)]
    pub private: String,
}

/// SSH key as returned by the API (never carries the private half)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKeySummary {
    pub id: String,
    pub name: String,
    pub public: String,
}

/// Create or update stored file request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub value: String,
}

/// Update setting request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Activity log listing query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    pub project_id: Option<String>,
    pub resource: Option<String>,
}
