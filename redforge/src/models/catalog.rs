//! Independently owned records referenced by deployments

use serde::{Deserialize, Serialize};

/// `key_id` marker meaning "use the ambient platform role"
pub const IAM_ROLE_MARKER: &str = "IAM_ROLE";

/// Supported integration platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Aws,
    #[serde(rename = "digitalocean")]
    DigitalOcean,
    Tailscale,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Aws => "aws",
            Platform::DigitalOcean => "digitalocean",
            Platform::Tailscale => "tailscale",
        }
    }

    /// Whether this platform provisions infrastructure through terraform
    pub fn is_provisioning(&self) -> bool {
        matches!(self, Platform::Aws | Platform::DigitalOcean)
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(Platform::Aws),
            "digitalocean" => Ok(Platform::DigitalOcean),
            "tailscale" => Ok(Platform::Tailscale),
            _ => Err(format!("Platform not supported: {}", s)),
        }
    }
}

/// A stored credential/platform binding
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub id: String,
    pub name: String,
    pub platform: Platform,
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub secret_key: String,
}

impl Integration {
    /// Whether the tool should inherit the host's platform identity
    pub fn uses_ambient_role(&self) -> bool {
        self.platform == Platform::Aws && self.key_id == IAM_ROLE_MARKER
    }

    pub fn summary(&self) -> forge_api::IntegrationSummary {
        forge_api::IntegrationSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            platform: self.platform.as_str().to_string(),
            use_iam_role: self.uses_ambient_role(),
        }
    }
}

/// Template kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    Infrastructure,
    Configuration,
}

impl std::str::FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "infrastructure" => Ok(TemplateKind::Infrastructure),
            "configuration" => Ok(TemplateKind::Configuration),
            _ => Err(format!("Invalid template type: {}", s)),
        }
    }
}

/// Reusable parameterized source text with `$$NAME$$` placeholders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    pub value: String,
}

/// A DNS name bound to a project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: String,
    pub domain: String,
    pub project_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// An SSH key pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKey {
    pub id: String,
    pub name: String,
    /// Public half, PEM or OpenSSH encoded
    pub public: String,
    /// Private half, only ever written inside a deployment directory
    pub private: String,
}

impl SshKey {
    pub fn summary(&self) -> forge_api::SshKeySummary {
        forge_api::SshKeySummary {
            id: self.id.clone(),
            name: self.name.clone(),
            public: self.public.clone(),
        }
    }
}

/// A stored file rendered by `file` variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub extension: String,
    pub value: String,
}

impl StoredFile {
    /// File name used when rendered into a deployment
    pub fn rendered_name(&self) -> String {
        if self.extension.is_empty() {
            self.id.clone()
        } else {
            format!("{}.{}", self.id, self.extension)
        }
    }
}

/// A runtime setting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub name: String,
    pub value: String,
}

/// Setting names read by the pipelines
pub mod setting_names {
    /// Tag applied to minted mesh device keys
    pub const TAILSCALE_TAG: &str = "tailscaleTag";
    /// Extra shell appended to host bootstrap scripts
    pub const USER_DATA: &str = "userData";
    /// `verbose` runs the playbook with -vvv
    pub const ANSIBLE_OUTPUT: &str = "ansibleOutput";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        let platform: Platform = "digitalocean".parse().unwrap();
        assert_eq!(platform, Platform::DigitalOcean);
        assert_eq!(
            serde_json::to_string(&platform).unwrap(),
            "\"digitalocean\""
        );
        assert!("gcp".parse::<Platform>().is_err());
    }

    #[test]
    fn test_ambient_role_only_for_aws() {
        let mut integration = Integration {
            id: "i".into(),
            name: "aws".into(),
            platform: Platform::Aws,
            key_id: IAM_ROLE_MARKER.into(),
            secret_key: "unused".into(),
        };
        assert!(integration.uses_ambient_role());

        integration.platform = Platform::DigitalOcean;
        assert!(!integration.uses_ambient_role());
    }
}
