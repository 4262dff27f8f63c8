//! Tool environments built from integrations

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

use crate::errors::ForgeError;
use crate::models::catalog::{Integration, Platform};

/// Environment variables handed to one tool invocation
#[derive(Default)]
pub struct ToolEnv {
    vars: Vec<(String, SecretString)>,
}

impl ToolEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.vars.retain(|(n, _)| *n != name);
        self.vars.push((name, SecretString::from(value.into())));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.expose_secret())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|(n, _)| n.as_str())
    }

    /// Plain pairs for the process builder
    pub fn exposed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars
            .iter()
            .map(|(n, v)| (n.as_str(), v.expose_secret()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl fmt::Debug for ToolEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.vars.iter().map(|(n, _)| (n, "[REDACTED]")))
            .finish()
    }
}

fn require<'a>(value: &'a str, field: &str, integration: &Integration) -> Result<&'a str, ForgeError> {
    if value.trim().is_empty() {
        return Err(ForgeError::ConfigError(format!(
            "Integration '{}' has no {}",
            integration.name, field
        )));
    }
    Ok(value)
}

/// Variables the provisioning tool needs for `integration`
pub fn provisioning_env(integration: &Integration) -> Result<ToolEnv, ForgeError> {
    let mut env = ToolEnv::new();
    match integration.platform {
        Platform::Aws => {
            if !integration.uses_ambient_role() {
                env.set(
                    "AWS_ACCESS_KEY_ID",
                    require(&integration.key_id, "key id", integration)?,
                );
                env.set(
                    "AWS_SECRET_ACCESS_KEY",
                    require(&integration.secret_key, "secret key", integration)?,
                );
            }
        }
        Platform::DigitalOcean => {
            env.set(
                "DIGITALOCEAN_TOKEN",
                require(&integration.secret_key, "token", integration)?,
            );
        }
        Platform::Tailscale => {
            return Err(ForgeError::ValidationError(format!(
                "Integration '{}' is not a provisioning platform",
                integration.name
            )));
        }
    }
    Ok(env)
}

/// Variables for `aws` CLI lookups in `region`
pub fn aws_cli_env(integration: &Integration, region: &str) -> Result<ToolEnv, ForgeError> {
    if integration.platform != Platform::Aws {
        return Err(ForgeError::ValidationError(format!(
            "Integration '{}' is not an AWS integration",
            integration.name
        )));
    }
    Ok(provisioning_env(integration)?
        .with("AWS_DEFAULT_REGION", region)
        .with("AWS_PAGER", ""))
}

/// Bearer key for the mesh network API
pub fn mesh_api_key(integration: &Integration) -> Result<SecretString, ForgeError> {
    if integration.platform != Platform::Tailscale {
        return Err(ForgeError::ValidationError(format!(
            "Integration '{}' is not a Tailscale integration",
            integration.name
        )));
    }
    let key = require(&integration.secret_key, "api key", integration)?;
    Ok(SecretString::from(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::IAM_ROLE_MARKER;

    fn integration(platform: Platform, key_id: &str, secret_key: &str) -> Integration {
        Integration {
            id: "i1".into(),
            name: "test".into(),
            platform,
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }

    #[test]
    fn test_aws_static_keys() {
        let env = provisioning_env(&integration(Platform::Aws, "AKIA", "s3cr3t")).unwrap();
        assert_eq!(env.get("AWS_ACCESS_KEY_ID"), Some("AKIA"));
        assert_eq!(env.get("AWS_SECRET_ACCESS_KEY"), Some("s3cr3t"));
        assert!(env.get("DIGITALOCEAN_TOKEN").is_none());
    }

    #[test]
    fn test_aws_ambient_role_injects_nothing() {
        let env = provisioning_env(&integration(Platform::Aws, IAM_ROLE_MARKER, "")).unwrap();
        assert!(env.is_empty());
    }

    #[test]
    fn test_digitalocean_token() {
        let env = provisioning_env(&integration(Platform::DigitalOcean, "", "dop_v1")).unwrap();
        let names: Vec<_> = env.names().collect();
        assert_eq!(names, vec!["DIGITALOCEAN_TOKEN"]);
    }

    #[test]
    fn test_tailscale_is_not_provisioning() {
        let err = provisioning_env(&integration(Platform::Tailscale, "", "tskey")).unwrap_err();
        assert!(matches!(err, ForgeError::ValidationError(_)));
    }

    #[test]
    fn test_empty_credential_is_config_error() {
        let err = provisioning_env(&integration(Platform::Aws, "AKIA", " ")).unwrap_err();
        assert!(matches!(err, ForgeError::ConfigError(_)));
    }

    #[test]
    fn test_aws_cli_env_adds_region() {
        let env = aws_cli_env(&integration(Platform::Aws, "AKIA", "s"), "eu-west-2").unwrap();
        assert_eq!(env.get("AWS_DEFAULT_REGION"), Some("eu-west-2"));
        assert_eq!(env.get("AWS_PAGER"), Some(""));
    }

    #[test]
    fn test_debug_is_redacted() {
        let env = provisioning_env(&integration(Platform::Aws, "AKIA", "s3cr3t")).unwrap();
        let rendered = format!("{:?}", env);
        assert!(rendered.contains("AWS_SECRET_ACCESS_KEY"));
        assert!(!rendered.contains("s3cr3t"));
    }
}
