//! Mesh network enrolment

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tailscale_client::{AuthKey, CreateKeyRequest};
use tracing::info;

use crate::errors::ForgeError;
use crate::http::client::HttpClient;
use crate::utils::dns_label;

/// Hostname prefix of the control node
pub const CONTROL_HOSTNAME_PREFIX: &str = "redforge";

/// Mints device keys on the mesh control plane
#[async_trait]
pub trait MeshKeyIssuer: Send + Sync {
    /// Mint a single-use, ephemeral, pre-authorized 24h key tagged with `tag`
    async fn create_device_key(
        &self,
        api_key: &SecretString,
        tag: Option<&str>,
    ) -> Result<SecretString, ForgeError>;
}

/// Tailscale API key issuer
pub struct TailscaleClient {
    http: HttpClient,
}

impl TailscaleClient {
    pub fn new(api_url: &str) -> Result<Self, ForgeError> {
        Ok(Self {
            http: HttpClient::new(api_url)?,
        })
    }
}

/// Device key request scoped to `tag`
pub fn key_request(tag: Option<&str>) -> CreateKeyRequest {
    let tags = match tag {
        Some(tag) if !tag.trim().is_empty() => vec![format!("tag:{}", tag.trim())],
        _ => Vec::new(),
    };
    CreateKeyRequest::single_use_device(tags)
}

#[async_trait]
impl MeshKeyIssuer for TailscaleClient {
    async fn create_device_key(
        &self,
        api_key: &SecretString,
        tag: Option<&str>,
    ) -> Result<SecretString, ForgeError> {
        let key: AuthKey = self
            .http
            .post(
                "/api/v2/tailnet/-/keys?all=true",
                api_key.expose_secret(),
                &key_request(tag),
            )
            .await?;
        info!("Minted mesh device key {}", key.id);
        Ok(SecretString::from(key.key))
    }
}

/// Hostname the control node enrols under for a deployment
pub fn control_hostname(deployment_short_id: &str) -> String {
    dns_label(&format!("{}-{}", CONTROL_HOSTNAME_PREFIX, deployment_short_id))
}

/// Hostname a provisioned host enrols under
pub fn host_hostname(infrastructure_name: &str, infrastructure_id: &str) -> String {
    let short = infrastructure_id.split('-').next().unwrap_or(infrastructure_id);
    dns_label(&format!("{}-{}", infrastructure_name, short))
}

/// Boot script joining a host to the mesh, followed by `custom`
pub fn bootstrap_script(auth_key: &str, hostname: &str, custom: Option<&str>) -> String {
    let mut script = format!(
        "#!/bin/bash\n\
         curl -fsSL https://tailscale.com/install.sh | sh\n\
         tailscale up --auth-key={} --hostname={} --accept-dns=false\n",
        auth_key, hostname
    );
    if let Some(custom) = custom.filter(|c| !c.trim().is_empty()) {
        script.push_str(custom.trim_end());
        script.push('\n');
    }
    script
}
