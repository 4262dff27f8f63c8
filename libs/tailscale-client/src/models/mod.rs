//! Tailscale API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime of a minted device key, in seconds (24 hours)
pub const DEVICE_KEY_EXPIRY_SECS: u64 = 86_400;

/// Request body for `POST /api/v2/tailnet/{tailnet}/keys`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyRequest {
    pub capabilities: KeyCapabilities,
    pub expiry_seconds: u64,
}

impl CreateKeyRequest {
    /// A single-use, ephemeral, pre-authorized device key scoped to `tags`
    pub fn single_use_device(tags: Vec<String>) -> Self {
        Self {
            capabilities: KeyCapabilities {
                devices: DeviceCapabilities {
                    create: DeviceCreateCapabilities {
                        reusable: false,
                        ephemeral: true,
                        preauthorized: true,
                        tags,
                    },
                },
            },
            expiry_seconds: DEVICE_KEY_EXPIRY_SECS,
        }
    }
}

/// Key capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyCapabilities {
    pub devices: DeviceCapabilities,
}

/// Device capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub create: DeviceCreateCapabilities,
}

/// Options for devices joining with the key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCreateCapabilities {
    pub reusable: bool,
    pub ephemeral: bool,
    pub preauthorized: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Key returned by the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthKey {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}
