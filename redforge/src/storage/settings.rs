//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for daily rolling log files; none disables file output
    #[serde(default)]
    pub log_dir: Option<String>,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Root directory of deployment working directories
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    /// JSON snapshot of the store; none keeps everything in memory
    #[serde(default)]
    pub snapshot_path: Option<String>,

    /// External tool configuration
    #[serde(default)]
    pub tools: ToolSettings,

    /// Mesh network API configuration
    #[serde(default)]
    pub tailscale: TailscaleSettings,

    /// Bearer token configuration
    #[serde(default)]
    pub auth: AuthSettings,
}

fn default_workspace_root() -> String {
    "/var/lib/redforge/deployments".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            workspace_root: default_workspace_root(),
            snapshot_path: None,
            tools: ToolSettings::default(),
            tailscale: TailscaleSettings::default(),
            auth: AuthSettings::default(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// External tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// PATH handed to every tool; nothing else is inherited
    #[serde(default = "default_tool_path")]
    pub path: String,

    /// Watchdog applied to each tool invocation
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

pub fn default_tool_path() -> String {
    "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string()
}

fn default_tool_timeout() -> u64 {
    3600
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            path: default_tool_path(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

/// Mesh network API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailscaleSettings {
    #[serde(default = "default_tailscale_api")]
    pub api_url: String,
}

fn default_tailscale_api() -> String {
    "https://api.tailscale.com".to_string()
}

impl Default for TailscaleSettings {
    fn default() -> Self {
        Self {
            api_url: default_tailscale_api(),
        }
    }
}

/// Bearer token settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret; empty rejects every authenticated request
    #[serde(default)]
    pub secret: String,
}
