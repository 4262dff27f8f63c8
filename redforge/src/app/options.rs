//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::storage::layout::WorkspaceLayout;
use crate::storage::settings::{default_tool_path, Settings};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Server configuration
    pub server: ServerOptions,

    /// Deployment working directories
    pub layout: WorkspaceLayout,

    /// Store snapshot file; none keeps the store in memory
    pub snapshot: Option<PathBuf>,

    /// External tool configuration
    pub tools: ToolOptions,

    /// Mesh network API base URL
    pub tailscale_api_url: String,

    /// HS256 secret for bearer tokens
    pub auth_secret: SecretString,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            server: ServerOptions::default(),
            layout: WorkspaceLayout::default(),
            snapshot: None,
            tools: ToolOptions::default(),
            tailscale_api_url: "https://api.tailscale.com".to_string(),
            auth_secret: SecretString::from(String::new()),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            layout: WorkspaceLayout::new(&settings.workspace_root),
            snapshot: settings.snapshot_path.as_ref().map(PathBuf::from),
            tools: ToolOptions {
                path: settings.tools.path.clone(),
                timeout: Duration::from_secs(settings.tools.timeout_secs),
            },
            tailscale_api_url: settings.tailscale.api_url.clone(),
            auth_secret: SecretString::from(settings.auth.secret.clone()),
            ..Default::default()
        }
    }
}

/// External tool options
#[derive(Debug, Clone)]
pub struct ToolOptions {
    /// PATH handed to every tool
    pub path: String,

    /// Watchdog per invocation
    pub timeout: Duration,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            path: default_tool_path(),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}
