//! Configuration handling for the IPC harness.
//!
//! Settings come from three layers, weakest first: built-in defaults, an
//! optional YAML config file, and `GAMEENV_IPC_*` environment variables.
//! Command-line flags are merged on top by `main`.

use anyhow::Result;
use ipc_wire::DEFAULT_MAX_MESSAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Session name shared by server and controller
    pub name: String,
    /// TCP port; 0 selects the platform default transport
    pub port: u16,
    /// Connection budget in seconds; 0 waits forever
    pub timeout_secs: u64,
    /// Client re-dial spacing in milliseconds
    pub retry_interval_ms: u64,
    /// Payload bound in bytes
    pub max_message_size: usize,
    /// Encrypt traffic
    pub encryption: bool,
    /// Relax Unix socket permissions (server only)
    pub unmask_permissions: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            name: "wolf3d_ipc_player".to_string(),
            port: 0,
            timeout_secs: 0,
            retry_interval_ms: 200,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            encryption: false,
            unmask_permissions: false,
        }
    }
}

/// Root config file structure
#[derive(Debug, Deserialize)]
struct RootConfig {
    ipc: Option<IpcSection>,
}

/// The `ipc:` section; every field optional so partial files work
#[derive(Debug, Deserialize)]
struct IpcSection {
    name: Option<String>,
    port: Option<u16>,
    timeout_secs: Option<u64>,
    retry_interval_ms: Option<u64>,
    max_message_size: Option<usize>,
    encryption: Option<bool>,
    unmask_permissions: Option<bool>,
}

impl HarnessConfig {
    /// Load configuration from a file, then apply environment overrides
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    config.apply_root_config(root);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?} ({e}), using defaults",
                        config_path.as_ref()
                    );
                }
            }
        } else {
            warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            );
        }

        config.apply_environment_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides, no file involved
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_environment_overrides();
        config
    }

    fn apply_root_config(&mut self, root: RootConfig) {
        let Some(section) = root.ipc else { return };

        if let Some(name) = section.name {
            self.name = name;
        }
        if let Some(port) = section.port {
            self.port = port;
        }
        if let Some(timeout_secs) = section.timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        if let Some(retry_interval_ms) = section.retry_interval_ms {
            self.retry_interval_ms = retry_interval_ms;
        }
        if let Some(max_message_size) = section.max_message_size {
            self.max_message_size = max_message_size;
        }
        if let Some(encryption) = section.encryption {
            self.encryption = encryption;
        }
        if let Some(unmask_permissions) = section.unmask_permissions {
            self.unmask_permissions = unmask_permissions;
        }
    }

    fn apply_environment_overrides(&mut self) {
        if let Ok(name) = std::env::var("GAMEENV_IPC_NAME") {
            info!("Session name overridden by environment: {name}");
            self.name = name;
        }

        if let Ok(port) = std::env::var("GAMEENV_IPC_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                info!("Port overridden by environment: {port}");
                self.port = port;
            }
        }

        if let Ok(timeout) = std::env::var("GAMEENV_IPC_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.timeout_secs = timeout;
            }
        }

        if let Ok(encryption) = std::env::var("GAMEENV_IPC_ENCRYPTION") {
            self.encryption = encryption.to_lowercase() == "true";
        }
    }
}
