//! Shared configuration for the replica warden.
//!
//! Values are layered by `ortho_config`: built-in defaults, then the TOML file
//! named by `--config-path` or `WARDEN_CONFIG_PATH`, then `WARDEN_*`
//! environment variables, then command-line flags.

mod defaults;
mod endpoint;
mod layout;
mod logging;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_INSTANCE_ID, DEFAULT_KILL_TIMEOUT_MS, DEFAULT_LISTEN_PORT, DEFAULT_LOG_FILTER,
    DEFAULT_POLL_INTERVAL_SECS, default_instance_id, default_listen, default_log_filter,
    default_log_format,
};
pub use endpoint::{EndpointParseError, ServerEndpoint};
pub use layout::{
    DATA_DIR, DISTRIBUTION_LIB_DIR, EXTRACTION_LIB_DIR, FileLocations, IMPORT_DESCRIPTOR_FILE,
    LAUNCH_DIR, LAUNCH_JAR, LIB_DIR, LOG_DIR, LayoutError, SCHEMA_FILE, SERVER_CONFIG_FILE,
    STORAGE_DIR, SUPPORTED_VERSIONS,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration of a replica node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "WARDEN")]
pub struct Config {
    /// Host-assigned identifier of this node instance.
    #[ortho_config(default = defaults::default_instance_id())]
    pub instance_id: String,
    /// Major version of the search server distribution being supervised.
    #[ortho_config(default = defaults::default_server_major_version())]
    pub server_major_version: u32,
    /// Size of the durable volume created on first start.
    #[ortho_config(default = defaults::default_volume_size_mb())]
    pub volume_size_mb: u64,
    /// Directory backing the local volume provider.
    #[ortho_config(default = defaults::default_volume_root())]
    pub volume_root: Utf8PathBuf,
    /// Local read cache directory.
    #[ortho_config(default = defaults::default_cache_dir())]
    pub cache_dir: Utf8PathBuf,
    /// Capacity of the local read cache before the safety margin.
    #[ortho_config(default = defaults::default_cache_capacity_mb())]
    pub cache_capacity_mb: u64,
    /// Root of the unpacked server distribution.
    #[ortho_config(default = defaults::default_distribution_root())]
    pub distribution_root: Utf8PathBuf,
    /// Directory holding the versioned schema and server config templates.
    #[ortho_config(default = defaults::default_template_dir())]
    pub template_dir: Utf8PathBuf,
    #[ortho_config(default = defaults::default_java_executable())]
    pub java_executable: String,
    /// Endpoint the server listens on and advertises to peers.
    #[ortho_config(default = defaults::default_listen())]
    pub listen: ServerEndpoint,
    #[ortho_config(default = defaults::default_core_name())]
    pub core_name: String,
    /// Directory shared with peers for endpoint discovery.
    #[ortho_config(default = defaults::default_topology_dir())]
    pub topology_dir: Utf8PathBuf,
    #[ortho_config(default = defaults::default_poll_interval_secs())]
    pub poll_interval_secs: u64,
    #[ortho_config(default = defaults::default_kill_timeout_ms())]
    pub kill_timeout_ms: u64,
    /// Filter expression handed to the tracing subscriber.
    #[ortho_config(default = defaults::default_log_filter_string())]
    pub log_filter: String,
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instance_id: defaults::default_instance_id(),
            server_major_version: defaults::default_server_major_version(),
            volume_size_mb: defaults::default_volume_size_mb(),
            volume_root: defaults::default_volume_root(),
            cache_dir: defaults::default_cache_dir(),
            cache_capacity_mb: defaults::default_cache_capacity_mb(),
            distribution_root: defaults::default_distribution_root(),
            template_dir: defaults::default_template_dir(),
            java_executable: defaults::default_java_executable(),
            listen: defaults::default_listen(),
            core_name: defaults::default_core_name(),
            topology_dir: defaults::default_topology_dir(),
            poll_interval_secs: defaults::default_poll_interval_secs(),
            kill_timeout_ms: defaults::default_kill_timeout_ms(),
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl Config {
    /// Returns the configured tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    #[must_use]
    pub fn listen(&self) -> &ServerEndpoint {
        &self.listen
    }

    /// Interval between monitoring passes.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Grace period granted to the child before it is force killed.
    #[must_use]
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    /// Resolves the file layout for the configured server version.
    pub fn file_locations(&self) -> Result<FileLocations, LayoutError> {
        FileLocations::for_major_version(self.server_major_version)
    }
}
