use std::env;

use camino::Utf8PathBuf;

use crate::endpoint::ServerEndpoint;
use crate::logging::LogFormat;

/// Instance identifier used when the host does not provide one.
pub const DEFAULT_INSTANCE_ID: &str = "replica_IN_0";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Port the search server listens on unless configured otherwise.
pub const DEFAULT_LISTEN_PORT: u16 = 8983;

/// Seconds between two monitoring passes.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Milliseconds granted to the child between the stop and kill signals.
pub const DEFAULT_KILL_TIMEOUT_MS: u64 = 2_000;

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Instance identifier taken from `HOSTNAME`, falling back to a fixed id.
pub fn default_instance_id() -> String {
    env::var("HOSTNAME")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_INSTANCE_ID.to_owned())
}

pub fn default_server_major_version() -> u32 {
    4
}

pub fn default_volume_size_mb() -> u64 {
    1_024
}

pub fn default_cache_capacity_mb() -> u64 {
    2_048
}

/// Directory holding the locally provisioned volume containers.
pub fn default_volume_root() -> Utf8PathBuf {
    state_directory().join("volumes")
}

/// Directory used as the local read cache for mounted volumes.
pub fn default_cache_dir() -> Utf8PathBuf {
    base_directory(dirs::cache_dir())
        .join("warden")
        .join("volume-cache")
}

/// Directory shared with peers for endpoint discovery.
pub fn default_topology_dir() -> Utf8PathBuf {
    state_directory().join("topology")
}

pub fn default_distribution_root() -> Utf8PathBuf {
    Utf8PathBuf::from("/opt/solr")
}

pub fn default_template_dir() -> Utf8PathBuf {
    Utf8PathBuf::from("/etc/warden/templates")
}

pub fn default_java_executable() -> String {
    "java".to_owned()
}

/// Endpoint the search server listens on and advertises.
pub fn default_listen() -> ServerEndpoint {
    ServerEndpoint::new("127.0.0.1", DEFAULT_LISTEN_PORT)
}

pub fn default_core_name() -> String {
    "replicaCore".to_owned()
}

pub fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

pub fn default_kill_timeout_ms() -> u64 {
    DEFAULT_KILL_TIMEOUT_MS
}

fn state_directory() -> Utf8PathBuf {
    base_directory(dirs::data_local_dir()).join("warden")
}

fn base_directory(candidate: Option<std::path::PathBuf>) -> Utf8PathBuf {
    candidate
        .or_else(|| Some(env::temp_dir()))
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("/tmp"))
}
