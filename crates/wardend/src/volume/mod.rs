//! Durable volume provisioning.
//!
//! The [`Provisioner`] turns a node's identity into a mounted volume whose
//! storage skeleton is ready for the configuration synchroniser. The block
//! storage itself is an external capability reached through
//! [`VolumeProvider`]; [`LocalVolumeProvider`] backs it with host directories.

mod local;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use warden_config::{DATA_DIR, FileLocations, LIB_DIR, LOG_DIR, STORAGE_DIR};

pub use local::LocalVolumeProvider;

pub(crate) const VOLUME_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::volume");

/// Megabytes of local cache left unused when mounting.
pub const CACHE_SAFETY_MARGIN_MB: u64 = 50;

/// Stable identifier of the container holding a node's volumes.
///
/// Derived from the host-assigned instance id so that every restart of the
/// same node reattaches the same logical volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerKey(String);

impl ContainerKey {
    /// Normalises an instance identifier into a container key.
    ///
    /// `(`, `).`, `.` and `_` become hyphens (in that order) and the result
    /// is lowercased, so `Replica_IN_0` maps to `replica-in-0`.
    #[must_use]
    pub fn from_instance_id(instance_id: &str) -> Self {
        let key = instance_id
            .replace('(', "-")
            .replace(").", "-")
            .replace('.', "-")
            .replace('_', "-")
            .to_lowercase();
        Self(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// How a mount treats a lease left behind by an earlier holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    /// Fail when another lease is present.
    Exclusive,
    /// Take over any existing lease.
    Force,
}

/// Parameters of a volume acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRequest {
    pub instance_id: String,
    pub volume_name: String,
    pub size_mb: u64,
    pub cache_dir: PathBuf,
    pub cache_capacity_mb: u64,
}

/// A mounted durable volume owned by the node controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHandle {
    container_key: ContainerKey,
    volume_name: String,
    size_mb: u64,
    mount_path: PathBuf,
}

impl VolumeHandle {
    #[must_use]
    pub fn new(
        container_key: ContainerKey,
        volume_name: impl Into<String>,
        size_mb: u64,
        mount_path: PathBuf,
    ) -> Self {
        Self {
            container_key,
            volume_name: volume_name.into(),
            size_mb,
            mount_path,
        }
    }

    #[must_use]
    pub fn container_key(&self) -> &ContainerKey {
        &self.container_key
    }

    #[must_use]
    pub fn volume_name(&self) -> &str {
        &self.volume_name
    }

    #[must_use]
    pub fn size_mb(&self) -> u64 {
        self.size_mb
    }

    #[must_use]
    pub fn mount_path(&self) -> &Path {
        &self.mount_path
    }

    /// Directory the search server uses as its home.
    #[must_use]
    pub fn storage_dir(&self) -> PathBuf {
        self.mount_path.join(STORAGE_DIR)
    }

    /// Directory holding one log file per startup attempt.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.mount_path.join(LOG_DIR)
    }
}

/// Block storage capability used by the [`Provisioner`].
pub trait VolumeProvider: Send + Sync {
    /// Prepares the local read cache with the given budget.
    fn initialise_cache(&self, dir: &Path, budget_mb: u64) -> Result<(), ProviderError>;

    /// Creates the container for `key`, reporting
    /// [`ProviderError::AlreadyExists`] when it is already present.
    fn ensure_container(&self, key: &ContainerKey) -> Result<(), ProviderError>;

    /// Creates a volume inside the container, reporting
    /// [`ProviderError::AlreadyExists`] when it is already present.
    fn create_volume(&self, key: &ContainerKey, name: &str, size_mb: u64)
    -> Result<(), ProviderError>;

    /// Mounts the volume and returns its mount path.
    fn mount(
        &self,
        key: &ContainerKey,
        name: &str,
        cache_budget_mb: u64,
        mode: MountMode,
    ) -> Result<PathBuf, ProviderError>;

    /// Unmounts the volume.
    fn release(&self, handle: &VolumeHandle) -> Result<(), ProviderError>;
}

/// Errors reported by a [`VolumeProvider`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The container or volume is already present.
    #[error("{what} already exists")]
    AlreadyExists { what: String },
    /// The volume is held by another lease and the mount was exclusive.
    #[error("volume '{name}' is leased by another holder")]
    Leased { name: String },
    /// The volume exists with a different size than requested.
    #[error("volume '{name}' exists with {actual} MB, expected {expected} MB")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
    /// The volume was never created.
    #[error("volume '{name}' does not exist in container '{container}'")]
    MissingVolume { container: String, name: String },
    /// A filesystem operation failed.
    #[error("failed to {operation} '{}': {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A volume manifest or lease could not be encoded or decoded.
    #[error("invalid volume metadata '{}': {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced while acquiring the node's volume.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The local cache cannot accommodate the safety margin.
    #[error(
        "local cache capacity of {capacity_mb} MB does not exceed the {margin_mb} MB safety margin"
    )]
    CacheTooSmall { capacity_mb: u64, margin_mb: u64 },
    /// Initialising the local cache failed.
    #[error("failed to initialise the local cache: {source}")]
    Cache {
        #[source]
        source: ProviderError,
    },
    /// Creating the container failed.
    #[error("failed to prepare container '{key}': {source}")]
    Container {
        key: ContainerKey,
        #[source]
        source: ProviderError,
    },
    /// Creating the volume failed.
    #[error("failed to create volume '{name}': {source}")]
    Create {
        name: String,
        #[source]
        source: ProviderError,
    },
    /// Mounting the volume failed.
    #[error("failed to mount volume '{name}': {source}")]
    Mount {
        name: String,
        #[source]
        source: ProviderError,
    },
    /// Creating the storage skeleton failed.
    #[error("failed to create directory '{}': {source}", path.display())]
    Skeleton {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Acquires and releases the node's durable volume.
pub struct Provisioner {
    provider: Box<dyn VolumeProvider>,
}

impl Provisioner {
    #[must_use]
    pub fn new(provider: Box<dyn VolumeProvider>) -> Self {
        Self { provider }
    }

    /// Ensures the container and volume exist, mounts the volume and lays
    /// out the storage skeleton.
    ///
    /// Existing directories and their contents are left untouched.
    pub fn acquire(
        &self,
        request: &VolumeRequest,
        locations: &FileLocations,
    ) -> Result<VolumeHandle, ProvisionError> {
        let budget = cache_budget_mb(request.cache_capacity_mb)?;
        self.provider
            .initialise_cache(&request.cache_dir, budget)
            .map_err(|source| ProvisionError::Cache { source })?;

        let key = ContainerKey::from_instance_id(&request.instance_id);
        tolerate_existing(self.provider.ensure_container(&key)).map_err(|source| {
            ProvisionError::Container {
                key: key.clone(),
                source,
            }
        })?;
        tolerate_existing(self.provider.create_volume(
            &key,
            &request.volume_name,
            request.size_mb,
        ))
        .map_err(|source| ProvisionError::Create {
            name: request.volume_name.clone(),
            source,
        })?;

        let mount_path = self
            .provider
            .mount(&key, &request.volume_name, budget, MountMode::Force)
            .map_err(|source| ProvisionError::Mount {
                name: request.volume_name.clone(),
                source,
            })?;
        info!(
            target: VOLUME_TARGET,
            container = %key,
            volume = %request.volume_name,
            size_mb = request.size_mb,
            cache_budget_mb = budget,
            mount = %mount_path.display(),
            "volume mounted"
        );

        let handle = VolumeHandle::new(key, &request.volume_name, request.size_mb, mount_path);
        create_skeleton(&handle, locations)?;
        Ok(handle)
    }

    /// Unmounts a previously acquired volume.
    pub fn release(&self, handle: &VolumeHandle) -> Result<(), ProviderError> {
        self.provider.release(handle)?;
        info!(
            target: VOLUME_TARGET,
            container = %handle.container_key(),
            volume = %handle.volume_name(),
            "volume released"
        );
        Ok(())
    }
}

/// Cache budget handed to the mount for a given local cache capacity.
pub fn cache_budget_mb(capacity_mb: u64) -> Result<u64, ProvisionError> {
    match capacity_mb.checked_sub(CACHE_SAFETY_MARGIN_MB) {
        Some(budget) if budget > 0 => Ok(budget),
        _ => Err(ProvisionError::CacheTooSmall {
            capacity_mb,
            margin_mb: CACHE_SAFETY_MARGIN_MB,
        }),
    }
}

fn tolerate_existing(result: Result<(), ProviderError>) -> Result<(), ProviderError> {
    match result {
        Err(ProviderError::AlreadyExists { what }) => {
            debug!(target: VOLUME_TARGET, %what, "reusing existing resource");
            Ok(())
        }
        other => other,
    }
}

fn create_skeleton(handle: &VolumeHandle, locations: &FileLocations) -> Result<(), ProvisionError> {
    let storage = handle.storage_dir();
    let directories = [
        storage.clone(),
        storage.join(locations.volume_lang_dir()),
        storage.join(locations.volume_conf_dir()),
        storage.join(DATA_DIR),
        storage.join(LIB_DIR),
    ];
    for path in directories {
        fs::create_dir_all(&path).map_err(|source| ProvisionError::Skeleton {
            path: path.clone(),
            source,
        })?;
    }
    Ok(())
}
