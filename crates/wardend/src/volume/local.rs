use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::files::atomic_write;

use super::{ContainerKey, MountMode, ProviderError, VOLUME_TARGET, VolumeHandle, VolumeProvider};

const MANIFEST_FILE: &str = "volume.json";
const LEASE_FILE: &str = ".lease";
const MOUNT_DIR: &str = "mnt";
const CACHE_FILE: &str = "cache.json";

#[derive(Debug, Serialize, Deserialize)]
struct VolumeManifest {
    size_mb: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Lease {
    holder: u32,
    cache_budget_mb: u64,
}

#[derive(Debug, Serialize)]
struct CacheSettings {
    budget_mb: u64,
}

/// Volume provider that keeps containers as directories on the host.
///
/// Each container lives at `{root}/{key}`, each volume at
/// `{container}/{name}` with a `volume.json` manifest, and a mounted volume
/// exposes `{volume}/mnt`. Mounting writes a `.lease` file recording the
/// holder; releasing removes it.
#[derive(Debug, Clone)]
pub struct LocalVolumeProvider {
    root: PathBuf,
}

impl LocalVolumeProvider {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn container_dir(&self, key: &ContainerKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn volume_dir(&self, key: &ContainerKey, name: &str) -> PathBuf {
        self.container_dir(key).join(name)
    }
}

impl VolumeProvider for LocalVolumeProvider {
    fn initialise_cache(&self, dir: &Path, budget_mb: u64) -> Result<(), ProviderError> {
        create_dir(dir)?;
        write_json(&dir.join(CACHE_FILE), &CacheSettings { budget_mb })
    }

    fn ensure_container(&self, key: &ContainerKey) -> Result<(), ProviderError> {
        let dir = self.container_dir(key);
        if dir.is_dir() {
            return Err(ProviderError::AlreadyExists {
                what: format!("container '{key}'"),
            });
        }
        create_dir(&dir)
    }

    fn create_volume(
        &self,
        key: &ContainerKey,
        name: &str,
        size_mb: u64,
    ) -> Result<(), ProviderError> {
        let dir = self.volume_dir(key, name);
        let manifest = dir.join(MANIFEST_FILE);
        if let Some(existing) = read_json::<VolumeManifest>(&manifest, "read manifest")? {
            if existing.size_mb != size_mb {
                return Err(ProviderError::SizeMismatch {
                    name: name.to_owned(),
                    expected: size_mb,
                    actual: existing.size_mb,
                });
            }
            return Err(ProviderError::AlreadyExists {
                what: format!("volume '{name}'"),
            });
        }
        create_dir(&dir.join(MOUNT_DIR))?;
        write_json(&manifest, &VolumeManifest { size_mb })?;
        debug!(
            target: VOLUME_TARGET,
            container = %key,
            volume = name,
            size_mb,
            "volume created"
        );
        Ok(())
    }

    fn mount(
        &self,
        key: &ContainerKey,
        name: &str,
        cache_budget_mb: u64,
        mode: MountMode,
    ) -> Result<PathBuf, ProviderError> {
        let dir = self.volume_dir(key, name);
        if !dir.join(MANIFEST_FILE).is_file() {
            return Err(ProviderError::MissingVolume {
                container: key.to_string(),
                name: name.to_owned(),
            });
        }

        let lease_path = dir.join(LEASE_FILE);
        if let Some(previous) = read_json::<Lease>(&lease_path, "read lease")? {
            match mode {
                MountMode::Exclusive => {
                    return Err(ProviderError::Leased {
                        name: name.to_owned(),
                    });
                }
                MountMode::Force => warn!(
                    target: VOLUME_TARGET,
                    container = %key,
                    volume = name,
                    previous_holder = previous.holder,
                    "taking over stale volume lease"
                ),
            }
        }

        write_json(
            &lease_path,
            &Lease {
                holder: std::process::id(),
                cache_budget_mb,
            },
        )?;
        let mount_path = dir.join(MOUNT_DIR);
        create_dir(&mount_path)?;
        Ok(mount_path)
    }

    fn release(&self, handle: &VolumeHandle) -> Result<(), ProviderError> {
        let lease_path = self
            .volume_dir(handle.container_key(), handle.volume_name())
            .join(LEASE_FILE);
        match fs::remove_file(&lease_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ProviderError::Io {
                operation: "remove lease",
                path: lease_path,
                source,
            }),
        }
    }
}

fn create_dir(path: &Path) -> Result<(), ProviderError> {
    fs::create_dir_all(path).map_err(|source| ProviderError::Io {
        operation: "create directory",
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ProviderError> {
    let payload = serde_json::to_vec(value).map_err(|source| ProviderError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &payload).map_err(|source| ProviderError::Io {
        operation: "write",
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(
    path: &Path,
    operation: &'static str,
) -> Result<Option<T>, ProviderError> {
    let payload = match fs::read(path) {
        Ok(payload) => payload,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ProviderError::Io {
                operation,
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|source| ProviderError::Metadata {
            path: path.to_path_buf(),
            source,
        })
}
