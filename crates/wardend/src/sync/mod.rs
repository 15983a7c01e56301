//! Configuration tree synchronisation.
//!
//! Refreshes the node's conf tree and library directory from the server
//! distribution and the master-authored templates without clobbering files
//! the server's own replication has already written.

mod registry;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use warden_config::{
    DISTRIBUTION_LIB_DIR, EXTRACTION_LIB_DIR, FileLocations, IMPORT_DESCRIPTOR_FILE, LIB_DIR,
    SCHEMA_FILE, SERVER_CONFIG_FILE,
};

pub use registry::{RegistryError, ReplicatedFileRegistry};

const SYNC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::sync");

/// Files skipped by the bulk conf copy and copied individually from the
/// templates afterwards.
const ALWAYS_COPY_LAST: [&str; 2] = [SCHEMA_FILE, SERVER_CONFIG_FILE];

/// Where synchronisation reads its inputs from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    /// Root of the unpacked server distribution.
    pub distribution_root: PathBuf,
    /// Directory with the versioned schema and server config templates.
    pub template_dir: PathBuf,
}

/// Counters describing one synchronisation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Configuration files written.
    pub copied: usize,
    /// Replicated files left untouched.
    pub preserved: usize,
    /// Library files refreshed.
    pub libraries: usize,
}

/// Errors aborting a synchronisation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read replicated files from '{}': {source}", path.display())]
    Registry {
        path: PathBuf,
        #[source]
        source: RegistryError,
    },
    #[error("failed to list '{}': {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("file name of '{}' is not valid UTF-8", path.display())]
    FileName { path: PathBuf },
    #[error("failed to copy '{}' to '{}': {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Decides whether a guarded file is written.
///
/// A replicated file is protected only once it exists locally; a missing
/// destination is always seeded.
#[must_use]
pub fn should_copy(destination_exists: bool, replicated: bool) -> bool {
    !destination_exists || !replicated
}

/// Synchronises the storage directory of a mounted volume.
///
/// The first failing step aborts the pass.
pub fn synchronize(
    storage_dir: &Path,
    source: &TemplateSource,
    locations: &FileLocations,
) -> Result<SyncReport, SyncError> {
    let template_config = source.template_dir.join(locations.template_config());
    let registry = ReplicatedFileRegistry::from_template(&template_config).map_err(|error| {
        SyncError::Registry {
            path: template_config.clone(),
            source: error,
        }
    })?;
    debug!(
        target: SYNC_TARGET,
        replicated = ?registry.names().collect::<Vec<_>>(),
        "replicated file registry loaded"
    );

    let conf_dir = storage_dir.join(locations.volume_conf_dir());
    let lang_dir = storage_dir.join(locations.volume_lang_dir());
    let lib_dir = storage_dir.join(LIB_DIR);
    let mut pass = SyncPass {
        registry: &registry,
        report: SyncReport::default(),
    };

    let distribution_conf = source
        .distribution_root
        .join(locations.distribution_conf_dir());
    for (name, path) in list_files(&distribution_conf)? {
        if ALWAYS_COPY_LAST.contains(&name.as_str()) {
            continue;
        }
        pass.copy_guarded(&path, &conf_dir, &name)?;
    }

    let distribution_lang = source
        .distribution_root
        .join(locations.distribution_lang_dir());
    for (name, path) in list_files(&distribution_lang)? {
        pass.copy_config(&path, &lang_dir.join(&name))?;
    }

    pass.copy_config(
        &source.template_dir.join(IMPORT_DESCRIPTOR_FILE),
        &conf_dir.join(IMPORT_DESCRIPTOR_FILE),
    )?;
    pass.copy_guarded(
        &source.template_dir.join(locations.template_schema()),
        &conf_dir,
        SCHEMA_FILE,
    )?;
    pass.copy_guarded(&template_config, &conf_dir, SERVER_CONFIG_FILE)?;

    for (name, path) in list_files(&source.distribution_root.join(DISTRIBUTION_LIB_DIR))? {
        pass.copy_library(&path, &lib_dir.join(&name))?;
    }
    pass.copy_library_tree(&source.distribution_root.join(EXTRACTION_LIB_DIR), &lib_dir)?;

    let report = pass.report;
    info!(
        target: SYNC_TARGET,
        copied = report.copied,
        preserved = report.preserved,
        libraries = report.libraries,
        storage = %storage_dir.display(),
        "configuration synchronised"
    );
    Ok(report)
}

struct SyncPass<'a> {
    registry: &'a ReplicatedFileRegistry,
    report: SyncReport,
}

impl SyncPass<'_> {
    /// Copies `from` to `{dir}/{name}` unless the destination is a
    /// replicated file that already exists.
    fn copy_guarded(&mut self, from: &Path, dir: &Path, name: &str) -> Result<(), SyncError> {
        let to = dir.join(name);
        if should_copy(to.exists(), self.registry.contains(name)) {
            return self.copy_config(from, &to);
        }
        debug!(
            target: SYNC_TARGET,
            file = name,
            "preserving replicated file"
        );
        self.report.preserved += 1;
        Ok(())
    }

    fn copy_config(&mut self, from: &Path, to: &Path) -> Result<(), SyncError> {
        copy_file(from, to)?;
        self.report.copied += 1;
        Ok(())
    }

    fn copy_library(&mut self, from: &Path, to: &Path) -> Result<(), SyncError> {
        copy_file(from, to)?;
        self.report.libraries += 1;
        Ok(())
    }

    fn copy_library_tree(&mut self, from: &Path, to: &Path) -> Result<(), SyncError> {
        for entry in read_dir_sorted(from)? {
            let target = to.join(entry.file_name());
            let path = entry.path();
            if path.is_dir() {
                self.copy_library_tree(&path, &target)?;
            } else {
                self.copy_library(&path, &target)?;
            }
        }
        Ok(())
    }
}

fn copy_file(from: &Path, to: &Path) -> Result<(), SyncError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|source| SyncError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::copy(from, to).map_err(|source| SyncError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Regular files directly inside `dir`, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, SyncError> {
    read_dir_sorted(dir)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .map(|path| match path.file_name().and_then(|name| name.to_str()) {
            Some(name) => Ok((name.to_owned(), path)),
            None => Err(SyncError::FileName { path }),
        })
        .collect()
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<fs::DirEntry>, SyncError> {
    let read_error = |source| SyncError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = fs::read_dir(dir)
        .map_err(read_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)?;
    entries.sort_by_key(fs::DirEntry::file_name);
    Ok(entries)
}
