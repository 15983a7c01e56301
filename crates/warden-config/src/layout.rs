//! Version-specific file layout shared by the provisioner and synchronizer.
//!
//! The search server moved its configuration tree between major releases, so
//! the relative paths of the conf and language directories, both inside the
//! server distribution and on the durable volume, depend on the configured
//! major version. Everything else about the layout is fixed.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Directory under the volume mount that serves as the server's home.
pub const STORAGE_DIR: &str = "storage";
/// Index data directory, relative to the storage directory.
pub const DATA_DIR: &str = "data";
/// Library directory, relative to the storage directory.
pub const LIB_DIR: &str = "lib";
/// Directory under the volume mount holding per-attempt log files.
pub const LOG_DIR: &str = "logs";
/// Schema file name expected by the server.
pub const SCHEMA_FILE: &str = "schema.xml";
/// Server configuration file name expected by the server.
pub const SERVER_CONFIG_FILE: &str = "solrconfig.xml";
/// Data import descriptor refreshed on every pass.
pub const IMPORT_DESCRIPTOR_FILE: &str = "data-config.xml";
/// Server library directory, relative to the distribution root.
pub const DISTRIBUTION_LIB_DIR: &str = "dist";
/// Content extraction libraries, relative to the distribution root.
pub const EXTRACTION_LIB_DIR: &str = "contrib/extraction/lib";
/// Servlet container working directory, relative to the distribution root.
pub const LAUNCH_DIR: &str = "example";
/// Servlet container launcher, relative to the distribution root.
pub const LAUNCH_JAR: &str = "example/start.jar";

/// Server major versions with a known layout.
pub const SUPPORTED_VERSIONS: [u32; 2] = [3, 4];

/// Resolved mapping of logical roles to relative paths.
///
/// Built once from the server's major version and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocations {
    major_version: u32,
    distribution_conf_dir: Utf8PathBuf,
    distribution_lang_dir: Utf8PathBuf,
    volume_conf_dir: Utf8PathBuf,
    volume_lang_dir: Utf8PathBuf,
    template_schema: String,
    template_config: String,
}

impl FileLocations {
    /// Resolves the layout for a server major version.
    pub fn for_major_version(major_version: u32) -> Result<Self, LayoutError> {
        let core_dir = match major_version {
            3 => Utf8PathBuf::new(),
            4 => Utf8PathBuf::from("collection1"),
            other => return Err(LayoutError::UnsupportedVersion { version: other }),
        };
        let distribution_conf_dir = Utf8Path::new("example/solr").join(&core_dir).join("conf");
        let volume_conf_dir = core_dir.join("conf");
        Ok(Self {
            major_version,
            distribution_lang_dir: distribution_conf_dir.join("lang"),
            distribution_conf_dir,
            volume_lang_dir: volume_conf_dir.join("lang"),
            volume_conf_dir,
            template_schema: format!("schema.v{major_version}.xml"),
            template_config: format!("solrconfig.v{major_version}.xml"),
        })
    }

    /// Major version the layout was resolved for.
    #[must_use]
    pub fn major_version(&self) -> u32 {
        self.major_version
    }

    /// Conf directory inside the server distribution.
    #[must_use]
    pub fn distribution_conf_dir(&self) -> &Utf8Path {
        &self.distribution_conf_dir
    }

    /// Language resources directory inside the server distribution.
    #[must_use]
    pub fn distribution_lang_dir(&self) -> &Utf8Path {
        &self.distribution_lang_dir
    }

    /// Conf directory relative to the storage directory on the volume.
    #[must_use]
    pub fn volume_conf_dir(&self) -> &Utf8Path {
        &self.volume_conf_dir
    }

    /// Language resources directory relative to the storage directory.
    #[must_use]
    pub fn volume_lang_dir(&self) -> &Utf8Path {
        &self.volume_lang_dir
    }

    /// Schema file name inside the template directory.
    #[must_use]
    pub fn template_schema(&self) -> &str {
        &self.template_schema
    }

    /// Server configuration file name inside the template directory.
    #[must_use]
    pub fn template_config(&self) -> &str {
        &self.template_config
    }

    /// Name of the durable volume backing this layout.
    #[must_use]
    pub fn volume_name(&self) -> String {
        format!("storage_v{}.img", self.major_version)
    }
}

/// Errors raised while resolving a [`FileLocations`] layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// No layout is known for the configured major version.
    #[error("unsupported server major version {version}; expected one of {SUPPORTED_VERSIONS:?}")]
    UnsupportedVersion { version: u32 },
}
