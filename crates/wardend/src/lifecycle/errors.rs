use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use warden_config::LayoutError;

use crate::process::SignalError;
use crate::supervisor::LaunchError;
use crate::sync::SyncError;
use crate::telemetry::TelemetryError;
use crate::topology::TopologyError;
use crate::volume::ProvisionError;

use super::Stage;

/// Errors that end a startup attempt.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        #[source]
        source: Arc<OrthoError>,
    },
    /// The configured server version has no known layout.
    #[error("invalid file layout: {source}")]
    Layout {
        #[source]
        source: LayoutError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        #[source]
        source: TelemetryError,
    },
    /// Host signal handling could not be installed.
    #[error("failed to install signal handling: {source}")]
    Signals {
        #[source]
        source: SignalError,
    },
    #[error("volume provisioning failed: {source}")]
    Provision {
        #[source]
        source: ProvisionError,
    },
    #[error("failed to open attempt log in '{}': {source}", path.display())]
    AttemptLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("configuration sync failed: {source}")]
    Sync {
        #[source]
        source: SyncError,
    },
    #[error("topology unavailable: {source}")]
    Topology {
        #[source]
        source: TopologyError,
    },
    #[error("failed to launch search server: {source}")]
    Launch {
        #[source]
        source: LaunchError,
    },
}

impl From<Arc<OrthoError>> for NodeError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<LayoutError> for NodeError {
    fn from(source: LayoutError) -> Self {
        Self::Layout { source }
    }
}

impl From<TelemetryError> for NodeError {
    fn from(source: TelemetryError) -> Self {
        Self::Telemetry { source }
    }
}

impl From<SignalError> for NodeError {
    fn from(source: SignalError) -> Self {
        Self::Signals { source }
    }
}

impl From<ProvisionError> for NodeError {
    fn from(source: ProvisionError) -> Self {
        Self::Provision { source }
    }
}

impl From<SyncError> for NodeError {
    fn from(source: SyncError) -> Self {
        Self::Sync { source }
    }
}

impl From<TopologyError> for NodeError {
    fn from(source: TopologyError) -> Self {
        Self::Topology { source }
    }
}

impl From<LaunchError> for NodeError {
    fn from(source: LaunchError) -> Self {
        Self::Launch { source }
    }
}

/// Conditions detected after launch that invalidate the running node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeFault {
    #[error("search server {pid} exited: {status}")]
    ChildExited { pid: u32, status: String },
    #[error("master endpoint changed from {previous} to {current}")]
    MasterChanged { previous: String, current: String },
    #[error("master endpoint could not be resolved: {message}")]
    TopologyUnavailable { message: String },
    #[error("host environment changed")]
    HostReconfigured,
}

/// Why a recycle was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecycleReason {
    /// A startup stage failed.
    Startup { stage: Stage, message: String },
    /// The running node hit a fault.
    Runtime(RuntimeFault),
}

impl fmt::Display for RecycleReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Startup { stage, message } => write!(formatter, "{stage} failed: {message}"),
            Self::Runtime(fault) => write!(formatter, "{fault}"),
        }
    }
}
