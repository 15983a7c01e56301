//! Cluster topology: where the master lives and how this node announces itself.

mod directory;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use directory::DirectoryTopology;

pub(crate) const TOPOLOGY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::topology");

/// Master endpoint observed at one point in time, compared by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySnapshot {
    master_endpoint: String,
}

impl TopologySnapshot {
    #[must_use]
    pub fn new(master_endpoint: impl Into<String>) -> Self {
        Self {
            master_endpoint: master_endpoint.into(),
        }
    }

    #[must_use]
    pub fn master_endpoint(&self) -> &str {
        &self.master_endpoint
    }
}

/// Endpoint a node publishes for its peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRegistration {
    pub instance_id: String,
    pub address: String,
    pub port: u16,
    pub is_master: bool,
}

/// Topology capability shared by every node in the deployment.
pub trait Topology: Send + Sync {
    /// Returns the base URL of the current master.
    fn resolve_master_endpoint(&self) -> Result<String, TopologyError>;

    /// Announces this node's endpoint to its peers.
    fn publish_self_endpoint(&self, registration: &NodeRegistration) -> Result<(), TopologyError>;
}

/// Resolves the master endpoint into a comparable snapshot.
pub fn resolve_snapshot(topology: &dyn Topology) -> Result<TopologySnapshot, TopologyError> {
    topology
        .resolve_master_endpoint()
        .map(TopologySnapshot::new)
}

/// Errors raised by topology lookups and announcements.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// No master has published its endpoint yet.
    #[error("no master endpoint published at '{}'", path.display())]
    MasterUnknown { path: PathBuf },
    /// The published master endpoint is blank.
    #[error("master endpoint at '{}' is empty", path.display())]
    EmptyMaster { path: PathBuf },
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode node registration: {source}")]
    Encode {
        #[from]
        source: serde_json::Error,
    },
}
