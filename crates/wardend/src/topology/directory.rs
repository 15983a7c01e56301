use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use warden_config::ServerEndpoint;

use crate::files::atomic_write;

use super::{NodeRegistration, TOPOLOGY_TARGET, Topology, TopologyError};

const MASTER_FILE: &str = "master.endpoint";
const NODES_DIR: &str = "nodes";

/// Topology kept in a directory shared by all nodes.
///
/// `master.endpoint` holds the master's base URL and `nodes/{id}.json` holds
/// each node's [`NodeRegistration`]. Every write is atomic.
#[derive(Debug, Clone)]
pub struct DirectoryTopology {
    root: PathBuf,
}

impl DirectoryTopology {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn master_path(&self) -> PathBuf {
        self.root.join(MASTER_FILE)
    }

    fn registration_path(&self, instance_id: &str) -> PathBuf {
        self.root.join(NODES_DIR).join(format!("{instance_id}.json"))
    }
}

impl Topology for DirectoryTopology {
    fn resolve_master_endpoint(&self) -> Result<String, TopologyError> {
        let path = self.master_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(TopologyError::MasterUnknown { path });
            }
            Err(source) => return Err(TopologyError::Read { path, source }),
        };
        let endpoint = text.trim();
        if endpoint.is_empty() {
            return Err(TopologyError::EmptyMaster { path });
        }
        debug!(target: TOPOLOGY_TARGET, master = endpoint, "master endpoint resolved");
        Ok(endpoint.to_owned())
    }

    fn publish_self_endpoint(&self, registration: &NodeRegistration) -> Result<(), TopologyError> {
        let path = self.registration_path(&registration.instance_id);
        let payload = serde_json::to_vec_pretty(registration)?;
        write(&path, &payload)?;

        if registration.is_master {
            let endpoint = ServerEndpoint::new(&registration.address, registration.port);
            write(&self.master_path(), format!("{}\n", endpoint.base_url()).as_bytes())?;
        }
        info!(
            target: TOPOLOGY_TARGET,
            instance = %registration.instance_id,
            address = %registration.address,
            port = registration.port,
            is_master = registration.is_master,
            "node endpoint published"
        );
        Ok(())
    }
}

fn write(path: &Path, contents: &[u8]) -> Result<(), TopologyError> {
    let result = match path.parent() {
        Some(parent) => fs::create_dir_all(parent).and_then(|()| atomic_write(path, contents)),
        None => atomic_write(path, contents),
    };
    result.map_err(|source| TopologyError::Write {
        path: path.to_path_buf(),
        source,
    })
}
