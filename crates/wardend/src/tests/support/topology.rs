//! Scripted topology built on a `mockall` mock.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use mockall::mock;

use crate::topology::{NodeRegistration, Topology, TopologyError};

mock! {
    pub Registry {}
    impl Topology for Registry {
        fn resolve_master_endpoint(&self) -> Result<String, TopologyError>;
        fn publish_self_endpoint(&self, registration: &NodeRegistration) -> Result<(), TopologyError>;
    }
}

/// Result of one master lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lookup {
    Master(&'static str),
    Missing,
}

/// Registry answering lookups in order; the last answer repeats.
///
/// Publishing always succeeds.
pub(crate) fn scripted_registry(lookups: impl IntoIterator<Item = Lookup>) -> MockRegistry {
    let queue = Mutex::new(lookups.into_iter().collect::<VecDeque<_>>());
    let mut registry = MockRegistry::new();
    registry
        .expect_publish_self_endpoint()
        .returning(|_| Ok(()));
    registry.expect_resolve_master_endpoint().returning(move || {
        let mut queue = queue.lock().expect("lookup queue poisoned");
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        match next {
            Some(Lookup::Master(endpoint)) => Ok(endpoint.to_owned()),
            Some(Lookup::Missing) | None => Err(TopologyError::MasterUnknown {
                path: PathBuf::from("master.endpoint"),
            }),
        }
    });
    registry
}
