//! Test doubles and fixtures shared by the unit and behavioural suites.

mod collaborators;
mod reporter;
mod topology;
mod tree;

pub(crate) use collaborators::{
    RecordingLauncher, RecordingRecycler, ScriptedTicker, TestCollaborators, TestSignalSource,
    wait_until,
};
pub(crate) use reporter::{HealthEvent, RecordingHealthReporter};
pub(crate) use topology::{Lookup, MockRegistry, scripted_registry};
pub(crate) use tree::ReplicaTree;
