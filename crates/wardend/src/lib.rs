//! Node controller for a replica search server.
//!
//! A node provisions and mounts its durable volume, synchronises the search
//! server's configuration tree from the distribution and the master-authored
//! templates, launches the server as a child process pointed at the current
//! master, and then watches it. Any failure, whether during startup or later
//! (the child dying, the master moving, the topology becoming unreadable),
//! results in a single recycle request to the host; the node never retries in
//! process.
//!
//! Block storage, the topology directory and process execution are reached
//! through traits ([`VolumeProvider`], [`Topology`], [`ChildLauncher`]) so the
//! [`NodeController`] can be driven entirely by test doubles.

mod bootstrap;
mod files;
mod health;
pub mod lifecycle;
mod process;
pub mod supervisor;
pub mod sync;
pub mod telemetry;
pub mod topology;
pub mod volume;

pub use bootstrap::{ConfigLoader, StaticConfigLoader, SystemConfigLoader};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use lifecycle::{
    LifecycleState, MonitorOutcome, NodeController, NodeError, NodeServices, RecycleReason,
    Recycler, RuntimeFault, Stage,
};
pub use process::{HostSignal, NodeExit, SignalError, SignalSource, SignalStream, run_node};
pub use supervisor::{ChildLauncher, ChildProcessHandle, LaunchCommand, LaunchError};
pub use sync::{SyncError, SyncReport, synchronize};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use topology::{Topology, TopologyError, TopologySnapshot};
pub use volume::{Provisioner, ProvisionError, VolumeHandle, VolumeProvider};

#[cfg(test)]
mod tests;
