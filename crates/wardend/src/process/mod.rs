//! Process-level wiring: host signals, exit codes and the production runner.

mod launch;
mod signals;

pub use launch::{NodeExit, run_node};
pub(crate) use launch::{
    CollaboratorFactory, Collaborators, LaunchPlan, ProcessControl, ServiceDeps, run_node_with,
};
pub use signals::{HostSignal, SignalError, SignalSource, SignalStream, SystemSignalSource};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
