//! Runs one node attempt from configuration to exit code.

use std::io::{self, Write};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info};

use warden_config::Config;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::lifecycle::{
    Cancellation, HostRecycler, IntervalTicker, NodeController, NodeError, NodeServices,
};
use crate::supervisor::{ChildLauncher, SystemLauncher};
use crate::telemetry;
use crate::topology::{DirectoryTopology, Topology};
use crate::volume::{LocalVolumeProvider, VolumeProvider};

use super::PROCESS_TARGET;
use super::signals::{HostSignal, SignalError, SignalSource, SignalStream, SystemSignalSource};

/// How a node run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeExit {
    /// Controlled stop requested by the host.
    Stopped,
    /// The node asked the host supervisor to recycle it.
    Recycle,
    /// The node could not be brought up far enough to recycle.
    Failed,
}

impl NodeExit {
    /// Process exit code: 0, `EX_TEMPFAIL` (75) or 1.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Stopped => 0,
            Self::Recycle => 75,
            Self::Failed => 1,
        }
    }
}

/// External capabilities a controller is built from.
pub(crate) struct Collaborators {
    pub(crate) provider: Box<dyn VolumeProvider>,
    pub(crate) topology: Box<dyn Topology>,
    pub(crate) launcher: Box<dyn ChildLauncher>,
}

/// Builds the external capabilities for a resolved configuration.
pub(crate) trait CollaboratorFactory {
    fn build(&self, config: &Config) -> Collaborators;
}

/// Host-backed capabilities rooted at the configured directories.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SystemCollaborators;

impl CollaboratorFactory for SystemCollaborators {
    fn build(&self, config: &Config) -> Collaborators {
        Collaborators {
            provider: Box::new(LocalVolumeProvider::new(
                config.volume_root.clone().into_std_path_buf(),
            )),
            topology: Box::new(DirectoryTopology::new(
                config.topology_dir.clone().into_std_path_buf(),
            )),
            launcher: Box::new(SystemLauncher),
        }
    }
}

/// Process-level collaborators.
pub(crate) struct ProcessControl<S> {
    pub(crate) signals: S,
}

/// Service dependencies required to construct the controller.
pub(crate) struct ServiceDeps<L, F> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) collaborators: F,
}

/// Everything a node run needs.
pub(crate) struct LaunchPlan<L, S, F> {
    pub(crate) process: ProcessControl<S>,
    pub(crate) services: ServiceDeps<L, F>,
}

/// Runs the node with the production collaborators.
pub fn run_node() -> NodeExit {
    run_node_with(LaunchPlan {
        process: ProcessControl {
            signals: SystemSignalSource,
        },
        services: ServiceDeps {
            loader: SystemConfigLoader,
            reporter: Arc::new(StructuredHealthReporter::new()),
            collaborators: SystemCollaborators,
        },
    })
}

/// Runs the node with injected collaborators.
pub(crate) fn run_node_with<L, S, F>(plan: LaunchPlan<L, S, F>) -> NodeExit
where
    L: ConfigLoader,
    S: SignalSource,
    F: CollaboratorFactory,
{
    match drive(plan) {
        Ok(exit) => {
            info!(target: PROCESS_TARGET, ?exit, "node run finished");
            exit
        }
        Err(error @ (NodeError::Config { .. } | NodeError::Telemetry { .. })) => {
            let _ = writeln!(io::stderr(), "wardend: {error}");
            NodeExit::Failed
        }
        Err(error) => {
            error!(target: PROCESS_TARGET, %error, "node run failed");
            NodeExit::Failed
        }
    }
}

fn drive<L, S, F>(plan: LaunchPlan<L, S, F>) -> Result<NodeExit, NodeError>
where
    L: ConfigLoader,
    S: SignalSource,
    F: CollaboratorFactory,
{
    let LaunchPlan { process, services } = plan;
    let ProcessControl { signals } = process;
    let ServiceDeps {
        loader,
        reporter,
        collaborators,
    } = services;

    let config = loader.load()?;
    let _telemetry = telemetry::initialise(&config)?;

    let cancellation = Cancellation::new();
    let recycler = Arc::new(HostRecycler::new(cancellation.clone()));
    listen_for_signals(signals.subscribe()?, cancellation.clone())?;

    let Collaborators {
        provider,
        topology,
        launcher,
    } = collaborators.build(&config);
    let interval = config.poll_interval();
    let mut controller = NodeController::new(
        config,
        NodeServices {
            provider,
            topology,
            launcher,
            recycler: recycler.clone(),
            reporter: reporter.clone(),
            attempt_log: telemetry::attempt_log(),
        },
    )?;

    match controller.start() {
        Ok(()) => {
            let outcome = controller.monitor(&IntervalTicker::new(interval, cancellation));
            debug!(target: PROCESS_TARGET, ?outcome, "monitoring ended");
        }
        Err(error) => debug!(target: PROCESS_TARGET, %error, "startup abandoned"),
    }
    controller.shutdown();
    reporter.node_stopped();

    Ok(if recycler.requested() {
        NodeExit::Recycle
    } else {
        NodeExit::Stopped
    })
}

fn listen_for_signals(stream: SignalStream, cancellation: Cancellation) -> Result<(), SignalError> {
    thread::Builder::new()
        .name("wardend-signals".to_owned())
        .spawn(move || {
            for signal in stream {
                match signal {
                    HostSignal::Stop => {
                        info!(target: PROCESS_TARGET, "stop requested");
                        cancellation.cancel();
                    }
                    HostSignal::Reconfigured => {
                        info!(target: PROCESS_TARGET, "host reconfiguration reported");
                        cancellation.reconfigure();
                    }
                }
            }
        })
        .map(drop)
        .map_err(|source| SignalError::Listener { source })
}
