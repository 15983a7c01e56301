//! Node lifecycle: provision, sync and launch once, then monitor until the
//! node has to be recycled.
//!
//! [`NodeController`] owns every piece of per-node state (the volume, the
//! child and the topology snapshot used at launch). Any failure, at startup
//! or while monitoring, moves it to [`LifecycleState::Recycling`] and issues
//! exactly one request through the injected [`Recycler`]; there is no
//! in-process retry.

mod errors;
mod recycle;
mod schedule;

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use warden_config::{Config, FileLocations};

use crate::health::HealthReporter;
use crate::supervisor::{ChildLauncher, ChildProcessHandle, LaunchCommand, ReplicaLaunch};
use crate::sync::{self, TemplateSource};
use crate::telemetry::AttemptLog;
use crate::topology::{self, NodeRegistration, Topology, TopologySnapshot};
use crate::volume::{Provisioner, VolumeHandle, VolumeProvider, VolumeRequest};

pub use errors::{NodeError, RecycleReason, RuntimeFault};
pub use recycle::{HostRecycler, RecycleLatch, Recycler};
pub use schedule::{Cancellation, IntervalTicker, Tick, Ticker};

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Startup stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Provisioning,
    Syncing,
    Launching,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Syncing => "syncing",
            Self::Launching => "launching",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Controller states. `Recycling` and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Provisioning,
    Syncing,
    Launching,
    Monitoring,
    Recycling,
    Stopped,
}

impl From<Stage> for LifecycleState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Provisioning => Self::Provisioning,
            Stage::Syncing => Self::Syncing,
            Stage::Launching => Self::Launching,
        }
    }
}

/// How a monitoring loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// A runtime fault was detected and a recycle requested.
    Recycled,
    /// The ticker was cancelled.
    Cancelled,
}

/// Collaborators injected into a [`NodeController`].
pub struct NodeServices {
    pub provider: Box<dyn VolumeProvider>,
    pub topology: Box<dyn Topology>,
    pub launcher: Box<dyn ChildLauncher>,
    pub recycler: Arc<dyn Recycler>,
    pub reporter: Arc<dyn HealthReporter>,
    pub attempt_log: AttemptLog,
}

/// Drives a single replica node through its lifecycle.
pub struct NodeController {
    config: Config,
    locations: FileLocations,
    provisioner: Provisioner,
    topology: Box<dyn Topology>,
    launcher: Box<dyn ChildLauncher>,
    recycler: Arc<dyn Recycler>,
    reporter: Arc<dyn HealthReporter>,
    attempt_log: AttemptLog,
    latch: RecycleLatch,
    state: LifecycleState,
    volume: Option<VolumeHandle>,
    child: Option<ChildProcessHandle>,
    launched: Option<TopologySnapshot>,
}

impl NodeController {
    /// Builds an idle controller, resolving the file layout for the
    /// configured server version.
    pub fn new(config: Config, services: NodeServices) -> Result<Self, NodeError> {
        let locations = config.file_locations()?;
        let NodeServices {
            provider,
            topology,
            launcher,
            recycler,
            reporter,
            attempt_log,
        } = services;
        Ok(Self {
            config,
            locations,
            provisioner: Provisioner::new(provider),
            topology,
            launcher,
            recycler,
            reporter,
            attempt_log,
            latch: RecycleLatch::default(),
            state: LifecycleState::Idle,
            volume: None,
            child: None,
            launched: None,
        })
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn volume(&self) -> Option<&VolumeHandle> {
        self.volume.as_ref()
    }

    #[must_use]
    pub fn child(&self) -> Option<&ChildProcessHandle> {
        self.child.as_ref()
    }

    /// Topology snapshot the running child was launched against.
    #[must_use]
    pub fn launched_snapshot(&self) -> Option<&TopologySnapshot> {
        self.launched.as_ref()
    }

    /// Runs provisioning, synchronisation and launch in order.
    ///
    /// On failure the controller requests a recycle before returning the
    /// error. Calling `start` outside the idle state does nothing.
    pub fn start(&mut self) -> Result<(), NodeError> {
        if self.state != LifecycleState::Idle {
            debug!(target: LIFECYCLE_TARGET, state = ?self.state, "start ignored");
            return Ok(());
        }
        self.reporter.node_starting(&self.config);
        if let Err((stage, error)) = self.run_startup() {
            self.reporter.stage_failed(stage, &error);
            self.recycle(RecycleReason::Startup {
                stage,
                message: error.to_string(),
            });
            return Err(error);
        }
        self.state = LifecycleState::Monitoring;
        if let (Some(snapshot), Some(child)) = (&self.launched, &self.child) {
            self.reporter.monitoring_started(snapshot, child.pid());
        }
        Ok(())
    }

    /// Polls the child and the topology on every tick until a fault is
    /// found or the ticker is cancelled. A host reconfiguration counts as a
    /// fault.
    pub fn monitor(&mut self, ticker: &dyn Ticker) -> MonitorOutcome {
        match self.state {
            LifecycleState::Monitoring => {}
            LifecycleState::Recycling => return MonitorOutcome::Recycled,
            state => {
                debug!(target: LIFECYCLE_TARGET, ?state, "nothing to monitor");
                return MonitorOutcome::Cancelled;
            }
        }
        loop {
            let fault = match ticker.wait() {
                Tick::Cancelled => {
                    info!(target: LIFECYCLE_TARGET, "monitoring cancelled");
                    return MonitorOutcome::Cancelled;
                }
                Tick::Reconfigured => Some(RuntimeFault::HostReconfigured),
                Tick::Elapsed => self.inspect(),
            };
            if let Some(fault) = fault {
                warn!(target: LIFECYCLE_TARGET, %fault, "runtime fault detected");
                self.recycle(RecycleReason::Runtime(fault));
                return MonitorOutcome::Recycled;
            }
        }
    }

    /// Stops the child and releases the volume. Failures are logged.
    pub fn shutdown(&mut self) {
        if let Some(child) = self.child.take() {
            child.kill(self.config.kill_timeout());
        }
        if let Some(volume) = self.volume.take()
            && let Err(error) = self.provisioner.release(&volume)
        {
            warn!(
                target: LIFECYCLE_TARGET,
                volume = %volume.volume_name(),
                %error,
                "failed to release volume"
            );
        }
        if self.state != LifecycleState::Recycling {
            self.state = LifecycleState::Stopped;
        }
        self.attempt_log.detach();
    }

    fn run_startup(&mut self) -> Result<(), (Stage, NodeError)> {
        let volume = self.stage(Stage::Provisioning, Self::provision)?;
        self.stage(Stage::Syncing, |controller| controller.synchronise(&volume))?;
        self.stage(Stage::Launching, |controller| controller.launch(&volume))
    }

    fn stage<T>(
        &mut self,
        stage: Stage,
        step: impl FnOnce(&mut Self) -> Result<T, NodeError>,
    ) -> Result<T, (Stage, NodeError)> {
        self.state = stage.into();
        self.reporter.stage_started(stage);
        let value = step(self).map_err(|error| (stage, error))?;
        self.reporter.stage_completed(stage);
        Ok(value)
    }

    fn provision(&mut self) -> Result<VolumeHandle, NodeError> {
        let request = VolumeRequest {
            instance_id: self.config.instance_id.clone(),
            volume_name: self.locations.volume_name(),
            size_mb: self.config.volume_size_mb,
            cache_dir: self.config.cache_dir.clone().into_std_path_buf(),
            cache_capacity_mb: self.config.cache_capacity_mb,
        };
        let volume = self.provisioner.acquire(&request, &self.locations)?;
        self.volume = Some(volume.clone());

        let log_dir = volume.log_dir();
        let log_path = self
            .attempt_log
            .attach(&log_dir)
            .map_err(|source| NodeError::AttemptLog {
                path: log_dir.clone(),
                source,
            })?;
        info!(
            target: LIFECYCLE_TARGET,
            log = %log_path.display(),
            "attempt log attached"
        );

        let listen = self.config.listen();
        self.topology.publish_self_endpoint(&NodeRegistration {
            instance_id: self.config.instance_id.clone(),
            address: listen.host().to_owned(),
            port: listen.port(),
            is_master: false,
        })?;
        Ok(volume)
    }

    fn synchronise(&mut self, volume: &VolumeHandle) -> Result<(), NodeError> {
        let source = TemplateSource {
            distribution_root: self.config.distribution_root.clone().into_std_path_buf(),
            template_dir: self.config.template_dir.clone().into_std_path_buf(),
        };
        sync::synchronize(&volume.storage_dir(), &source, &self.locations)?;
        Ok(())
    }

    fn launch(&mut self, volume: &VolumeHandle) -> Result<(), NodeError> {
        let snapshot = topology::resolve_snapshot(&*self.topology)?;
        let command = LaunchCommand::for_replica(&ReplicaLaunch {
            java_executable: self.config.java_executable.clone(),
            server_home: volume.storage_dir(),
            port: self.config.listen().port(),
            master_endpoint: snapshot.master_endpoint().to_owned(),
            core_name: self.config.core_name.clone(),
            distribution_root: self.config.distribution_root.clone().into_std_path_buf(),
        });
        let child = self.launcher.launch(&command)?;
        self.child = Some(child);
        self.launched = Some(snapshot);
        Ok(())
    }

    /// One monitoring pass. A dead child wins over topology changes.
    fn inspect(&self) -> Option<RuntimeFault> {
        if let Some(child) = &self.child
            && child.has_exited()
        {
            let status = child
                .take_exit_report()
                .map_or_else(|| "unknown status".to_owned(), |report| report.status);
            return Some(RuntimeFault::ChildExited {
                pid: child.pid(),
                status,
            });
        }
        let launched = self.launched.as_ref()?;
        match topology::resolve_snapshot(&*self.topology) {
            Ok(current) if current == *launched => None,
            Ok(current) => Some(RuntimeFault::MasterChanged {
                previous: launched.master_endpoint().to_owned(),
                current: current.master_endpoint().to_owned(),
            }),
            Err(error) => Some(RuntimeFault::TopologyUnavailable {
                message: error.to_string(),
            }),
        }
    }

    fn recycle(&mut self, reason: RecycleReason) {
        self.state = LifecycleState::Recycling;
        if self.latch.engage() {
            self.reporter.recycle_requested(&reason);
            self.recycler.request_recycle(&reason);
        }
    }
}

impl Drop for NodeController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
