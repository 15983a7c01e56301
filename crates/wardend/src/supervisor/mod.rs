//! Search server process supervision.
//!
//! [`ChildLauncher`] starts the server from a [`LaunchCommand`];
//! [`SystemLauncher`] does so with `std::process`, draining the child's
//! output into `tracing` and observing its exit on background threads. The
//! resulting [`ChildProcessHandle`] exposes the exit flag the lifecycle
//! controller polls and the bounded [`ChildProcessHandle::kill`].

mod system;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::{debug, info, warn};

use warden_config::{LAUNCH_DIR, LAUNCH_JAR};

pub use system::SystemLauncher;

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");
pub(crate) const CHILD_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::child");

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const FORCED_EXIT_GRACE: Duration = Duration::from_millis(500);

/// Executable, arguments and working directory of a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub executable: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

/// Inputs embedded in the replica server's command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaLaunch {
    pub java_executable: String,
    /// Storage directory on the mounted volume, used as the server home.
    pub server_home: PathBuf,
    pub port: u16,
    /// Base URL of the master the replica polls.
    pub master_endpoint: String,
    pub core_name: String,
    pub distribution_root: PathBuf,
}

impl LaunchCommand {
    #[must_use]
    pub fn new(
        executable: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: working_dir.into(),
        }
    }

    /// Builds the servlet container command line for a replica node.
    #[must_use]
    pub fn for_replica(launch: &ReplicaLaunch) -> Self {
        let master = launch.master_endpoint.trim_end_matches('/');
        let args = vec![
            format!("-Dsolr.solr.home={}", launch.server_home.display()),
            format!("-Djetty.port={}", launch.port),
            "-Denable.slave=true".to_owned(),
            format!("-DmasterUrl={master}/replication"),
            format!("-DdefaultCoreName={}", launch.core_name),
            "-jar".to_owned(),
            launch.distribution_root.join(LAUNCH_JAR).display().to_string(),
        ];
        Self::new(
            launch.java_executable.clone(),
            args,
            launch.distribution_root.join(LAUNCH_DIR),
        )
    }
}

/// Starts child processes.
pub trait ChildLauncher: Send + Sync {
    /// Spawns the command and registers its exit observer.
    fn launch(&self, command: &LaunchCommand) -> Result<ChildProcessHandle, LaunchError>;
}

/// Errors raised while starting the child.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The process could not be spawned.
    #[error("failed to spawn '{executable}' in '{}': {source}", working_dir.display())]
    Spawn {
        executable: String,
        working_dir: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A standard stream was not captured.
    #[error("child process did not expose its {stream} pipe")]
    MissingPipe { stream: &'static str },
    /// A supervision thread could not be started.
    #[error("failed to start the {role} thread: {source}")]
    Thread {
        role: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Exit observed for a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub pid: u32,
    /// Exit code when the child exited normally.
    pub code: Option<i32>,
    /// Human-readable exit status.
    pub status: String,
}

/// A running child and the state shared with its exit observer.
///
/// The observer thread is the only writer of the exit flag. It sends the
/// [`ExitReport`] before raising the flag, so a raised flag always has a
/// report waiting.
#[derive(Debug)]
pub struct ChildProcessHandle {
    pid: u32,
    exited: Arc<AtomicBool>,
    exits: Receiver<ExitReport>,
    observer: Option<JoinHandle<()>>,
}

impl ChildProcessHandle {
    pub(crate) fn new(
        pid: u32,
        exited: Arc<AtomicBool>,
        exits: Receiver<ExitReport>,
        observer: JoinHandle<()>,
    ) -> Self {
        Self {
            pid,
            exited,
            exits,
            observer: Some(observer),
        }
    }

    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Reports whether the exit observer has seen the child exit.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Takes the exit report, if the child has exited and the report has not
    /// been taken yet.
    #[must_use]
    pub fn take_exit_report(&self) -> Option<ExitReport> {
        self.exits.try_recv().ok()
    }

    /// Stops the child, escalating to `SIGKILL` when it outlives `timeout`.
    ///
    /// Shutdown is best effort: failures are logged and never returned.
    pub fn kill(mut self, timeout: Duration) {
        if !self.has_exited() {
            self.signal(Signal::SIGTERM);
            if !self.wait_for_exit(timeout) {
                warn!(
                    target: SUPERVISOR_TARGET,
                    pid = self.pid,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "child ignored termination request; killing"
                );
                self.signal(Signal::SIGKILL);
                if !self.wait_for_exit(FORCED_EXIT_GRACE) {
                    warn!(
                        target: SUPERVISOR_TARGET,
                        pid = self.pid,
                        "child still running after kill; abandoning"
                    );
                    return;
                }
            }
        }
        if let Some(observer) = self.observer.take()
            && observer.join().is_err()
        {
            warn!(target: SUPERVISOR_TARGET, pid = self.pid, "exit observer panicked");
        }
        info!(target: SUPERVISOR_TARGET, pid = self.pid, "child stopped");
    }

    fn signal(&self, signal: Signal) {
        let Ok(raw) = i32::try_from(self.pid) else {
            warn!(target: SUPERVISOR_TARGET, pid = self.pid, "pid out of range for signalling");
            return;
        };
        if let Err(errno) = kill(Pid::from_raw(raw), signal) {
            debug!(
                target: SUPERVISOR_TARGET,
                pid = self.pid,
                ?signal,
                %errno,
                "failed to signal child"
            );
        }
    }

    fn wait_for_exit(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.has_exited() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
        true
    }
}
