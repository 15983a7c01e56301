//! Recording doubles for the controller's injected capabilities.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use warden_config::Config;

use crate::lifecycle::{RecycleReason, Recycler, Tick, Ticker};
use crate::process::{
    CollaboratorFactory, Collaborators, HostSignal, SignalError, SignalSource, SignalStream,
};
use crate::supervisor::{ChildLauncher, ChildProcessHandle, LaunchCommand, LaunchError, SystemLauncher};
use crate::topology::DirectoryTopology;
use crate::volume::LocalVolumeProvider;

const LONG_RUNNING: &str = "exec sleep 30";

/// Polls `condition` until it holds or `timeout` passes.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

#[derive(Debug)]
enum LaunchBehaviour {
    Script(String),
    Fail,
}

/// Launcher that records each command and runs a shell script in its place.
#[derive(Debug, Clone)]
pub(crate) struct RecordingLauncher {
    behaviour: Arc<LaunchBehaviour>,
    commands: Arc<Mutex<Vec<LaunchCommand>>>,
}

impl Default for RecordingLauncher {
    fn default() -> Self {
        Self::running(LONG_RUNNING)
    }
}

impl RecordingLauncher {
    /// Runs `script` with `sh -c` instead of the requested command.
    pub(crate) fn running(script: &str) -> Self {
        Self {
            behaviour: Arc::new(LaunchBehaviour::Script(script.to_owned())),
            commands: Arc::default(),
        }
    }

    /// Fails every launch as if the executable were missing.
    pub(crate) fn failing() -> Self {
        Self {
            behaviour: Arc::new(LaunchBehaviour::Fail),
            commands: Arc::default(),
        }
    }

    pub(crate) fn commands(&self) -> Vec<LaunchCommand> {
        self.commands.lock().expect("launcher mutex poisoned").clone()
    }
}

impl ChildLauncher for RecordingLauncher {
    fn launch(&self, command: &LaunchCommand) -> Result<ChildProcessHandle, LaunchError> {
        self.commands
            .lock()
            .expect("launcher mutex poisoned")
            .push(command.clone());
        match &*self.behaviour {
            LaunchBehaviour::Script(script) => SystemLauncher::new().launch(&LaunchCommand::new(
                "sh",
                ["-c", script.as_str()],
                &command.working_dir,
            )),
            LaunchBehaviour::Fail => Err(LaunchError::Spawn {
                executable: command.executable.clone(),
                working_dir: command.working_dir.clone(),
                source: io::Error::from(io::ErrorKind::NotFound),
            }),
        }
    }
}

/// Recycler recording every request it receives.
#[derive(Debug, Default)]
pub(crate) struct RecordingRecycler {
    reasons: Mutex<Vec<RecycleReason>>,
}

impl RecordingRecycler {
    pub(crate) fn reasons(&self) -> Vec<RecycleReason> {
        self.reasons.lock().expect("recycler mutex poisoned").clone()
    }
}

impl Recycler for RecordingRecycler {
    fn request_recycle(&self, reason: &RecycleReason) {
        self.reasons
            .lock()
            .expect("recycler mutex poisoned")
            .push(reason.clone());
    }
}

/// Ticker replaying a fixed script, then reporting cancellation.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTicker {
    ticks: Mutex<VecDeque<Tick>>,
}

impl ScriptedTicker {
    pub(crate) fn new(ticks: impl IntoIterator<Item = Tick>) -> Self {
        Self {
            ticks: Mutex::new(ticks.into_iter().collect()),
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.ticks.lock().expect("ticker mutex poisoned").len()
    }
}

impl Ticker for ScriptedTicker {
    fn wait(&self) -> Tick {
        self.ticks
            .lock()
            .expect("ticker mutex poisoned")
            .pop_front()
            .unwrap_or(Tick::Cancelled)
    }
}

/// Signal source fed from the test through a channel.
#[derive(Debug)]
pub(crate) struct TestSignalSource {
    sender: Sender<HostSignal>,
    receiver: Mutex<Option<Receiver<HostSignal>>>,
}

impl Default for TestSignalSource {
    fn default() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }
}

impl TestSignalSource {
    /// Queues a signal; it is delivered once the node subscribes.
    pub(crate) fn send(&self, signal: HostSignal) {
        self.sender.send(signal).expect("signal receiver dropped");
    }
}

impl SignalSource for TestSignalSource {
    fn subscribe(&self) -> Result<SignalStream, SignalError> {
        let receiver = self
            .receiver
            .lock()
            .expect("signal mutex poisoned")
            .take()
            .expect("signals subscribed twice");
        Ok(Box::new(receiver.into_iter()))
    }
}

/// Directory-backed storage and topology with a recording launcher.
#[derive(Debug, Clone, Default)]
pub(crate) struct TestCollaborators {
    pub(crate) launcher: RecordingLauncher,
}

impl CollaboratorFactory for TestCollaborators {
    fn build(&self, config: &Config) -> Collaborators {
        Collaborators {
            provider: Box::new(LocalVolumeProvider::new(
                config.volume_root.clone().into_std_path_buf(),
            )),
            topology: Box::new(DirectoryTopology::new(
                config.topology_dir.clone().into_std_path_buf(),
            )),
            launcher: Box::new(self.launcher.clone()),
        }
    }
}
