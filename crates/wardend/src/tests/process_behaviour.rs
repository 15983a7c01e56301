//! Behavioural tests covering a full node run and its exit codes.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use warden_config::Config;

use crate::bootstrap::{ConfigLoader, StaticConfigLoader};
use crate::process::{HostSignal, LaunchPlan, NodeExit, ProcessControl, ServiceDeps, run_node_with};
use crate::tests::support::{
    HealthEvent, RecordingHealthReporter, ReplicaTree, TestCollaborators, TestSignalSource,
};

type StepResult = Result<(), String>;

/// Loader returning the fixture's configuration, or parsing arguments like
/// the command line would.
#[derive(Debug, Clone)]
enum WorldLoader {
    Resolved(StaticConfigLoader),
    Arguments(Vec<&'static str>),
}

impl ConfigLoader for WorldLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        match self {
            Self::Resolved(loader) => loader.load(),
            Self::Arguments(args) => Config::load_from_iter(args.iter().map(OsString::from)),
        }
    }
}

struct ProcessWorld {
    tree: ReplicaTree,
    loader: WorldLoader,
    reporter: Arc<RecordingHealthReporter>,
    signals: Option<TestSignalSource>,
    collaborators: TestCollaborators,
    exit: Option<NodeExit>,
}

impl ProcessWorld {
    fn volume_dir(&self) -> PathBuf {
        self.tree
            .root()
            .join("volumes/replica-in-0")
            .join(self.tree.locations().volume_name())
    }

    fn send(&self, signal: HostSignal) -> StepResult {
        self.signals
            .as_ref()
            .ok_or_else(|| "the node already ran".to_owned())?
            .send(signal);
        Ok(())
    }
}

#[fixture]
fn world() -> RefCell<ProcessWorld> {
    let tree = ReplicaTree::new(4);
    let loader = WorldLoader::Resolved(StaticConfigLoader::new(tree.config()));
    RefCell::new(ProcessWorld {
        tree,
        loader,
        reporter: Arc::default(),
        signals: Some(TestSignalSource::default()),
        collaborators: TestCollaborators::default(),
        exit: None,
    })
}

#[given("a replica host whose master is \"{endpoint}\"")]
fn given_master(world: &RefCell<ProcessWorld>, endpoint: String) {
    world.borrow().tree.publish_master(&endpoint);
}

#[given("a replica host without a published master")]
fn given_no_master(world: &RefCell<ProcessWorld>) {
    let _ = world;
}

#[given("a replica host with an unparsable configuration")]
fn given_unparsable_configuration(world: &RefCell<ProcessWorld>) {
    world.borrow_mut().loader =
        WorldLoader::Arguments(vec!["wardend", "--listen", "tcp://replica:8983"]);
}

#[given("the host has asked the node to stop")]
fn given_stop_requested(world: &RefCell<ProcessWorld>) -> StepResult {
    world.borrow().send(HostSignal::Stop)
}

#[given("the host has reported a configuration change")]
fn given_reconfigured(world: &RefCell<ProcessWorld>) -> StepResult {
    world.borrow().send(HostSignal::Reconfigured)
}

#[when("the node runs")]
fn when_node_runs(world: &RefCell<ProcessWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let signals = world
        .signals
        .take()
        .ok_or_else(|| "the node already ran".to_owned())?;
    let plan = LaunchPlan {
        process: ProcessControl { signals },
        services: ServiceDeps {
            loader: world.loader.clone(),
            reporter: world.reporter.clone(),
            collaborators: world.collaborators.clone(),
        },
    };
    world.exit = Some(run_node_with(plan));
    Ok(())
}

#[then("the node exits with code {code}")]
fn then_exit_code(world: &RefCell<ProcessWorld>, code: u8) -> StepResult {
    match world.borrow().exit {
        Some(exit) if exit.code() == code => Ok(()),
        other => Err(format!("expected exit code {code}, got {other:?}")),
    }
}

#[then("the node reported a recycle request")]
fn then_recycle_reported(world: &RefCell<ProcessWorld>) -> StepResult {
    let events = world.borrow().reporter.events();
    let recycles = events
        .iter()
        .filter(|event| matches!(event, HealthEvent::RecycleRequested(_)))
        .count();
    if recycles == 1 {
        Ok(())
    } else {
        Err(format!("expected one recycle request, got {events:?}"))
    }
}

#[then("the search server was launched")]
fn then_launched(world: &RefCell<ProcessWorld>) {
    let commands = world.borrow().collaborators.launcher.commands();
    assert_eq!(commands.len(), 1, "expected one launch: {commands:?}");
}

#[then("the search server was not launched")]
fn then_not_launched(world: &RefCell<ProcessWorld>) {
    let commands = world.borrow().collaborators.launcher.commands();
    assert!(commands.is_empty(), "unexpected launches: {commands:?}");
}

#[then("the volume lease was released")]
fn then_lease_released(world: &RefCell<ProcessWorld>) {
    let volume = world.borrow().volume_dir();
    assert!(volume.join("mnt").is_dir(), "volume should have been mounted");
    assert!(!volume.join(".lease").exists(), "lease should be released");
}

#[then("the attempt log was created on the volume")]
fn then_attempt_log_created(world: &RefCell<ProcessWorld>) -> StepResult {
    let logs = world.borrow().volume_dir().join("mnt/logs");
    let count = fs::read_dir(&logs)
        .map_err(|error| format!("{}: {error}", logs.display()))?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("node_"))
        .count();
    if count == 1 {
        Ok(())
    } else {
        Err(format!("expected one attempt log, found {count}"))
    }
}

#[scenario(path = "tests/features/process_stop.feature")]
fn process_stop(#[from(world)] _: RefCell<ProcessWorld>) -> Result<(), String> {
    Ok(())
}

#[scenario(path = "tests/features/process_recycle.feature")]
fn process_recycle(#[from(world)] _: RefCell<ProcessWorld>) -> Result<(), String> {
    Ok(())
}

#[scenario(path = "tests/features/process_startup_failure.feature")]
fn process_startup_failure(#[from(world)] _: RefCell<ProcessWorld>) -> Result<(), String> {
    Ok(())
}

#[scenario(path = "tests/features/process_config_failure.feature")]
fn process_config_failure(#[from(world)] _: RefCell<ProcessWorld>) -> Result<(), String> {
    Ok(())
}
