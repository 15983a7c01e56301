use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use super::{
    CHILD_TARGET, ChildLauncher, ChildProcessHandle, ExitReport, LaunchCommand, LaunchError,
    SUPERVISOR_TARGET,
};

/// Launches children with `std::process`.
///
/// Standard input is closed; standard output and error are drained line by
/// line on dedicated threads so the child never blocks on a full pipe.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl SystemLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ChildLauncher for SystemLauncher {
    fn launch(&self, command: &LaunchCommand) -> Result<ChildProcessHandle, LaunchError> {
        debug!(
            target: SUPERVISOR_TARGET,
            executable = %command.executable,
            args = ?command.args,
            working_dir = %command.working_dir.display(),
            "spawning child process"
        );
        let mut child = Command::new(&command.executable)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                executable: command.executable.clone(),
                working_dir: command.working_dir.clone(),
                source,
            })?;
        let pid = child.id();

        if let Err(error) = supervise(&mut child) {
            reap(child);
            return Err(error);
        }

        let exited = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel();
        let flag = Arc::clone(&exited);
        let observer = start_observer(child, move |body| {
            thread::Builder::new()
                .name(format!("child-{pid}-exit"))
                .spawn(move || {
                    if let Some(child) = body() {
                        observe_exit(child, &sender, &flag);
                    }
                })
        })?;

        info!(
            target: SUPERVISOR_TARGET,
            pid,
            executable = %command.executable,
            "child process started"
        );
        Ok(ChildProcessHandle::new(pid, exited, receiver, observer))
    }
}

/// Hands `child` to the exit observer started by `spawn`.
///
/// The observer receives the child only once its thread is running, so a
/// failed spawn leaves the child here to be killed and reaped.
fn start_observer<S>(child: Child, spawn: S) -> Result<JoinHandle<()>, LaunchError>
where
    S: FnOnce(Box<dyn FnOnce() -> Option<Child> + Send>) -> io::Result<JoinHandle<()>>,
{
    let (handoff, inbox) = mpsc::channel::<Child>();
    let observer = match spawn(Box::new(move || inbox.recv().ok())) {
        Ok(observer) => observer,
        Err(source) => {
            reap(child);
            return Err(LaunchError::Thread {
                role: "exit observer",
                source,
            });
        }
    };
    if let Err(mpsc::SendError(child)) = handoff.send(child) {
        reap(child);
        return Err(LaunchError::Thread {
            role: "exit observer",
            source: io::Error::other("exit observer stopped before receiving the child"),
        });
    }
    Ok(observer)
}

fn reap(mut child: Child) {
    drop(child.kill());
    drop(child.wait());
}

/// Starts the drain threads for the child's output streams.
fn supervise(child: &mut Child) -> Result<(), LaunchError> {
    let pid = child.id();
    let stdout = child
        .stdout
        .take()
        .ok_or(LaunchError::MissingPipe { stream: "stdout" })?;
    let stderr = child
        .stderr
        .take()
        .ok_or(LaunchError::MissingPipe { stream: "stderr" })?;
    spawn_drain(pid, "stdout", stdout)?;
    spawn_drain(pid, "stderr", stderr)?;
    Ok(())
}

fn spawn_drain<R>(pid: u32, stream: &'static str, reader: R) -> Result<(), LaunchError>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(format!("child-{pid}-{stream}"))
        .spawn(move || drain(pid, stream, reader))
        .map(drop)
        .map_err(|source| LaunchError::Thread {
            role: "output drain",
            source,
        })
}

/// Forwards each output line to `tracing` until the stream closes.
fn drain(pid: u32, stream: &'static str, reader: impl Read) {
    for line in BufReader::new(reader).split(b'\n') {
        match line {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let text = text.trim_end_matches('\r');
                info!(target: CHILD_TARGET, pid, stream, "{text}");
            }
            Err(error) => {
                debug!(target: CHILD_TARGET, pid, stream, %error, "output drain stopped");
                break;
            }
        }
    }
}

fn observe_exit(mut child: Child, sender: &Sender<ExitReport>, exited: &AtomicBool) {
    let pid = child.id();
    let report = match child.wait() {
        Ok(status) => report_for(pid, status),
        Err(error) => ExitReport {
            pid,
            code: None,
            status: format!("wait failed: {error}"),
        },
    };
    info!(
        target: SUPERVISOR_TARGET,
        pid,
        status = %report.status,
        "child process exited"
    );
    drop(sender.send(report));
    exited.store(true, Ordering::Release);
}

fn report_for(pid: u32, status: ExitStatus) -> ExitReport {
    ExitReport {
        pid,
        code: status.code(),
        status: status.to_string(),
    }
}
