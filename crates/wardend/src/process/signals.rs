use std::io;
use std::iter;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Host notifications the node reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    /// Stop the node and exit cleanly.
    Stop,
    /// The host environment changed; the node must be recycled.
    Reconfigured,
}

impl HostSignal {
    /// Maps a raw signal number onto a host notification.
    #[must_use]
    pub fn from_raw(signal: i32) -> Option<Self> {
        match signal {
            SIGHUP => Some(Self::Reconfigured),
            SIGTERM | SIGINT | SIGQUIT => Some(Self::Stop),
            _ => None,
        }
    }
}

/// Stream of host notifications.
pub type SignalStream = Box<dyn Iterator<Item = HostSignal> + Send>;

/// Abstraction over host notification mechanisms.
pub trait SignalSource: Send + Sync {
    /// Starts listening, returning a blocking stream of notifications.
    fn subscribe(&self) -> Result<SignalStream, SignalError>;
}

/// Errors reported while wiring host signal handling.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        #[source]
        source: io::Error,
    },
    /// The listener thread could not be spawned.
    #[error("failed to spawn signal listener: {source}")]
    Listener {
        #[source]
        source: io::Error,
    },
}

/// Signal source backed by POSIX signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSignalSource;

impl SignalSource for SystemSignalSource {
    fn subscribe(&self) -> Result<SignalStream, SignalError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| SignalError::Install { source })?;
        let stream = iter::from_fn(move || signals.forever().next()).filter_map(|signal| {
            info!(target: PROCESS_TARGET, signal, "host signal received");
            HostSignal::from_raw(signal)
        });
        Ok(Box::new(stream))
    }
}
