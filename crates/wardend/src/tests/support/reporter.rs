//! Test double for [`HealthReporter`] that records lifecycle events.

use std::sync::Mutex;

use warden_config::Config;

use crate::health::HealthReporter;
use crate::lifecycle::{NodeError, RecycleReason, Stage};
use crate::topology::TopologySnapshot;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    NodeStarting,
    StageStarted(Stage),
    StageCompleted(Stage),
    StageFailed(Stage, String),
    MonitoringStarted { master: String },
    RecycleRequested(String),
    NodeStopped,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn node_starting(&self, _config: &Config) {
        self.record(HealthEvent::NodeStarting);
    }

    fn stage_started(&self, stage: Stage) {
        self.record(HealthEvent::StageStarted(stage));
    }

    fn stage_completed(&self, stage: Stage) {
        self.record(HealthEvent::StageCompleted(stage));
    }

    fn stage_failed(&self, stage: Stage, error: &NodeError) {
        self.record(HealthEvent::StageFailed(stage, error.to_string()));
    }

    fn monitoring_started(&self, snapshot: &TopologySnapshot, _pid: u32) {
        self.record(HealthEvent::MonitoringStarted {
            master: snapshot.master_endpoint().to_owned(),
        });
    }

    fn recycle_requested(&self, reason: &RecycleReason) {
        self.record(HealthEvent::RecycleRequested(reason.to_string()));
    }

    fn node_stopped(&self) {
        self.record(HealthEvent::NodeStopped);
    }
}
