//! Structured health reporting for node lifecycle events.

use std::sync::Arc;

use warden_config::Config;

use crate::lifecycle::{NodeError, RecycleReason, Stage};
use crate::topology::TopologySnapshot;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked once before provisioning begins.
    fn node_starting(&self, config: &Config);

    /// Invoked when a startup stage begins.
    fn stage_started(&self, stage: Stage);

    /// Invoked when a startup stage completes.
    fn stage_completed(&self, stage: Stage);

    /// Invoked when a startup stage fails.
    fn stage_failed(&self, stage: Stage, error: &NodeError);

    /// Invoked once the child is running and monitoring begins.
    fn monitoring_started(&self, snapshot: &TopologySnapshot, pid: u32);

    /// Invoked when the node asks to be recycled.
    fn recycle_requested(&self, reason: &RecycleReason);

    /// Invoked after the node has been torn down.
    fn node_stopped(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn node_starting(&self, config: &Config) {
        (**self).node_starting(config);
    }

    fn stage_started(&self, stage: Stage) {
        (**self).stage_started(stage);
    }

    fn stage_completed(&self, stage: Stage) {
        (**self).stage_completed(stage);
    }

    fn stage_failed(&self, stage: Stage, error: &NodeError) {
        (**self).stage_failed(stage, error);
    }

    fn monitoring_started(&self, snapshot: &TopologySnapshot, pid: u32) {
        (**self).monitoring_started(snapshot, pid);
    }

    fn recycle_requested(&self, reason: &RecycleReason) {
        (**self).recycle_requested(reason);
    }

    fn node_stopped(&self) {
        (**self).node_stopped();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn node_starting(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "node_starting",
            instance_id = %config.instance_id,
            server_version = config.server_major_version,
            listen = %config.listen(),
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "starting replica node"
        );
    }

    fn stage_started(&self, stage: Stage) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "stage_started",
            stage = %stage,
            "startup stage started"
        );
    }

    fn stage_completed(&self, stage: Stage) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "stage_completed",
            stage = %stage,
            "startup stage completed"
        );
    }

    fn stage_failed(&self, stage: Stage, error: &NodeError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "stage_failed",
            stage = %stage,
            error = %error,
            "startup stage failed"
        );
    }

    fn monitoring_started(&self, snapshot: &TopologySnapshot, pid: u32) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "monitoring_started",
            master = %snapshot.master_endpoint(),
            pid,
            "replica running"
        );
    }

    fn recycle_requested(&self, reason: &RecycleReason) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "recycle_requested",
            reason = %reason,
            "requesting node recycle"
        );
    }

    fn node_stopped(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "node_stopped",
            "replica node stopped"
        );
    }
}
