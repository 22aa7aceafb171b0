//! Clonable handle onto a running fleet monitor

use super::refresh::RefreshOutcome;
use super::{FleetSnapshot, MonitorCommand, NotificationStatus};
use crate::error::{HyperionError, Result};
use crate::incidents::IncidentBoard;
use crate::notify::DailyTrigger;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

/// Sends commands to the monitor and reads its published state. Cheap to
/// clone; every clone talks to the same monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<MonitorCommand>,
    snapshot_rx: watch::Receiver<Arc<FleetSnapshot>>,
    incidents_rx: watch::Receiver<Arc<IncidentBoard>>,
}

impl std::fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle").finish_non_exhaustive()
    }
}

impl MonitorHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<MonitorCommand>,
        snapshot_rx: watch::Receiver<Arc<FleetSnapshot>>,
        incidents_rx: watch::Receiver<Arc<IncidentBoard>>,
    ) -> Self {
        Self {
            commands,
            snapshot_rx,
            incidents_rx,
        }
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.snapshot_rx.borrow().clone()
    }

    /// The latest published incident board
    pub fn incidents(&self) -> Arc<IncidentBoard> {
        self.incidents_rx.borrow().clone()
    }

    /// Receiver that wakes on every published snapshot
    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<FleetSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Run a refresh cycle now and wait for its outcome
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorCommand::Refresh { reply })?;
        Self::wait(rx).await
    }

    /// Dismiss an incident by id
    pub async fn dismiss_incident(&self, incident_id: &str, reason: Option<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorCommand::DismissIncident {
            incident_id: incident_id.to_string(),
            reason,
            reply,
        })?;
        Self::wait(rx).await
    }

    /// Toggle the notification feature; returns the effective enabled state
    pub async fn set_notifications(&self, enabled: bool) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorCommand::SetNotifications { enabled, reply })?;
        Self::wait(rx).await
    }

    /// Reinstall the daily triggers; returns what is now installed
    pub async fn schedule_daily(&self) -> Result<Vec<DailyTrigger>> {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorCommand::ScheduleDaily { reply })?;
        Self::wait(rx).await
    }

    /// Change the system the evening summary points at
    pub async fn set_primary_system(&self, system_id: Option<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorCommand::SetPrimarySystem { system_id, reply })?;
        Self::wait(rx).await
    }

    /// Current notification feature state
    pub async fn notification_status(&self) -> Result<NotificationStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(MonitorCommand::NotificationStatus { reply })?;
        Self::wait(rx).await
    }

    fn send(&self, command: MonitorCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| HyperionError::session("Monitor command channel closed"))
    }

    async fn wait<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        rx.await
            .map_err(|_| HyperionError::session("Monitor stopped before replying"))?
    }
}
