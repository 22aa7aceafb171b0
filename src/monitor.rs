//! Fleet monitoring core for Hyperion
//!
//! This module owns the polling session that drives the whole system: it
//! refreshes per-system status from the remote backend, classifies and
//! aggregates the results into a [`FleetSnapshot`], feeds fault observations
//! into the incident tracker, and raises notifications through the
//! scheduler. Consumers (web, tests) talk to a running monitor through a
//! clonable [`MonitorHandle`].

use crate::api::StatusApi;
use crate::config::Config;
use crate::error::Result;
use crate::incidents::{EscalationPolicy, IncidentBoard, IncidentTracker};
use crate::logging::get_logger;
use crate::notify::{DailyTrigger, NotificationGateway, NotificationScheduler, PermissionState};
use crate::status::{StatusCounts, SystemStatus, overall_status};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

mod handle;
mod refresh;
mod runtime;

pub use handle::MonitorHandle;
pub use refresh::{RefreshFailure, RefreshOutcome};

/// Main monitor state
#[derive(Debug, Clone)]
pub enum MonitorState {
    /// Monitor is initializing
    Initializing,
    /// Monitor is running normally
    Running,
    /// Monitor is in error state (last refresh failed outright)
    Error(String),
    /// Monitor is shutting down
    ShuttingDown,
}

/// Aggregated health of one PV system at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    /// PV system id
    pub system_id: String,

    /// Display name from the system profile
    pub name: String,

    /// Derived classification
    pub status: SystemStatus,

    /// Inverter count reported by the backend
    pub total_inverters: usize,

    /// Inverters currently producing
    pub producing: usize,

    /// Inverters currently faulted
    pub faulted: usize,

    /// Inverters currently idle
    pub idle: usize,

    /// Ids of the faulted inverters
    pub faulted_devices: Vec<String>,

    /// Backend-reported measurement time, when present
    pub last_updated: Option<DateTime<Utc>>,

    /// When `status` last changed value, as observed by this monitor
    pub last_status_change: DateTime<Utc>,

    /// True when this entry is carried over from a previous refresh
    /// because the latest fetch for the system failed
    pub stale: bool,
}

/// Wholesale view of the entire fleet, rebuilt on every successful refresh.
/// Never patched in place; consumers always see a complete snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSnapshot {
    /// Monotonically increasing refresh generation; 0 is the empty
    /// pre-first-refresh snapshot
    pub generation: u64,

    /// When this snapshot was assembled
    pub taken_at: DateTime<Utc>,

    /// Fleet-wide classification folded over all systems
    pub overall: SystemStatus,

    /// Per-status tallies; always sums to `systems.len()`
    pub counts: StatusCounts,

    /// Per-system health keyed by system id
    pub systems: BTreeMap<String, SystemHealth>,
}

impl FleetSnapshot {
    /// The snapshot consumers see before the first refresh completes
    pub fn empty() -> Self {
        Self {
            generation: 0,
            taken_at: Utc::now(),
            overall: SystemStatus::Moon,
            counts: StatusCounts::default(),
            systems: BTreeMap::new(),
        }
    }

    /// Derive the fleet-wide aggregate from per-system health. Counts and
    /// overall status are always recomputed here, never hand-edited.
    pub fn from_systems(
        generation: u64,
        taken_at: DateTime<Utc>,
        systems: BTreeMap<String, SystemHealth>,
    ) -> Self {
        let overall = overall_status(systems.values().map(|system| system.status));
        let counts = StatusCounts::tally(systems.values().map(|system| system.status));
        Self {
            generation,
            taken_at,
            overall,
            counts,
            systems,
        }
    }
}

/// Notification feature state reported to consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationStatus {
    /// Persisted user preference
    pub enabled: bool,

    /// Platform permission state
    pub permission: PermissionState,

    /// System the evening summary is keyed to
    pub primary_system: Option<String>,

    /// Triggers currently installed with the platform
    pub triggers: Vec<DailyTrigger>,
}

/// Commands accepted by the monitor from external components (web, etc.).
/// Every command carries a oneshot for its reply; a dropped reply receiver
/// is ignored.
pub enum MonitorCommand {
    /// Run a refresh cycle now, outside the regular poll interval
    Refresh {
        reply: oneshot::Sender<Result<refresh::RefreshOutcome>>,
    },
    /// Dismiss an incident by id
    DismissIncident {
        incident_id: String,
        reason: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Toggle the notification feature
    SetNotifications {
        enabled: bool,
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Reinstall the daily triggers
    ScheduleDaily {
        reply: oneshot::Sender<Result<Vec<DailyTrigger>>>,
    },
    /// Change the system the evening summary points at
    SetPrimarySystem {
        system_id: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Report the notification feature state
    NotificationStatus {
        reply: oneshot::Sender<Result<NotificationStatus>>,
    },
}

/// Main polling session for Hyperion
pub struct FleetMonitor {
    /// Configuration
    config: Config,

    /// Remote status backend
    api: Arc<dyn StatusApi>,

    /// Notification scheduling and delivery
    scheduler: NotificationScheduler,

    /// Incident lifecycle state
    tracker: IncidentTracker,

    /// Policy deciding when pending incidents escalate
    escalation: EscalationPolicy,

    /// Current monitor state
    state: watch::Sender<MonitorState>,

    /// Command receiver for external control
    commands_rx: mpsc::UnboundedReceiver<MonitorCommand>,

    /// Command sender cloned into handles
    commands_tx: mpsc::UnboundedSender<MonitorCommand>,

    /// Shutdown signal
    shutdown_tx: mpsc::UnboundedSender<()>,

    /// Shutdown receiver
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    /// Published snapshot, replaced wholesale after each refresh
    snapshot_tx: watch::Sender<Arc<FleetSnapshot>>,

    /// Kept so handles can subscribe even while no refresh has run
    snapshot_rx: watch::Receiver<Arc<FleetSnapshot>>,

    /// Published incident board
    incidents_tx: watch::Sender<Arc<IncidentBoard>>,

    /// Receiver half cloned into handles
    incidents_rx: watch::Receiver<Arc<IncidentBoard>>,

    /// Generation assigned to the next refresh cycle
    next_generation: u64,

    /// Last reminder time per incident id
    last_reminder: HashMap<String, DateTime<Utc>>,

    /// Logger
    logger: crate::logging::StructuredLogger,
}

impl FleetMonitor {
    /// Create a new monitor instance. Channels are owned here; consumers
    /// attach through [`FleetMonitor::handle`].
    pub fn new(
        config: Config,
        api: Arc<dyn StatusApi>,
        store: Arc<dyn KeyValueStore>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        let logger = get_logger("monitor");

        let scheduler =
            NotificationScheduler::new(gateway, store, config.notifications.clone(), config.tz());
        let tracker =
            IncidentTracker::new(config.incidents.ttl_secs, config.incidents.history_cap);
        let escalation = EscalationPolicy::new(Duration::seconds(
            config.incidents.escalate_after_secs as i64,
        ));

        let (state_tx, _) = watch::channel(MonitorState::Initializing);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(FleetSnapshot::empty()));
        let (incidents_tx, incidents_rx) = watch::channel(Arc::new(IncidentBoard::default()));

        logger.info("Initializing fleet monitor");

        Self {
            config,
            api,
            scheduler,
            tracker,
            escalation,
            state: state_tx,
            commands_rx,
            commands_tx,
            shutdown_tx,
            shutdown_rx,
            snapshot_tx,
            snapshot_rx,
            incidents_tx,
            incidents_rx,
            next_generation: 1,
            last_reminder: HashMap::new(),
            logger,
        }
    }

    /// Clonable handle for sending commands and reading published state
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle::new(
            self.commands_tx.clone(),
            self.snapshot_rx.clone(),
            self.incidents_rx.clone(),
        )
    }

    /// Sender that stops the run loop when signalled
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Subscribe to monitor state transitions
    pub fn state(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// Publish a completed snapshot unless a newer one is already out.
    /// Returns whether the snapshot was accepted.
    pub(crate) fn publish_snapshot(&self, snapshot: Arc<FleetSnapshot>) -> bool {
        let current = self.snapshot_tx.borrow().generation;
        if snapshot.generation <= current {
            self.logger.warn(&format!(
                "Discarding stale snapshot generation {} (current is {})",
                snapshot.generation, current
            ));
            return false;
        }
        self.snapshot_tx.send(snapshot).ok();
        true
    }

    /// Publish the incident board as of `now`
    pub(crate) fn publish_incidents(&self, now: DateTime<Utc>) {
        self.incidents_tx.send(Arc::new(self.tracker.board(now))).ok();
    }
}
