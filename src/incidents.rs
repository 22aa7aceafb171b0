//! Incident lifecycle tracking for Hyperion
//!
//! This module owns fault incidents from first observation through
//! escalation, dismissal, or expiry. Expiry is a computed view over
//! `expires_at`, never a stored transition: incidents are retained for
//! history and historical queries stay consistent no matter when they run.

use crate::error::{HyperionError, Result};
use crate::logging::get_logger;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Incident lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    /// Fault observed, awaiting acknowledgement
    Pending,

    /// Unacknowledged past the policy window
    Escalated,

    /// Explicitly acknowledged; terminal
    Dismissed,
}

/// A tracked fault event with its own lifecycle, distinct from the
/// instantaneous status a snapshot reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    /// Unique incident id
    pub id: String,

    /// Faulted inverter device id
    pub device_id: String,

    /// Owning PV system id
    pub system_id: String,

    /// Lifecycle state
    pub status: IncidentStatus,

    /// Creation time (first fault observation)
    pub created_at: DateTime<Utc>,

    /// Expiry time; a pending incident past this point counts as resolved
    pub expires_at: DateTime<Utc>,

    /// Last transition time
    pub updated_at: Option<DateTime<Utc>>,

    /// Reason recorded at dismissal
    pub dismiss_reason: Option<String>,
}

impl Incident {
    /// Whether the incident reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status == IncidentStatus::Dismissed
    }

    /// Whether a still-pending incident has lapsed past its expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == IncidentStatus::Pending && now >= self.expires_at
    }

    /// Active means non-terminal and not expired; only active incidents
    /// participate in dedup and display counts
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_terminal() && !self.is_expired(now)
    }
}

/// Display grouping in fixed operational priority: most actionable first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentBoard {
    pub pending: Vec<Incident>,
    pub escalated: Vec<Incident>,
    pub dismissed: Vec<Incident>,
}

impl IncidentBoard {
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.escalated.is_empty() && self.dismissed.is_empty()
    }
}

/// Escalation policy applied from outside the tracker. The tracker records
/// transitions; deciding when a pending incident has gone unacknowledged too
/// long is operational policy and stays configurable.
#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy {
    /// How long a pending incident may wait before escalation
    pub acknowledge_within: Duration,
}

impl EscalationPolicy {
    pub fn new(acknowledge_within: Duration) -> Self {
        Self { acknowledge_within }
    }

    /// Ids of active pending incidents past the acknowledgement window
    pub fn due(&self, tracker: &IncidentTracker, now: DateTime<Utc>) -> Vec<String> {
        tracker
            .iter()
            .filter(|incident| {
                incident.status == IncidentStatus::Pending
                    && incident.is_active(now)
                    && now - incident.created_at >= self.acknowledge_within
            })
            .map(|incident| incident.id.clone())
            .collect()
    }
}

/// Tracker owning all incidents (active and historical)
pub struct IncidentTracker {
    /// All incidents in creation order, newest last
    incidents: Vec<Incident>,

    /// TTL applied to new incidents
    ttl: Duration,

    /// Maximum retained incidents
    history_cap: usize,

    /// Logger
    logger: crate::logging::StructuredLogger,
}

impl IncidentTracker {
    /// Create a new tracker
    pub fn new(ttl_secs: u64, history_cap: usize) -> Self {
        let logger = get_logger("incidents");

        Self {
            incidents: Vec::new(),
            ttl: Duration::seconds(ttl_secs as i64),
            history_cap,
            logger,
        }
    }

    /// Record a fault observation. Creates a pending incident unless one is
    /// already active for the `(device_id, system_id)` pair; consecutive
    /// faults on the same device never produce duplicate active entries.
    pub fn observe_fault(
        &mut self,
        device_id: &str,
        system_id: &str,
        now: DateTime<Utc>,
    ) -> Option<Incident> {
        let duplicate = self.incidents.iter().any(|incident| {
            incident.device_id == device_id
                && incident.system_id == system_id
                && incident.is_active(now)
        });
        if duplicate {
            return None;
        }

        let incident = Incident {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            system_id: system_id.to_string(),
            status: IncidentStatus::Pending,
            created_at: now,
            expires_at: now + self.ttl,
            updated_at: None,
            dismiss_reason: None,
        };

        self.logger.info(&format!(
            "Opened incident {} for device {} in system {}",
            incident.id, device_id, system_id
        ));

        self.incidents.push(incident.clone());
        self.enforce_cap(now);
        Some(incident)
    }

    /// Promote a pending incident to escalated, stamping `updated_at`.
    /// Escalating a non-pending or already-expired incident is a no-op;
    /// unknown ids are reported as `NotFound`.
    pub fn escalate(&mut self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let incident = self
            .incidents
            .iter_mut()
            .find(|incident| incident.id == id)
            .ok_or_else(|| HyperionError::not_found(format!("incident {}", id)))?;

        if incident.status != IncidentStatus::Pending || incident.is_expired(now) {
            return Ok(());
        }

        incident.status = IncidentStatus::Escalated;
        incident.updated_at = Some(now);
        self.logger
            .warn(&format!("Escalated incident {} (unacknowledged)", id));
        Ok(())
    }

    /// Dismiss an incident, stamping `updated_at` and the reason. Terminal;
    /// dismissing an already-dismissed incident is a no-op, unknown ids are
    /// `NotFound`.
    pub fn dismiss(
        &mut self,
        id: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let incident = self
            .incidents
            .iter_mut()
            .find(|incident| incident.id == id)
            .ok_or_else(|| HyperionError::not_found(format!("incident {}", id)))?;

        if incident.status == IncidentStatus::Dismissed {
            return Ok(());
        }

        incident.status = IncidentStatus::Dismissed;
        incident.updated_at = Some(now);
        incident.dismiss_reason = reason;
        self.logger.info(&format!("Dismissed incident {}", id));
        Ok(())
    }

    /// Look up an incident by id
    pub fn get(&self, id: &str) -> Option<&Incident> {
        self.incidents.iter().find(|incident| incident.id == id)
    }

    /// All incidents in creation order, including resolved ones
    pub fn iter(&self) -> impl Iterator<Item = &Incident> {
        self.incidents.iter()
    }

    /// Currently active incidents (non-terminal, not expired)
    pub fn active(&self, now: DateTime<Utc>) -> Vec<&Incident> {
        self.incidents
            .iter()
            .filter(|incident| incident.is_active(now))
            .collect()
    }

    /// Group incidents for display. Pending and escalated carry only active
    /// entries; expired-pending incidents drop out of the board but stay
    /// reachable through `iter`.
    pub fn board(&self, now: DateTime<Utc>) -> IncidentBoard {
        let mut board = IncidentBoard::default();
        for incident in &self.incidents {
            match incident.status {
                IncidentStatus::Pending if incident.is_active(now) => {
                    board.pending.push(incident.clone());
                }
                IncidentStatus::Pending => {}
                IncidentStatus::Escalated => board.escalated.push(incident.clone()),
                IncidentStatus::Dismissed => board.dismissed.push(incident.clone()),
            }
        }
        board
    }

    /// Number of retained incidents
    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    /// Whether the tracker holds no incidents at all
    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    fn enforce_cap(&mut self, now: DateTime<Utc>) {
        while self.incidents.len() > self.history_cap {
            // Prefer evicting resolved incidents, oldest first
            let victim = self
                .incidents
                .iter()
                .position(|incident| !incident.is_active(now))
                .unwrap_or(0);
            self.incidents.remove(victim);
        }
    }
}
