//! Notification content, tap routing, and daily trigger scheduling
//!
//! This module owns everything a notification carries: the rendered title and
//! body, the tap payload embedded for navigation, and the two recurring daily
//! triggers. Delivery goes through the [`gateway::NotificationGateway`] seam
//! so tests can observe sends without a platform behind them.

pub mod gateway;
pub mod scheduler;

pub use gateway::{LocalNotificationGateway, NotificationGateway, SentNotification};
pub use scheduler::{
    ENABLED_KEY, NotificationScheduler, PRIMARY_SYSTEM_KEY, PermissionState, next_occurrence,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trigger id of the recurring morning check-in
pub const MORNING_TRIGGER_ID: &str = "morning-checkin";

/// Trigger id of the recurring evening summary
pub const EVENING_TRIGGER_ID: &str = "evening-summary";

/// Payload embedded in a notification for tap navigation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapPayload {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(rename = "systemId", default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,

    #[serde(rename = "deviceId", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl TapPayload {
    pub fn morning_checkin() -> Self {
        Self {
            kind: "morning_checkin".to_string(),
            system_id: None,
            device_id: None,
        }
    }

    /// Evening summary, pointing at the primary system when one is known
    pub fn evening_summary(primary_system_id: Option<String>) -> Self {
        Self {
            kind: "evening_summary".to_string(),
            system_id: primary_system_id,
            device_id: None,
        }
    }

    pub fn device_status_change(device_id: &str, system_id: &str) -> Self {
        Self {
            kind: "device_status_change".to_string(),
            system_id: Some(system_id.to_string()),
            device_id: Some(device_id.to_string()),
        }
    }

    pub fn daily_reminder(device_id: &str, system_id: &str) -> Self {
        Self {
            kind: "daily_reminder".to_string(),
            system_id: Some(system_id.to_string()),
            device_id: Some(device_id.to_string()),
        }
    }
}

/// Where a notification tap should land
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationIntent {
    /// The fleet overview screen
    FleetOverview,
    /// Detail screen of one system
    SystemDetail(String),
    /// Profile of one inverter within a system
    InverterDetail {
        system_id: String,
        device_id: String,
    },
}

/// Resolve a raw tap payload to a navigation target.
///
/// Anything unparseable or incomplete lands on the fleet overview rather
/// than failing the tap.
pub fn route_tap(raw: &str) -> NavigationIntent {
    match serde_json::from_str::<TapPayload>(raw) {
        Ok(payload) => route_payload(&payload),
        Err(_) => NavigationIntent::FleetOverview,
    }
}

/// Resolve an already-parsed tap payload
pub fn route_payload(payload: &TapPayload) -> NavigationIntent {
    match payload.kind.as_str() {
        "evening_summary" => payload
            .system_id
            .clone()
            .map_or(NavigationIntent::FleetOverview, NavigationIntent::SystemDetail),
        "device_status_change" | "daily_reminder" => {
            match (payload.system_id.clone(), payload.device_id.clone()) {
                (Some(system_id), Some(device_id)) => NavigationIntent::InverterDetail {
                    system_id,
                    device_id,
                },
                (Some(system_id), None) => NavigationIntent::SystemDetail(system_id),
                _ => NavigationIntent::FleetOverview,
            }
        }
        _ => NavigationIntent::FleetOverview,
    }
}

/// Rendered notification content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
}

/// A recurring local notification installed with the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTrigger {
    pub id: String,
    pub title: String,
    pub body: String,
    pub hour: u32,
    pub minute: u32,
    pub payload: TapPayload,
    pub next_fire: DateTime<Utc>,
}

/// Alert for a device or system entering the error state
pub fn fault_alert(display_name: &str, is_device: bool) -> NotificationMessage {
    let kind = if is_device { "Inverter" } else { "System" };
    NotificationMessage {
        title: format!("🔴 {} Status Change", display_name),
        body: format!("{} has errors and needs attention.", kind),
    }
}

/// Alert for a device or system returning to producing
pub fn recovery_alert(display_name: &str, is_device: bool) -> NotificationMessage {
    let kind = if is_device { "Inverter" } else { "System" };
    NotificationMessage {
        title: format!("✅ {} Status Change", display_name),
        body: format!("{} recovered and is now online.", kind),
    }
}

/// Daily reminder for a fault that has gone unresolved past the threshold.
/// Same body as the initial alert; only the title word changes.
pub fn stale_fault_reminder(display_name: &str) -> NotificationMessage {
    NotificationMessage {
        title: format!("🔴 {} Daily Reminder", display_name),
        body: "Inverter has errors and needs attention.".to_string(),
    }
}

/// Escalation sent when an incident sits pending past the acknowledgement window
pub fn escalation_alert(device_name: &str, system_name: &str) -> NotificationMessage {
    NotificationMessage {
        title: format!("URGENT: Solar System Alert - {} ({})", device_name, system_name),
        body: "Incident pending without user response. Requires technician attention.".to_string(),
    }
}

/// Morning check-in content
pub fn morning_checkin_message() -> NotificationMessage {
    NotificationMessage {
        title: "☀️ Morning Check-In".to_string(),
        body: "See how your solar systems are doing today.".to_string(),
    }
}

/// Evening summary content
pub fn evening_summary_message() -> NotificationMessage {
    NotificationMessage {
        title: "🌙 Evening Summary".to_string(),
        body: "Review today's production and any open issues.".to_string(),
    }
}
