//! Daily trigger scheduling and the notification permission flow
//!
//! The scheduler owns the user's notification preference (persisted in the
//! key-value store), walks the permission flow against the gateway, and keeps
//! exactly two recurring triggers installed: a generic morning check-in and an
//! evening summary that deep-links to the primary system.

use crate::config::{NotificationsConfig, parse_hh_mm};
use crate::error::{HyperionError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::notify::gateway::NotificationGateway;
use crate::notify::{
    DailyTrigger, EVENING_TRIGGER_ID, MORNING_TRIGGER_ID, NotificationMessage, TapPayload,
    evening_summary_message, morning_checkin_message,
};
use crate::storage::KeyValueStore;
use chrono::{DateTime, Duration, LocalResult, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage key for the user's notification preference
pub const ENABLED_KEY: &str = "notifications_enabled";

/// Storage key for the primary system id carried by the evening summary
pub const PRIMARY_SYSTEM_KEY: &str = "primary_system_id";

/// Where the permission flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Disabled,
    Requesting,
    Enabled,
}

/// Scheduler for recurring and one-off notifications
pub struct NotificationScheduler {
    gateway: Arc<dyn NotificationGateway>,
    store: Arc<dyn KeyValueStore>,
    config: NotificationsConfig,
    tz: Tz,
    state: Mutex<PermissionState>,
    logger: StructuredLogger,
}

impl NotificationScheduler {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        store: Arc<dyn KeyValueStore>,
        config: NotificationsConfig,
        tz: Tz,
    ) -> Self {
        Self {
            gateway,
            store,
            config,
            tz,
            state: Mutex::new(PermissionState::Disabled),
            logger: get_logger("scheduler"),
        }
    }

    pub async fn permission_state(&self) -> PermissionState {
        *self.state.lock().await
    }

    /// The persisted preference; notifications are on until turned off
    pub async fn enabled(&self) -> Result<bool> {
        Ok(self
            .store
            .get_item(ENABLED_KEY)
            .await?
            .and_then(|value| value.as_bool())
            .unwrap_or(true))
    }

    pub async fn primary_system(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get_item(PRIMARY_SYSTEM_KEY)
            .await?
            .and_then(|value| value.as_str().map(str::to_string)))
    }

    /// Point the evening summary at a different system
    pub async fn set_primary_system(&self, system_id: Option<&str>) -> Result<()> {
        match system_id {
            Some(id) => self.store.set_item(PRIMARY_SYSTEM_KEY, json!(id)).await?,
            None => self.store.remove_item(PRIMARY_SYSTEM_KEY).await?,
        }
        // The evening payload embeds the primary id, so refresh the triggers
        if self.enabled().await? && self.permission_state().await == PermissionState::Enabled {
            self.schedule_all_daily().await?;
        }
        Ok(())
    }

    /// Toggle notifications. Turning them on walks the permission flow;
    /// a denial persists the disabled state and surfaces as an error.
    pub async fn set_enabled(&self, enabled: bool) -> Result<bool> {
        if !enabled {
            self.store.set_item(ENABLED_KEY, json!(false)).await?;
            *self.state.lock().await = PermissionState::Disabled;
            self.gateway.clear_installed().await?;
            self.logger.info("Notifications disabled, triggers cleared");
            return Ok(false);
        }

        *self.state.lock().await = PermissionState::Requesting;
        let granted = self.gateway.request_permission().await?;
        if !granted {
            self.store.set_item(ENABLED_KEY, json!(false)).await?;
            *self.state.lock().await = PermissionState::Disabled;
            return Err(HyperionError::permission(
                "Notification permission denied by platform",
            ));
        }

        self.store.set_item(ENABLED_KEY, json!(true)).await?;
        *self.state.lock().await = PermissionState::Enabled;
        self.schedule_all_daily().await?;
        Ok(true)
    }

    /// Install the two recurring triggers, replacing whatever is installed.
    /// With notifications off this clears instead, so repeated calls always
    /// converge on the same end state.
    pub async fn schedule_all_daily(&self) -> Result<Vec<DailyTrigger>> {
        self.gateway.clear_installed().await?;

        if !self.enabled().await? {
            self.logger
                .debug("Notifications disabled, no daily triggers installed");
            return Ok(Vec::new());
        }

        let primary = self.primary_system().await?;
        let triggers = self.build_triggers(primary, Utc::now())?;
        self.gateway.install_daily(triggers.clone()).await?;
        self.logger.info(&format!(
            "Installed daily triggers at {} and {} ({})",
            self.config.morning_time, self.config.evening_time, self.tz
        ));
        Ok(triggers)
    }

    /// Cold-start pass: revalidate the stored preference against the platform
    /// and bring the installed triggers back in line with it.
    pub async fn resume(&self) -> Result<()> {
        if !self.enabled().await? {
            *self.state.lock().await = PermissionState::Disabled;
            self.gateway.clear_installed().await?;
            return Ok(());
        }

        *self.state.lock().await = PermissionState::Requesting;
        let granted = self.gateway.request_permission().await?;
        if granted {
            *self.state.lock().await = PermissionState::Enabled;
            self.schedule_all_daily().await?;
        } else {
            self.logger
                .warn("Platform revoked notification permission, disabling");
            self.store.set_item(ENABLED_KEY, json!(false)).await?;
            *self.state.lock().await = PermissionState::Disabled;
            self.gateway.clear_installed().await?;
        }
        Ok(())
    }

    /// Deliver a one-off notification unless the user turned them off.
    /// Returns whether delivery was attempted.
    pub async fn notify(&self, message: NotificationMessage, payload: TapPayload) -> Result<bool> {
        if !self.enabled().await? {
            return Ok(false);
        }
        self.gateway
            .notify_once(&message.title, &message.body, payload)
            .await?;
        Ok(true)
    }

    /// Triggers currently installed with the platform
    pub async fn installed_triggers(&self) -> Result<Vec<DailyTrigger>> {
        self.gateway.installed().await
    }

    fn build_triggers(
        &self,
        primary: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailyTrigger>> {
        let (morning_hour, morning_minute) = parse_hh_mm(&self.config.morning_time)?;
        let (evening_hour, evening_minute) = parse_hh_mm(&self.config.evening_time)?;

        let morning_message = morning_checkin_message();
        let evening_message = evening_summary_message();

        Ok(vec![
            DailyTrigger {
                id: MORNING_TRIGGER_ID.to_string(),
                title: morning_message.title,
                body: morning_message.body,
                hour: morning_hour,
                minute: morning_minute,
                payload: TapPayload::morning_checkin(),
                next_fire: next_occurrence(self.tz, morning_hour, morning_minute, now),
            },
            DailyTrigger {
                id: EVENING_TRIGGER_ID.to_string(),
                title: evening_message.title,
                body: evening_message.body,
                hour: evening_hour,
                minute: evening_minute,
                payload: TapPayload::evening_summary(primary),
                next_fire: next_occurrence(self.tz, evening_hour, evening_minute, now),
            },
        ])
    }
}

/// Next UTC instant at which a local wall-clock time occurs.
///
/// Skips forward over DST gaps and takes the earlier side of DST overlaps.
pub fn next_occurrence(tz: Tz, hour: u32, minute: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let local_now = now.with_timezone(&tz);
    let mut date = local_now.date_naive();

    for _ in 0..3 {
        if let Some(naive) = date.and_hms_opt(hour, minute, 0) {
            let resolved = match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => Some(dt),
                LocalResult::Ambiguous(earlier, _) => Some(earlier),
                LocalResult::None => naive
                    .checked_add_signed(Duration::hours(1))
                    .and_then(|shifted| tz.from_local_datetime(&shifted).earliest()),
            };
            if let Some(dt) = resolved {
                let utc = dt.with_timezone(&Utc);
                if utc > now {
                    return utc;
                }
            }
        }
        date = date.succ_opt().unwrap_or(date);
    }

    now + Duration::days(1)
}
