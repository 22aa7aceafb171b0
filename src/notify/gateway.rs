//! Platform seam for notification delivery

use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::notify::{DailyTrigger, TapPayload};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Delivered notifications kept for inspection
const SENT_BUFFER_CAP: usize = 100;

/// One delivered notification
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub title: String,
    pub body: String,
    pub payload: TapPayload,
    pub sent_at: DateTime<Utc>,
}

/// Seam between the scheduler and whatever platform delivers notifications
#[async_trait::async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Ask the platform for permission to notify
    async fn request_permission(&self) -> Result<bool>;

    /// Remove every installed daily trigger
    async fn clear_installed(&self) -> Result<()>;

    /// Install the given daily triggers
    async fn install_daily(&self, triggers: Vec<DailyTrigger>) -> Result<()>;

    /// Daily triggers currently installed
    async fn installed(&self) -> Result<Vec<DailyTrigger>>;

    /// Deliver a one-off notification now
    async fn notify_once(&self, title: &str, body: &str, payload: TapPayload) -> Result<()>;
}

/// Gateway that logs deliveries and keeps them in memory.
///
/// Permission is fixed at construction, mirroring a platform that granted or
/// denied the app. Without permission, deliveries are dropped the way a real
/// platform drops them.
pub struct LocalNotificationGateway {
    permission_granted: bool,
    triggers: Mutex<Vec<DailyTrigger>>,
    sent: Mutex<Vec<SentNotification>>,
    logger: StructuredLogger,
}

impl LocalNotificationGateway {
    pub fn new(permission_granted: bool) -> Self {
        Self {
            permission_granted,
            triggers: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            logger: get_logger("notify"),
        }
    }

    /// Notifications delivered so far, oldest first
    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl NotificationGateway for LocalNotificationGateway {
    async fn request_permission(&self) -> Result<bool> {
        if self.permission_granted {
            self.logger.info("Notification permission granted");
        } else {
            self.logger.warn("Notification permission denied");
        }
        Ok(self.permission_granted)
    }

    async fn clear_installed(&self) -> Result<()> {
        let mut triggers = self.triggers.lock().await;
        if !triggers.is_empty() {
            self.logger
                .debug(&format!("Clearing {} daily triggers", triggers.len()));
        }
        triggers.clear();
        Ok(())
    }

    async fn install_daily(&self, new_triggers: Vec<DailyTrigger>) -> Result<()> {
        self.logger
            .info(&format!("Installing {} daily triggers", new_triggers.len()));
        *self.triggers.lock().await = new_triggers;
        Ok(())
    }

    async fn installed(&self) -> Result<Vec<DailyTrigger>> {
        Ok(self.triggers.lock().await.clone())
    }

    async fn notify_once(&self, title: &str, body: &str, payload: TapPayload) -> Result<()> {
        if !self.permission_granted {
            self.logger
                .warn(&format!("Dropping notification without permission: {}", title));
            return Ok(());
        }

        self.logger.info(&format!("Notification: {} - {}", title, body));

        let mut sent = self.sent.lock().await;
        sent.push(SentNotification {
            title: title.to_string(),
            body: body.to_string(),
            payload,
            sent_at: Utc::now(),
        });
        if sent.len() > SENT_BUFFER_CAP {
            let excess = sent.len() - SENT_BUFFER_CAP;
            sent.drain(..excess);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::morning_checkin_message;

    fn trigger(id: &str) -> DailyTrigger {
        let message = morning_checkin_message();
        DailyTrigger {
            id: id.to_string(),
            title: message.title,
            body: message.body,
            hour: 8,
            minute: 0,
            payload: TapPayload::morning_checkin(),
            next_fire: Utc::now(),
        }
    }

    #[tokio::test]
    async fn install_replaces_previous_triggers() {
        let gateway = LocalNotificationGateway::new(true);
        gateway.install_daily(vec![trigger("a")]).await.unwrap();
        gateway
            .install_daily(vec![trigger("b"), trigger("c")])
            .await
            .unwrap();

        let installed = gateway.installed().await.unwrap();
        assert_eq!(installed.len(), 2);
        assert_eq!(installed[0].id, "b");
    }

    #[tokio::test]
    async fn clear_removes_all() {
        let gateway = LocalNotificationGateway::new(true);
        gateway.install_daily(vec![trigger("a")]).await.unwrap();
        gateway.clear_installed().await.unwrap();
        assert!(gateway.installed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deliveries_are_recorded() {
        let gateway = LocalNotificationGateway::new(true);
        gateway
            .notify_once("title", "body", TapPayload::morning_checkin())
            .await
            .unwrap();

        let sent = gateway.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].title, "title");
    }

    #[tokio::test]
    async fn denied_permission_drops_deliveries() {
        let gateway = LocalNotificationGateway::new(false);
        assert!(!gateway.request_permission().await.unwrap());

        gateway
            .notify_once("title", "body", TapPayload::morning_checkin())
            .await
            .unwrap();
        assert!(gateway.sent().await.is_empty());
    }
}
