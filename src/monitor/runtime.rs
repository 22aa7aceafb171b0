//! Monitor main loop and command dispatch

use super::{FleetMonitor, MonitorCommand, MonitorState, NotificationStatus};
use crate::error::Result;
use chrono::Utc;
use tokio::time::{Duration, interval};

impl FleetMonitor {
    /// Run the monitor main loop
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting fleet monitor main loop");

        // Installed triggers are not assumed to have survived a restart;
        // re-validate permission and reinstall before the first refresh
        if let Err(e) = self.scheduler.resume().await {
            self.logger
                .warn(&format!("Notification resume failed: {}", e));
        }

        self.state.send(MonitorState::Running).ok();

        let mut poll_interval = interval(Duration::from_secs(self.config.poll.interval_secs));
        if !self.config.poll.refresh_on_start {
            // The first tick completes immediately; consume it so the
            // first refresh waits a full interval
            poll_interval.tick().await;
        }

        let mut healthy = true;
        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    let started = std::time::Instant::now();
                    match self.run_refresh().await {
                        Ok(outcome) => {
                            if !healthy {
                                self.state.send(MonitorState::Running).ok();
                                healthy = true;
                            }
                            self.logger.debug(&format!(
                                "Refresh generation {} completed: {} systems, {} failures",
                                outcome.snapshot.generation,
                                outcome.snapshot.systems.len(),
                                outcome.failures.len()
                            ));
                        }
                        Err(e) => {
                            // Keep polling; the published snapshot stays at
                            // its last good value
                            self.logger.error(&format!("Refresh failed: {}", e));
                            self.state.send(MonitorState::Error(e.to_string())).ok();
                            healthy = false;
                        }
                    }
                    let elapsed = started.elapsed();
                    if elapsed.as_secs() > self.config.poll.interval_secs {
                        self.logger.warn(&format!(
                            "Refresh took {:.1}s, longer than the {}s poll interval",
                            elapsed.as_secs_f64(),
                            self.config.poll.interval_secs
                        ));
                    }
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd).await;
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.state.send(MonitorState::ShuttingDown).ok();
        self.logger.info("Fleet monitor shutdown complete");
        Ok(())
    }

    /// Handle external command; replies go out on the command's oneshot
    pub(crate) async fn handle_command(&mut self, cmd: MonitorCommand) {
        match cmd {
            MonitorCommand::Refresh { reply } => {
                reply.send(self.run_refresh().await).ok();
            }
            MonitorCommand::DismissIncident {
                incident_id,
                reason,
                reply,
            } => {
                let now = Utc::now();
                let reason = reason.unwrap_or_else(|| "dismissed by user".to_string());
                let result = self.tracker.dismiss(&incident_id, Some(reason), now);
                self.publish_incidents(now);
                reply.send(result).ok();
            }
            MonitorCommand::SetNotifications { enabled, reply } => {
                reply.send(self.scheduler.set_enabled(enabled).await).ok();
            }
            MonitorCommand::ScheduleDaily { reply } => {
                reply.send(self.scheduler.schedule_all_daily().await).ok();
            }
            MonitorCommand::SetPrimarySystem { system_id, reply } => {
                reply
                    .send(self.scheduler.set_primary_system(system_id.as_deref()).await)
                    .ok();
            }
            MonitorCommand::NotificationStatus { reply } => {
                reply.send(self.notification_status().await).ok();
            }
        }
    }

    async fn notification_status(&self) -> Result<NotificationStatus> {
        Ok(NotificationStatus {
            enabled: self.scheduler.enabled().await?,
            permission: self.scheduler.permission_state().await,
            primary_system: self.scheduler.primary_system().await?,
            triggers: self.scheduler.installed_triggers().await?,
        })
    }
}
