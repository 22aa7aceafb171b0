//! One refresh cycle: enumerate the fleet, fetch per-system status
//! concurrently, classify, and publish a complete snapshot.
//!
//! A cycle never publishes partial state. Systems whose status fetch fails
//! keep their last known entry, marked stale, and are reported as non-fatal
//! diagnostics on the [`RefreshOutcome`]. Only a failure to enumerate the
//! fleet aborts the cycle.

use super::{FleetMonitor, FleetSnapshot, SystemHealth};
use crate::api::fetch_all_systems;
use crate::api::types::{PvSystemMetadata, SystemStatusDetails};
use crate::error::{HyperionError, Result};
use crate::notify::{
    TapPayload, escalation_alert, fault_alert, recovery_alert, stale_fault_reminder,
};
use crate::status::{RawDeviceState, classify_device, classify_system};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Non-fatal diagnostic for a system whose status fetch failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshFailure {
    pub system_id: String,
    pub message: String,
}

/// Result of one completed refresh cycle
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// The snapshot this cycle assembled
    pub snapshot: Arc<FleetSnapshot>,
    /// Systems that kept stale carry-over data this cycle
    pub failures: Vec<RefreshFailure>,
}

impl FleetMonitor {
    /// Run one full refresh cycle and publish the resulting snapshot and
    /// incident board.
    pub(crate) async fn run_refresh(&mut self) -> Result<RefreshOutcome> {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.logger
            .debug(&format!("Starting refresh cycle {}", generation));

        let metas = fetch_all_systems(self.api.as_ref(), self.config.api.page_size)
            .await
            .map_err(|e| HyperionError::session(format!("Failed to enumerate PV systems: {e}")))?;

        // Fetch every system's status concurrently, but join them all before
        // assembling anything. Consumers never observe a half-built fleet.
        let mut tasks = JoinSet::new();
        for meta in &metas {
            let api = Arc::clone(&self.api);
            let system_id = meta.pv_system_id.clone();
            tasks.spawn(async move {
                let details = api.get_system_status_details(&system_id).await;
                (system_id, details)
            });
        }
        let mut fetched: HashMap<String, Result<SystemStatusDetails>> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((system_id, details)) = joined {
                fetched.insert(system_id, details);
            }
        }

        let now = Utc::now();
        let previous = self.snapshot_tx.borrow().clone();

        let mut systems = BTreeMap::new();
        let mut failures = Vec::new();
        let mut fault_alerts: Vec<(String, String)> = Vec::new();
        let mut recovery_alerts: Vec<(String, String)> = Vec::new();

        for meta in metas {
            let system_id = meta.pv_system_id.clone();
            let outcome = fetched
                .remove(&system_id)
                .unwrap_or_else(|| Err(HyperionError::api("status fetch did not complete")));
            let prev = previous.systems.get(&system_id);

            match outcome {
                Ok(details) => {
                    // Every device currently reported faulted is observed;
                    // the tracker deduplicates against active incidents.
                    for device_id in &details.red_inverters {
                        self.tracker.observe_fault(device_id, &system_id, now);
                    }

                    // Alerts key off the transition between consecutive
                    // snapshots. A system seen for the first time stays
                    // quiet, otherwise a restart would re-announce every
                    // fault the fleet already knows about.
                    if let Some(prev) = prev {
                        for device_id in &details.red_inverters {
                            if !prev.faulted_devices.contains(device_id) {
                                fault_alerts.push((device_id.clone(), system_id.clone()));
                            }
                        }
                        for device_id in &prev.faulted_devices {
                            if details.green_inverters.contains(device_id) {
                                recovery_alerts.push((device_id.clone(), system_id.clone()));
                            }
                        }
                    }

                    systems.insert(system_id, build_health(&meta, &details, prev, now));
                }
                Err(e) => {
                    self.logger
                        .for_system(&system_id)
                        .warn(&format!("Status fetch failed: {}", e));
                    failures.push(RefreshFailure {
                        system_id: system_id.clone(),
                        message: e.to_string(),
                    });
                    // Carry the last known state instead of inventing one
                    if let Some(prev) = prev {
                        let mut carried = prev.clone();
                        carried.stale = true;
                        systems.insert(system_id, carried);
                    }
                }
            }
        }

        self.settle_incidents(&systems, now);
        self.send_alerts(fault_alerts, recovery_alerts).await;
        self.run_escalations(&systems, now).await;
        self.send_reminders(now).await;

        let snapshot = Arc::new(FleetSnapshot::from_systems(generation, now, systems));
        self.publish_snapshot(Arc::clone(&snapshot));
        self.publish_incidents(now);

        self.logger.for_generation(generation).info(&format!(
            "Refresh published: {} systems ({} online, {} error, {} moon), {} fetch failures",
            snapshot.counts.total,
            snapshot.counts.online,
            snapshot.counts.error,
            snapshot.counts.moon,
            failures.len()
        ));

        Ok(RefreshOutcome { snapshot, failures })
    }

    /// Dismiss active incidents whose device is no longer reported faulted.
    /// Only fresh entries count; a stale carry-over says nothing new about
    /// the device.
    fn settle_incidents(&mut self, systems: &BTreeMap<String, SystemHealth>, now: DateTime<Utc>) {
        let reverted: Vec<String> = self
            .tracker
            .active(now)
            .into_iter()
            .filter(|incident| {
                systems.get(&incident.system_id).is_some_and(|health| {
                    !health.stale && !health.faulted_devices.contains(&incident.device_id)
                })
            })
            .map(|incident| incident.id.clone())
            .collect();

        for id in reverted {
            if let Err(e) = self
                .tracker
                .dismiss(&id, Some("status reverted".to_string()), now)
            {
                self.logger
                    .warn(&format!("Failed to dismiss incident {}: {}", id, e));
            }
        }
    }

    /// Deliver fault and recovery alerts for device transitions found this
    /// cycle. Delivery failures are logged and never abort the refresh.
    async fn send_alerts(
        &self,
        fault_alerts: Vec<(String, String)>,
        recovery_alerts: Vec<(String, String)>,
    ) {
        for (device_id, system_id) in fault_alerts {
            let name = self.device_display_name(&device_id).await;
            let payload = TapPayload::device_status_change(&device_id, &system_id);
            if let Err(e) = self.scheduler.notify(fault_alert(&name, true), payload).await {
                self.logger
                    .warn(&format!("Fault alert for {} not delivered: {}", device_id, e));
            }
        }
        for (device_id, system_id) in recovery_alerts {
            let name = self.device_display_name(&device_id).await;
            let payload = TapPayload::device_status_change(&device_id, &system_id);
            if let Err(e) = self
                .scheduler
                .notify(recovery_alert(&name, true), payload)
                .await
            {
                self.logger.warn(&format!(
                    "Recovery alert for {} not delivered: {}",
                    device_id, e
                ));
            }
        }
    }

    /// Promote pending incidents past the acknowledgement window and send
    /// the urgent alert for each.
    async fn run_escalations(&mut self, systems: &BTreeMap<String, SystemHealth>, now: DateTime<Utc>) {
        for id in self.escalation.due(&self.tracker, now) {
            let Some((device_id, system_id)) = self
                .tracker
                .get(&id)
                .map(|incident| (incident.device_id.clone(), incident.system_id.clone()))
            else {
                continue;
            };
            if let Err(e) = self.tracker.escalate(&id, now) {
                self.logger
                    .warn(&format!("Failed to escalate incident {}: {}", id, e));
                continue;
            }
            self.logger.warn(&format!(
                "Incident {} for device {} escalated after no acknowledgement",
                id, device_id
            ));

            let device_name = self.device_display_name(&device_id).await;
            let system_name = systems
                .get(&system_id)
                .map_or_else(|| short_fallback("System", &system_id), |h| h.name.clone());
            let payload = TapPayload::device_status_change(&device_id, &system_id);
            if let Err(e) = self
                .scheduler
                .notify(escalation_alert(&device_name, &system_name), payload)
                .await
            {
                self.logger.warn(&format!(
                    "Escalation alert for incident {} not delivered: {}",
                    id, e
                ));
            }
        }
    }

    /// Send the daily reminder for faults that have sat unresolved past the
    /// configured threshold, at most once per reminder interval.
    async fn send_reminders(&mut self, now: DateTime<Utc>) {
        let threshold = Duration::hours(self.config.incidents.remind_after_hours as i64);
        let repeat = Duration::hours(self.config.incidents.remind_interval_hours as i64);

        let candidates: Vec<(String, String, String)> = self
            .tracker
            .active(now)
            .into_iter()
            .filter(|incident| now - incident.created_at >= threshold)
            .map(|incident| {
                (
                    incident.id.clone(),
                    incident.device_id.clone(),
                    incident.system_id.clone(),
                )
            })
            .collect();

        for (id, device_id, system_id) in candidates {
            if let Some(last) = self.last_reminder.get(&id)
                && now - *last < repeat
            {
                continue;
            }
            let name = self.device_display_name(&device_id).await;
            let payload = TapPayload::daily_reminder(&device_id, &system_id);
            match self.scheduler.notify(stale_fault_reminder(&name), payload).await {
                Ok(true) => {
                    self.last_reminder.insert(id, now);
                }
                Ok(false) => {}
                Err(e) => {
                    self.logger
                        .warn(&format!("Reminder for {} not delivered: {}", device_id, e));
                }
            }
        }

        // Reminder timestamps for resolved incidents are dead weight
        let active_ids: HashSet<String> = self
            .tracker
            .active(now)
            .into_iter()
            .map(|incident| incident.id.clone())
            .collect();
        self.last_reminder.retain(|id, _| active_ids.contains(id));
    }

    /// Best-effort display name for an inverter. The profile endpoint is
    /// optional detail; a failed lookup falls back to a shortened id.
    async fn device_display_name(&self, device_id: &str) -> String {
        match self.api.get_inverter_profile(device_id).await {
            Ok(profile) => profile.display_name(),
            Err(_) => short_fallback("Inverter", device_id),
        }
    }
}

fn short_fallback(kind: &str, id: &str) -> String {
    let short: String = id.chars().take(8).collect();
    format!("{} {}", kind, short)
}

/// Derive a system's health entry from freshly fetched status details
fn build_health(
    meta: &PvSystemMetadata,
    details: &SystemStatusDetails,
    prev: Option<&SystemHealth>,
    now: DateTime<Utc>,
) -> SystemHealth {
    let signals = details.signals(&meta.pv_system_id);
    let status = if signals.is_empty() && details.total_inverters > 0 {
        // Backend omitted the per-device lists; trust its own status word
        classify_device(RawDeviceState::parse(&details.status))
    } else {
        classify_system(&signals)
    };

    let last_status_change = match prev {
        Some(prev) if prev.status == status => prev.last_status_change,
        _ => now,
    };

    SystemHealth {
        system_id: meta.pv_system_id.clone(),
        name: meta.display_name(),
        status,
        total_inverters: details.total_inverters,
        producing: details.green_inverters.len(),
        faulted: details.red_inverters.len(),
        idle: details.moon_inverters.len(),
        faulted_devices: details.red_inverters.clone(),
        last_updated: details.last_updated,
        last_status_change,
        stale: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StatusApi;
    use crate::api::types::InverterProfile;
    use crate::config::Config;
    use crate::incidents::IncidentStatus;
    use crate::notify::{LocalNotificationGateway, NotificationGateway, SentNotification};
    use crate::status::SystemStatus;
    use crate::storage::{KeyValueStore, MemoryStore};
    use std::sync::Mutex;

    struct FakeStatusApi {
        metas: Mutex<Vec<PvSystemMetadata>>,
        details: Mutex<HashMap<String, SystemStatusDetails>>,
        failing: Mutex<HashSet<String>>,
        fail_listing: Mutex<bool>,
    }

    impl FakeStatusApi {
        fn new(entries: Vec<(&str, SystemStatusDetails)>) -> Self {
            let metas = entries
                .iter()
                .map(|(id, _)| PvSystemMetadata {
                    pv_system_id: (*id).to_string(),
                    name: format!("Site {}", id),
                    peak_power: None,
                    time_zone: None,
                })
                .collect();
            let details = entries
                .into_iter()
                .map(|(id, d)| (id.to_string(), d))
                .collect();
            Self {
                metas: Mutex::new(metas),
                details: Mutex::new(details),
                failing: Mutex::new(HashSet::new()),
                fail_listing: Mutex::new(false),
            }
        }

        fn set_details(&self, system_id: &str, details: SystemStatusDetails) {
            self.details
                .lock()
                .unwrap()
                .insert(system_id.to_string(), details);
        }

        fn fail_system(&self, system_id: &str) {
            self.failing.lock().unwrap().insert(system_id.to_string());
        }

        fn fail_listing(&self) {
            *self.fail_listing.lock().unwrap() = true;
        }
    }

    #[async_trait::async_trait]
    impl StatusApi for FakeStatusApi {
        async fn get_pv_systems(
            &self,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<PvSystemMetadata>> {
            if *self.fail_listing.lock().unwrap() {
                return Err(HyperionError::network("listing unavailable"));
            }
            let metas = self.metas.lock().unwrap();
            Ok(metas.iter().skip(offset).take(limit).cloned().collect())
        }

        async fn get_system_status_details(&self, system_id: &str) -> Result<SystemStatusDetails> {
            if self.failing.lock().unwrap().contains(system_id) {
                return Err(HyperionError::api(format!("system {system_id} unavailable")));
            }
            self.details
                .lock()
                .unwrap()
                .get(system_id)
                .cloned()
                .ok_or_else(|| HyperionError::not_found(format!("system {system_id}")))
        }

        async fn get_inverter_profile(&self, inverter_id: &str) -> Result<InverterProfile> {
            Err(HyperionError::not_found(format!("inverter {inverter_id}")))
        }
    }

    fn details(green: &[&str], red: &[&str], moon: &[&str]) -> SystemStatusDetails {
        let status = if !red.is_empty() {
            "red"
        } else if !green.is_empty() {
            "green"
        } else {
            "moon"
        };
        SystemStatusDetails {
            status: status.to_string(),
            total_inverters: green.len() + red.len() + moon.len(),
            green_inverters: green.iter().map(|s| (*s).to_string()).collect(),
            red_inverters: red.iter().map(|s| (*s).to_string()).collect(),
            moon_inverters: moon.iter().map(|s| (*s).to_string()).collect(),
            last_updated: None,
        }
    }

    fn monitor_with(
        config: Config,
        api: Arc<FakeStatusApi>,
    ) -> (FleetMonitor, Arc<LocalNotificationGateway>) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let gateway = Arc::new(LocalNotificationGateway::new(true));
        let monitor = FleetMonitor::new(
            config,
            api,
            store,
            Arc::clone(&gateway) as Arc<dyn NotificationGateway>,
        );
        (monitor, gateway)
    }

    fn test_monitor(api: Arc<FakeStatusApi>) -> (FleetMonitor, Arc<LocalNotificationGateway>) {
        monitor_with(Config::default(), api)
    }

    fn titles(sent: &[SentNotification]) -> Vec<&str> {
        sent.iter().map(|n| n.title.as_str()).collect()
    }

    #[tokio::test]
    async fn refresh_classifies_and_aggregates_fleet() {
        let api = Arc::new(FakeStatusApi::new(vec![
            ("sys-a", details(&["a1", "a2", "a3", "a4", "a5"], &[], &[])),
            ("sys-b", details(&["b1", "b2", "b3"], &["b4"], &[])),
            ("sys-c", details(&[], &[], &["c1", "c2", "c3", "c4"])),
        ]));
        let (mut monitor, _gateway) = test_monitor(api);

        let outcome = monitor.run_refresh().await.unwrap();
        let snapshot = &outcome.snapshot;

        assert!(outcome.failures.is_empty());
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.systems["sys-a"].status, SystemStatus::Online);
        assert_eq!(snapshot.systems["sys-b"].status, SystemStatus::Error);
        assert_eq!(snapshot.systems["sys-c"].status, SystemStatus::Moon);
        assert_eq!(snapshot.systems["sys-b"].faulted_devices, vec!["b4"]);
        assert_eq!(snapshot.systems["sys-a"].producing, 5);
        assert_eq!(snapshot.overall, SystemStatus::Error);
        assert_eq!(snapshot.counts.total, 3);
        assert_eq!(snapshot.counts.online, 1);
        assert_eq!(snapshot.counts.error, 1);
        assert_eq!(snapshot.counts.moon, 1);

        // The snapshot the caller gets back is the one published
        assert_eq!(monitor.handle().snapshot().generation, 1);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_stale_entry_and_reports_diagnostic() {
        let api = Arc::new(FakeStatusApi::new(vec![
            ("sys-a", details(&["a1"], &[], &[])),
            ("sys-b", details(&["b1"], &["b2"], &[])),
        ]));
        let (mut monitor, _gateway) = test_monitor(Arc::clone(&api));

        monitor.run_refresh().await.unwrap();

        api.fail_system("sys-b");
        let outcome = monitor.run_refresh().await.unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].system_id, "sys-b");

        let carried = &outcome.snapshot.systems["sys-b"];
        assert!(carried.stale);
        assert_eq!(carried.status, SystemStatus::Error);
        assert_eq!(carried.faulted_devices, vec!["b2"]);
        assert!(!outcome.snapshot.systems["sys-a"].stale);
        assert_eq!(outcome.snapshot.generation, 2);
    }

    #[tokio::test]
    async fn first_sighting_of_failed_system_is_omitted() {
        let api = Arc::new(FakeStatusApi::new(vec![
            ("sys-a", details(&["a1"], &[], &[])),
            ("sys-b", details(&["b1"], &[], &[])),
        ]));
        api.fail_system("sys-b");
        let (mut monitor, _gateway) = test_monitor(api);

        let outcome = monitor.run_refresh().await.unwrap();

        // No previous entry to carry, so the system is simply absent
        assert!(!outcome.snapshot.systems.contains_key("sys-b"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.snapshot.counts.total, 1);
    }

    #[tokio::test]
    async fn listing_failure_aborts_the_cycle() {
        let api = Arc::new(FakeStatusApi::new(vec![(
            "sys-a",
            details(&["a1"], &[], &[]),
        )]));
        api.fail_listing();
        let (mut monitor, _gateway) = test_monitor(api);

        let err = monitor.run_refresh().await.unwrap_err();
        assert!(matches!(err, HyperionError::Session { .. }));

        // Nothing was published
        assert_eq!(monitor.handle().snapshot().generation, 0);
    }

    #[tokio::test]
    async fn stale_generations_are_discarded() {
        let api = Arc::new(FakeStatusApi::new(vec![]));
        let (monitor, _gateway) = test_monitor(api);

        let newer = Arc::new(FleetSnapshot::from_systems(5, Utc::now(), BTreeMap::new()));
        assert!(monitor.publish_snapshot(newer));

        let late = Arc::new(FleetSnapshot::from_systems(4, Utc::now(), BTreeMap::new()));
        assert!(!monitor.publish_snapshot(late));

        assert_eq!(monitor.handle().snapshot().generation, 5);
    }

    #[tokio::test]
    async fn repeated_faults_open_a_single_incident() {
        let api = Arc::new(FakeStatusApi::new(vec![(
            "sys-b",
            details(&["b1"], &["b2"], &[]),
        )]));
        let (mut monitor, _gateway) = test_monitor(api);

        monitor.run_refresh().await.unwrap();
        monitor.run_refresh().await.unwrap();

        let board = monitor.handle().incidents();
        assert_eq!(board.pending.len(), 1);
        assert_eq!(board.pending[0].device_id, "b2");
        assert_eq!(board.pending[0].system_id, "sys-b");
    }

    #[tokio::test]
    async fn faults_already_present_at_startup_stay_quiet() {
        let api = Arc::new(FakeStatusApi::new(vec![(
            "sys-b",
            details(&["b1"], &["b2"], &[]),
        )]));
        let (mut monitor, gateway) = test_monitor(api);

        monitor.run_refresh().await.unwrap();

        // An incident is tracked, but no alert goes out for state the
        // monitor has never seen healthy
        assert_eq!(monitor.handle().incidents().pending.len(), 1);
        assert!(gateway.sent().await.is_empty());
    }

    #[tokio::test]
    async fn new_fault_sends_one_alert_with_device_name() {
        let api = Arc::new(FakeStatusApi::new(vec![(
            "sys-b",
            details(&["b1", "b2"], &[], &[]),
        )]));
        let (mut monitor, gateway) = test_monitor(Arc::clone(&api));

        monitor.run_refresh().await.unwrap();
        assert!(gateway.sent().await.is_empty());

        api.set_details("sys-b", details(&["b1"], &["b2"], &[]));
        monitor.run_refresh().await.unwrap();

        let sent = gateway.sent().await;
        assert_eq!(titles(&sent), vec!["🔴 Inverter b2 Status Change"]);
        assert_eq!(sent[0].body, "Inverter has errors and needs attention.");

        // Still faulted on the next cycle: no repeat
        monitor.run_refresh().await.unwrap();
        assert_eq!(gateway.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn recovery_dismisses_incident_and_notifies() {
        let api = Arc::new(FakeStatusApi::new(vec![(
            "sys-b",
            details(&["b1"], &["b2"], &[]),
        )]));
        let (mut monitor, gateway) = test_monitor(Arc::clone(&api));

        monitor.run_refresh().await.unwrap();

        api.set_details("sys-b", details(&["b1", "b2"], &[], &[]));
        monitor.run_refresh().await.unwrap();

        let board = monitor.handle().incidents();
        assert!(board.pending.is_empty());
        assert_eq!(board.dismissed.len(), 1);
        assert_eq!(
            board.dismissed[0].dismiss_reason.as_deref(),
            Some("status reverted")
        );

        let sent = gateway.sent().await;
        assert_eq!(titles(&sent), vec!["✅ Inverter b2 Status Change"]);
        assert_eq!(sent[0].body, "Inverter recovered and is now online.");
    }

    #[tokio::test]
    async fn device_dropping_to_idle_dismisses_without_recovery_alert() {
        let api = Arc::new(FakeStatusApi::new(vec![(
            "sys-b",
            details(&["b1"], &["b2"], &[]),
        )]));
        let (mut monitor, gateway) = test_monitor(Arc::clone(&api));

        monitor.run_refresh().await.unwrap();

        api.set_details("sys-b", details(&["b1"], &[], &["b2"]));
        monitor.run_refresh().await.unwrap();

        let board = monitor.handle().incidents();
        assert!(board.pending.is_empty());
        assert_eq!(board.dismissed.len(), 1);
        assert!(gateway.sent().await.is_empty());
    }

    #[tokio::test]
    async fn stale_carry_over_does_not_dismiss_incidents() {
        let api = Arc::new(FakeStatusApi::new(vec![(
            "sys-b",
            details(&["b1"], &["b2"], &[]),
        )]));
        let (mut monitor, _gateway) = test_monitor(Arc::clone(&api));

        monitor.run_refresh().await.unwrap();
        assert_eq!(monitor.handle().incidents().pending.len(), 1);

        api.fail_system("sys-b");
        monitor.run_refresh().await.unwrap();

        // The fetch failed; the incident stays open on carried data
        assert_eq!(monitor.handle().incidents().pending.len(), 1);
    }

    #[tokio::test]
    async fn unacknowledged_incident_escalates_and_alerts() {
        let api = Arc::new(FakeStatusApi::new(vec![(
            "sys-b",
            details(&["b1"], &["b2"], &[]),
        )]));
        let mut config = Config::default();
        config.incidents.escalate_after_secs = 0;
        let (mut monitor, gateway) = monitor_with(config, api);

        monitor.run_refresh().await.unwrap();

        let board = monitor.handle().incidents();
        assert!(board.pending.is_empty());
        assert_eq!(board.escalated.len(), 1);
        assert_eq!(board.escalated[0].status, IncidentStatus::Escalated);

        let sent = gateway.sent().await;
        assert_eq!(
            titles(&sent),
            vec!["URGENT: Solar System Alert - Inverter b2 (Site sys-b)"]
        );

        // Already escalated: the next cycle does not alert again
        monitor.run_refresh().await.unwrap();
        assert_eq!(gateway.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn reminders_fire_after_threshold_and_respect_interval() {
        let api = Arc::new(FakeStatusApi::new(vec![(
            "sys-b",
            details(&["b1"], &["b2"], &[]),
        )]));
        let mut config = Config::default();
        // Long TTL so the pending incident is still active at +41h
        config.incidents.ttl_secs = 72 * 3600;
        let (mut monitor, gateway) = monitor_with(config, Arc::clone(&api));

        monitor.run_refresh().await.unwrap();
        assert!(gateway.sent().await.is_empty());

        let start = Utc::now();

        // Under the 15 hour threshold: nothing
        monitor.send_reminders(start + Duration::hours(14)).await;
        assert!(gateway.sent().await.is_empty());

        // Past the threshold: one reminder
        monitor.send_reminders(start + Duration::hours(16)).await;
        let sent = gateway.sent().await;
        assert_eq!(titles(&sent), vec!["🔴 Inverter b2 Daily Reminder"]);
        assert_eq!(sent[0].body, "Inverter has errors and needs attention.");

        // Within the 24 hour repeat interval: suppressed
        monitor.send_reminders(start + Duration::hours(17)).await;
        assert_eq!(gateway.sent().await.len(), 1);

        // A day later: the reminder repeats
        monitor.send_reminders(start + Duration::hours(41)).await;
        assert_eq!(gateway.sent().await.len(), 2);

        // Recovery clears the reminder bookkeeping
        api.set_details("sys-b", details(&["b1", "b2"], &[], &[]));
        monitor.run_refresh().await.unwrap();
        assert!(monitor.last_reminder.is_empty());
    }

    #[test]
    fn missing_device_lists_fall_back_to_wire_status() {
        let meta = PvSystemMetadata {
            pv_system_id: "sys-x".to_string(),
            name: "Site X".to_string(),
            peak_power: None,
            time_zone: None,
        };
        let mut bare = SystemStatusDetails {
            status: "red".to_string(),
            total_inverters: 3,
            green_inverters: Vec::new(),
            red_inverters: Vec::new(),
            moon_inverters: Vec::new(),
            last_updated: None,
        };

        let health = build_health(&meta, &bare, None, Utc::now());
        assert_eq!(health.status, SystemStatus::Error);

        bare.status = "mystery".to_string();
        let health = build_health(&meta, &bare, None, Utc::now());
        assert_eq!(health.status, SystemStatus::Moon);
    }

    #[test]
    fn status_change_timestamp_carries_while_status_holds() {
        let meta = PvSystemMetadata {
            pv_system_id: "sys-a".to_string(),
            name: "Site A".to_string(),
            peak_power: None,
            time_zone: None,
        };
        let fetched = details(&["a1"], &[], &[]);
        let earlier = Utc::now() - Duration::hours(6);

        let first = build_health(&meta, &fetched, None, earlier);
        assert_eq!(first.last_status_change, earlier);

        let second = build_health(&meta, &fetched, Some(&first), Utc::now());
        assert_eq!(second.last_status_change, earlier);

        let faulted = details(&[], &["a1"], &[]);
        let now = Utc::now();
        let third = build_health(&meta, &faulted, Some(&second), now);
        assert_eq!(third.last_status_change, now);
    }
}
