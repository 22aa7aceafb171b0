//! End-to-end monitor tests driven through the public handle, with the run
//! loop live on a background task

use hyperion::api::StatusApi;
use hyperion::api::types::{InverterProfile, PvSystemMetadata, SystemStatusDetails};
use hyperion::config::Config;
use hyperion::error::{HyperionError, Result};
use hyperion::monitor::{FleetMonitor, MonitorHandle, MonitorState};
use hyperion::notify::{LocalNotificationGateway, NotificationGateway};
use hyperion::status::SystemStatus;
use hyperion::storage::{KeyValueStore, MemoryStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct ScriptedApi {
    systems: Vec<PvSystemMetadata>,
    details: Mutex<HashMap<String, SystemStatusDetails>>,
}

impl ScriptedApi {
    fn new(entries: &[(&str, &[&str], &[&str])]) -> Self {
        let systems = entries
            .iter()
            .map(|(id, _, _)| PvSystemMetadata {
                pv_system_id: (*id).to_string(),
                name: format!("Site {}", id),
                peak_power: None,
                time_zone: None,
            })
            .collect();
        let details = entries
            .iter()
            .map(|(id, green, red)| {
                (
                    (*id).to_string(),
                    SystemStatusDetails {
                        status: if red.is_empty() { "green" } else { "red" }.to_string(),
                        total_inverters: green.len() + red.len(),
                        green_inverters: green.iter().map(|s| (*s).to_string()).collect(),
                        red_inverters: red.iter().map(|s| (*s).to_string()).collect(),
                        moon_inverters: Vec::new(),
                        last_updated: None,
                    },
                )
            })
            .collect();
        Self {
            systems,
            details: Mutex::new(details),
        }
    }
}

#[async_trait::async_trait]
impl StatusApi for ScriptedApi {
    async fn get_pv_systems(&self, offset: usize, limit: usize) -> Result<Vec<PvSystemMetadata>> {
        Ok(self.systems.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get_system_status_details(&self, system_id: &str) -> Result<SystemStatusDetails> {
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

struct Running {
    handle: MonitorHandle,
    shutdown: tokio::sync::mpsc::UnboundedSender<()>,
    state: tokio::sync::watch::Receiver<MonitorState>,
    task: tokio::task::JoinHandle<Result<()>>,
}

fn start_monitor(api: ScriptedApi) -> Running {
    let mut config = Config::default();
    config.poll.refresh_on_start = false;

    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let gateway: Arc<dyn NotificationGateway> = Arc::new(LocalNotificationGateway::new(true));
    let mut monitor = FleetMonitor::new(config, Arc::new(api), store, gateway);

    let handle = monitor.handle();
    let shutdown = monitor.shutdown_handle();
    let state = monitor.state();
    let task = tokio::spawn(async move { monitor.run().await });

    Running {
        handle,
        shutdown,
        state,
        task,
    }
}

#[tokio::test]
async fn refresh_publishes_and_shutdown_stops_the_loop() {
    let running = start_monitor(ScriptedApi::new(&[
        ("sys-a", &["a1", "a2"], &[]),
        ("sys-b", &["b1"], &["b2"]),
    ]));

    let outcome = running.handle.refresh().await.unwrap();
    assert_eq!(outcome.snapshot.generation, 1);
    assert!(outcome.failures.is_empty());

    let snapshot = running.handle.snapshot();
    assert_eq!(snapshot.generation, 1);
    assert_eq!(snapshot.overall, SystemStatus::Error);
    assert_eq!(snapshot.counts.total, 2);
    assert_eq!(snapshot.systems["sys-a"].status, SystemStatus::Online);

    running.shutdown.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), running.task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert!(matches!(
        &*running.state.borrow(),
        MonitorState::ShuttingDown
    ));
}

#[tokio::test]
async fn incidents_can_be_dismissed_through_the_handle() {
    let running = start_monitor(ScriptedApi::new(&[("sys-b", &["b1"], &["b2"])]));

    running.handle.refresh().await.unwrap();

    let board = running.handle.incidents();
    assert_eq!(board.pending.len(), 1);
    let id = board.pending[0].id.clone();

    running
        .handle
        .dismiss_incident(&id, Some("maintenance".to_string()))
        .await
        .unwrap();

    let board = running.handle.incidents();
    assert!(board.pending.is_empty());
    assert_eq!(board.dismissed.len(), 1);
    assert_eq!(board.dismissed[0].dismiss_reason.as_deref(), Some("maintenance"));

    let err = running
        .handle
        .dismiss_incident("no-such-incident", None)
        .await
        .unwrap_err();
    assert!(matches!(err, HyperionError::NotFound { .. }));
}

#[tokio::test]
async fn notification_controls_round_trip() {
    let running = start_monitor(ScriptedApi::new(&[("sys-a", &["a1"], &[])]));

    // Turning notifications off clears the installed triggers
    assert!(!running.handle.set_notifications(false).await.unwrap());
    let status = running.handle.notification_status().await.unwrap();
    assert!(!status.enabled);
    assert!(status.triggers.is_empty());

    // Turning them back on installs the two daily triggers
    assert!(running.handle.set_notifications(true).await.unwrap());
    let status = running.handle.notification_status().await.unwrap();
    assert!(status.enabled);
    let mut ids: Vec<&str> = status.triggers.iter().map(|t| t.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["evening-summary", "morning-checkin"]);

    // The evening summary deep-links to the chosen primary system
    running
        .handle
        .set_primary_system(Some("sys-a".to_string()))
        .await
        .unwrap();
    let status = running.handle.notification_status().await.unwrap();
    assert_eq!(status.primary_system.as_deref(), Some("sys-a"));
    let evening = status
        .triggers
        .iter()
        .find(|t| t.id == "evening-summary")
        .unwrap();
    assert_eq!(evening.payload.system_id.as_deref(), Some("sys-a"));
}
