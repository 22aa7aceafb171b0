//! # Hyperion - Solar Fleet Monitor
//!
//! A Rust monitoring core for fleets of residential PV systems, polling a
//! cloud status backend and turning raw inverter states into a live fleet
//! snapshot, tracked incidents, and user notifications.
//!
//! ## Features
//!
//! - **High Performance**: Async-first design with Tokio runtime
//! - **Fleet Snapshots**: Atomic, generation-numbered views of every system
//! - **Status Classification**: Three-state rollup from per-device signals
//! - **Incident Tracking**: Fault lifecycle with escalation and dismissal
//! - **Notifications**: Status-change alerts plus two recurring daily triggers
//! - **Web Interface**: REST API and server-sent snapshot events
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! The application follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `api`: HTTP client for the PV status backend
//! - `status`: Device and system status classification
//! - `monitor`: Polling loop, snapshot aggregation and publication
//! - `incidents`: Incident lifecycle and escalation policy
//! - `notify`: Notification content, tap routing and daily scheduling
//! - `storage`: Key-value persistence for user preferences
//! - `web`: HTTP server and REST API

pub mod api;
pub mod config;
pub mod error;
pub mod incidents;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod status;
pub mod storage;
pub mod web;


// Re-export commonly used types
pub use config::Config;
pub use error::{HyperionError, Result};
pub use monitor::{FleetMonitor, FleetSnapshot, MonitorHandle};
pub use status::SystemStatus;
