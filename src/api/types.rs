//! Wire types for the remote status API
//!
//! Field names follow the backend's JSON casing via serde renames; parsing
//! stays lenient (optional fields default) so a partially-filled record never
//! fails a whole refresh.

use crate::status::{DeviceStatusSignal, RawDeviceState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one PV system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvSystemMetadata {
    /// Backend id of the system
    pub pv_system_id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Installed peak power in watts
    #[serde(default)]
    pub peak_power: Option<f64>,

    /// IANA timezone of the installation
    #[serde(default)]
    pub time_zone: Option<String>,
}

impl PvSystemMetadata {
    /// Display name with the backend's short-id fallback
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            let short: String = self.pv_system_id.chars().take(8).collect();
            format!("System {}", short)
        } else {
            self.name.clone()
        }
    }
}

/// One page of the system enumeration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvSystemsPage {
    #[serde(default)]
    pub pv_systems: Vec<PvSystemMetadata>,

    #[serde(default)]
    pub total_items_count: Option<usize>,
}

/// Status details for one system: per-state inverter id lists plus the
/// backend's own verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatusDetails {
    /// Backend-reported status word
    #[serde(rename = "status", default)]
    pub status: String,

    #[serde(rename = "TotalInverters", default)]
    pub total_inverters: usize,

    #[serde(rename = "GreenInverters", default)]
    pub green_inverters: Vec<String>,

    #[serde(rename = "RedInverters", default)]
    pub red_inverters: Vec<String>,

    #[serde(rename = "MoonInverters", default)]
    pub moon_inverters: Vec<String>,

    #[serde(rename = "lastUpdated", default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SystemStatusDetails {
    /// Flatten the id lists into per-device signals for classification
    pub fn signals(&self, system_id: &str) -> Vec<DeviceStatusSignal> {
        let mut signals =
            Vec::with_capacity(self.green_inverters.len() + self.red_inverters.len() + self.moon_inverters.len());
        for id in &self.green_inverters {
            signals.push(DeviceStatusSignal::new(
                id.clone(),
                system_id.to_string(),
                RawDeviceState::Producing,
            ));
        }
        for id in &self.red_inverters {
            signals.push(DeviceStatusSignal::new(
                id.clone(),
                system_id.to_string(),
                RawDeviceState::Faulted,
            ));
        }
        for id in &self.moon_inverters {
            signals.push(DeviceStatusSignal::new(
                id.clone(),
                system_id.to_string(),
                RawDeviceState::Idle,
            ));
        }
        signals
    }
}

/// Profile of one inverter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterProfile {
    #[serde(default)]
    pub device_id: String,

    #[serde(default)]
    pub device_name: Option<String>,

    #[serde(default)]
    pub device_type: Option<String>,

    #[serde(default)]
    pub serial_number: Option<String>,
}

impl InverterProfile {
    /// Display name with the backend's short-id fallback
    pub fn display_name(&self) -> String {
        match self.device_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let short: String = self.device_id.chars().take(8).collect();
                format!("Inverter {}", short)
            }
        }
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JwtResponse {
    #[serde(rename = "jwtToken")]
    pub jwt_token: String,
}
