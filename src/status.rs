//! Health classification for inverters and PV systems
//!
//! Maps raw per-inverter status signals to the three-state health model and
//! folds device states into per-system and fleet-wide status. Everything in
//! this module is pure and total: unknown inputs degrade to `Moon`, never to
//! an error.

use serde::{Deserialize, Serialize};

/// Raw inverter state as reported by the remote system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawDeviceState {
    /// Feeding power into the grid
    Producing,

    /// Reporting an error code
    Faulted,

    /// Asleep outside production hours
    Idle,

    /// Anything the wire vocabulary does not cover
    Unknown,
}

impl RawDeviceState {
    /// Parse the wire vocabulary. Unmapped values become `Unknown`; callers
    /// rely on this never failing.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        match s.as_str() {
            "green" | "producing" => Self::Producing,
            "red" | "faulted" => Self::Faulted,
            "moon" | "idle" => Self::Idle,
            _ => Self::Unknown,
        }
    }
}

/// Raw observation for one inverter, produced by a refresh cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatusSignal {
    /// Inverter device id
    pub device_id: String,

    /// Owning PV system id
    pub system_id: String,

    /// Reported state
    pub raw_state: RawDeviceState,
}

impl DeviceStatusSignal {
    pub fn new<S: Into<String>>(device_id: S, system_id: S, raw_state: RawDeviceState) -> Self {
        Self {
            device_id: device_id.into(),
            system_id: system_id.into(),
            raw_state,
        }
    }
}

/// Derived three-state health for a PV system or the whole fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    /// Producing normally
    Online,

    /// At least one device faulted
    Error,

    /// All devices idle or asleep, none faulted
    Moon,
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Error => write!(f, "error"),
            Self::Moon => write!(f, "moon"),
        }
    }
}

/// Map a single device state onto the health model. Unknown states count as
/// `Moon` so a reporting gap degrades quietly instead of raising alarms.
pub fn classify_device(state: RawDeviceState) -> SystemStatus {
    match state {
        RawDeviceState::Producing => SystemStatus::Online,
        RawDeviceState::Faulted => SystemStatus::Error,
        RawDeviceState::Idle | RawDeviceState::Unknown => SystemStatus::Moon,
    }
}

/// Classify one system from its device signals.
///
/// Order-independent fold with fixed precedence: any faulted device makes the
/// system `Error`; otherwise any producing device makes it `Online`;
/// otherwise `Moon`. An empty signal list classifies as `Moon` (nothing
/// actionable, not an error).
pub fn classify_system(signals: &[DeviceStatusSignal]) -> SystemStatus {
    let mut any_producing = false;
    for signal in signals {
        match classify_device(signal.raw_state) {
            SystemStatus::Error => return SystemStatus::Error,
            SystemStatus::Online => any_producing = true,
            SystemStatus::Moon => {}
        }
    }
    if any_producing {
        SystemStatus::Online
    } else {
        SystemStatus::Moon
    }
}

/// Fold per-system statuses into an overall status with the same precedence
/// rule. An empty fleet is `Moon`.
pub fn overall_status<I>(statuses: I) -> SystemStatus
where
    I: IntoIterator<Item = SystemStatus>,
{
    let mut any_online = false;
    for status in statuses {
        match status {
            SystemStatus::Error => return SystemStatus::Error,
            SystemStatus::Online => any_online = true,
            SystemStatus::Moon => {}
        }
    }
    if any_online {
        SystemStatus::Online
    } else {
        SystemStatus::Moon
    }
}

/// Fleet-wide status counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub online: usize,
    pub error: usize,
    pub moon: usize,
    pub total: usize,
}

impl StatusCounts {
    /// Tally statuses. `online + error + moon == total` holds for any input.
    pub fn tally<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = SystemStatus>,
    {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                SystemStatus::Online => counts.online += 1,
                SystemStatus::Error => counts.error += 1,
                SystemStatus::Moon => counts.moon += 1,
            }
            counts.total += 1;
        }
        counts
    }
}
