//! Vendor topic scheme and wire payload types
//!
//! The charger firmware publishes its state as JSON documents on a set of
//! well-known topics below a configurable root prefix, and accepts writes on
//! dedicated `*_update` topics. This module holds the topic builders, the
//! capability tokens advertised on `info/features`, and serde types for every
//! payload the adapter interprets.

use crate::error::{ElektraError, Result};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Default root topic prefix used by the charger firmware
pub const ROOT_TOPIC: &str = "warp";

/// Default read timeout window
pub const TIMEOUT: Duration = Duration::from_secs(30);

/// Capability token: the device carries a power/energy meter
pub const FEATURE_METER: &str = "meter";

/// Capability token: the meter reports per-phase voltages and currents
pub const FEATURE_METER_ALL_VALUES: &str = "meter_all_values";

/// Capability token: the device has an NFC tag reader
pub const FEATURE_NFC: &str = "nfc";

/// Topics published by the charger under its root prefix
pub mod topic {
    /// Capability list advertised by the firmware
    pub fn features(root: &str) -> String {
        format!("{}/info/features", root)
    }

    /// Keepalive topic; its freshness anchors every bounded read
    pub fn low_level_state(root: &str) -> String {
        format!("{}/evse/low_level_state", root)
    }

    /// Applied charge current state
    pub fn external_current(root: &str) -> String {
        format!("{}/evse/external_current", root)
    }

    /// Applied charge current write command
    pub fn external_current_update(root: &str) -> String {
        format!("{}/evse/external_current_update", root)
    }

    /// Charge state (IEC 61851 state machine position)
    pub fn evse_state(root: &str) -> String {
        format!("{}/evse/state", root)
    }

    /// Metering snapshot (power and cumulative energy)
    pub fn meter_values(root: &str) -> String {
        format!("{}/meter/values", root)
    }

    /// Extended metering (per-phase voltages and currents)
    pub fn meter_all_values(root: &str) -> String {
        format!("{}/meter/all_values", root)
    }

    /// Most recent charge session record
    pub fn current_charge(root: &str) -> String {
        format!("{}/charge_tracker/current_charge", root)
    }

    /// User configuration document
    pub fn users_config(root: &str) -> String {
        format!("{}/users/config", root)
    }

    /// Energy manager state, below the energy manager's own root
    pub fn energy_manager_state(em_root: &str) -> String {
        format!("{}/energy_manager/state", em_root)
    }

    /// Phase count write command, below the energy manager's own root
    pub fn external_control_update(em_root: &str) -> String {
        format!("{}/energy_manager/external_control_update", em_root)
    }
}

/// Applied charge current as reported on `evse/external_current`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalCurrent {
    /// Applied current in milliamps
    pub current: i64,
}

/// Charge state as reported on `evse/state`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvseState {
    /// IEC 61851 state machine position
    pub iec61851_state: i64,

    /// Firmware-internal charger state
    #[serde(default)]
    pub charger_state: i64,

    /// Contactor supervision state
    #[serde(default)]
    pub contactor_state: i64,

    /// Error state reported by the EVSE
    #[serde(default)]
    pub error_state: i64,
}

/// Metering snapshot as reported on `meter/values`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeterValues {
    /// Instantaneous power in W
    pub power: f64,

    /// Energy since the meter was last reset, in kWh
    #[serde(default)]
    pub energy_rel: f64,

    /// Cumulative energy in kWh
    #[serde(default)]
    pub energy_abs: f64,
}

/// Most recent charge session record from `charge_tracker/current_charge`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentCharge {
    /// User the session is accounted to, -1 when untracked
    #[serde(default)]
    pub user_id: i64,

    /// How the session was authorized
    #[serde(default)]
    pub authorization_type: i64,

    /// Identity the session was authorized with
    #[serde(default)]
    pub authorization_info: AuthorizationInfo,
}

/// Authorization details of a charge session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationInfo {
    /// NFC tag the session was started with; empty when none
    #[serde(default)]
    pub tag_id: String,
}

/// Energy manager state as reported on `energy_manager/state`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnergyManagerState {
    /// Phase-control availability for external writers
    pub external_control: ExternalControl,
}

/// Phase-control mode of the energy manager
///
/// Unknown codes are preserved so error messages can name them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ExternalControl(pub i64);

impl ExternalControl {
    /// Manual phase control is available
    pub const AVAILABLE: ExternalControl = ExternalControl(0);

    /// The energy manager is actively controlling the phase count
    pub const CONTROLLED: ExternalControl = ExternalControl(1);

    /// Whether a manual phase-count write is currently permitted
    pub fn available(&self) -> bool {
        *self == Self::AVAILABLE
    }
}

impl fmt::Display for ExternalControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "available"),
            1 => write!(f, "externally controlled"),
            2 => write!(f, "unavailable (runtime conditions not met)"),
            3 => write!(f, "switching in progress"),
            n => write!(f, "unknown ({})", n),
        }
    }
}

/// Parse the extended metering payload: a flat array of at least six floats,
/// positions 0-2 carrying phase voltages L1-L3 and 3-5 phase currents L1-L3.
pub fn parse_all_values(payload: &str) -> Result<Vec<f64>> {
    let values: Vec<f64> = serde_json::from_str(payload)?;

    if values.len() <= 5 {
        return Err(ElektraError::validation(
            "meter/all_values",
            &format!("invalid length: {}", values.len()),
        ));
    }

    Ok(values)
}
