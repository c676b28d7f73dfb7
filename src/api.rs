//! Domain types exposed to the hosting energy-management system

use std::fmt;

/// Charge state of the connected vehicle, following IEC 61851
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeStatus {
    /// No vehicle connected (state A)
    Disconnected,

    /// Vehicle connected, not charging (state B)
    Connected,

    /// Vehicle charging (state C)
    Charging,
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargeStatus::Disconnected => write!(f, "disconnected"),
            ChargeStatus::Connected => write!(f, "connected"),
            ChargeStatus::Charging => write!(f, "charging"),
        }
    }
}

/// Optional capabilities a charger instance may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Instantaneous power readings
    Meter = 0,

    /// Cumulative energy readings
    MeterEnergy = 1,

    /// Per-phase current readings
    PhaseCurrents = 2,

    /// Per-phase voltage readings
    PhaseVoltages = 3,

    /// Charge session identity (NFC tag) reporting
    Identify = 4,

    /// Manual AC phase-count switching
    PhaseSwitch = 5,
}

impl Capability {
    const ALL: [Capability; 6] = [
        Capability::Meter,
        Capability::MeterEnergy,
        Capability::PhaseCurrents,
        Capability::PhaseVoltages,
        Capability::Identify,
        Capability::PhaseSwitch,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Meter => write!(f, "meter"),
            Capability::MeterEnergy => write!(f, "meter_energy"),
            Capability::PhaseCurrents => write!(f, "phase_currents"),
            Capability::PhaseVoltages => write!(f, "phase_voltages"),
            Capability::Identify => write!(f, "identify"),
            Capability::PhaseSwitch => write!(f, "phase_switch"),
        }
    }
}

/// Immutable capability bundle, built once when the adapter is attached
///
/// Capabilities never appear or disappear after construction, even if the
/// device's advertised feature list would logically change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    bits: u8,
}

impl CapabilitySet {
    /// Empty set: the base charger contract only
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability while composing the set
    pub fn insert(&mut self, cap: Capability) {
        self.bits |= 1 << cap as u8;
    }

    /// Whether the given capability was attached
    pub fn has(&self, cap: Capability) -> bool {
        self.bits & (1 << cap as u8) != 0
    }

    /// Iterate over the attached capabilities
    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.has(*c))
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for cap in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}", cap)?;
            first = false;
        }
        Ok(())
    }
}
