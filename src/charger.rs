//! Charger adapter core
//!
//! [`WarpCharger`] exposes a WARP-family charging station, reachable over the
//! message bus, as a capability-typed charger. The base contract (enable,
//! enabled, status, max current) is always available; metering, per-phase
//! readings, identity reporting and phase switching are attached by
//! [`ChargerHandle::attach`] based on what the device instance advertises and
//! what the user configured.

use crate::api::{Capability, CapabilitySet, ChargeStatus};
use crate::bus::{BoundedGetter, GuardedGetter, SharedBus, TimeoutHandler};
use crate::config::ChargerConfig;
use crate::error::{ElektraError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::protocol::{self, ExternalControl, topic};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Minimum charge current mandated by IEC 61851, in milliamps
const MIN_CURRENT_MA: i64 = 6000;

/// Adapter for a single charging station
pub struct WarpCharger {
    /// Logger with topic context
    logger: StructuredLogger,

    /// Shared bus handle owned by the hosting process
    bus: SharedBus,

    /// Charger root topic prefix
    topic: String,

    /// Energy manager root topic prefix, when one controls this charger
    em_topic: Option<String>,

    /// Read timeout window
    window: Duration,

    /// Capability list advertised by the firmware, probed at most once
    features: OnceCell<Vec<String>>,

    /// Per-topic state getters, all anchored to the keepalive topic
    external_current_g: GuardedGetter,
    evse_state_g: GuardedGetter,
    meter_g: GuardedGetter,
    meter_all_g: GuardedGetter,
    charge_g: GuardedGetter,
    users_config_g: GuardedGetter,
    em_state_g: Option<GuardedGetter>,

    /// Last successfully applied charge current in milliamps
    current: AtomicI64,
}

impl WarpCharger {
    /// Create a new adapter over the given bus handle
    ///
    /// Subscribes to every state topic up front; the bus connection itself
    /// belongs to the host and is never managed here.
    pub async fn new(bus: SharedBus, config: &ChargerConfig) -> Result<Self> {
        let logger =
            get_logger_with_context(LogContext::new("charger").with_topic(&config.topic));
        let window = config.timeout();

        let keepalive = bus.subscribe(&topic::low_level_state(&config.topic)).await?;
        let to = TimeoutHandler::new(keepalive, window);

        let external_current_g = to.wrap(
            bus.subscribe(&topic::external_current(&config.topic))
                .await?,
        );
        let evse_state_g = to.wrap(bus.subscribe(&topic::evse_state(&config.topic)).await?);
        let meter_g = to.wrap(bus.subscribe(&topic::meter_values(&config.topic)).await?);
        let meter_all_g = to.wrap(bus.subscribe(&topic::meter_all_values(&config.topic)).await?);
        let charge_g = to.wrap(bus.subscribe(&topic::current_charge(&config.topic)).await?);
        let users_config_g = to.wrap(bus.subscribe(&topic::users_config(&config.topic)).await?);

        let em_state_g = match &config.energy_manager {
            Some(em_root) => Some(to.wrap(
                bus.subscribe(&topic::energy_manager_state(em_root)).await?,
            )),
            None => None,
        };

        Ok(Self {
            logger,
            bus,
            topic: config.topic.clone(),
            em_topic: config.energy_manager.clone(),
            window,
            features: OnceCell::new(),
            external_current_g,
            evse_state_g,
            meter_g,
            meter_all_g,
            charge_g,
            users_config_g,
            em_state_g,
            current: AtomicI64::new(MIN_CURRENT_MA),
        })
    }

    /// Whether the firmware advertises the given capability token
    ///
    /// The first call probes `info/features` and caches the result for the
    /// adapter's lifetime; discovery failure caches the empty list instead of
    /// erroring, degrading to minimal capability exposure.
    pub async fn has_feature(&self, feature: &str) -> bool {
        let features = self
            .features
            .get_or_init(|| async {
                match self.probe_features().await {
                    Ok(features) => features,
                    Err(e) => {
                        self.logger
                            .warn(&format!("Feature discovery failed: {}", e));
                        Vec::new()
                    }
                }
            })
            .await;

        features.iter().any(|f| f == feature)
    }

    async fn probe_features(&self) -> Result<Vec<String>> {
        let sub = self.bus.subscribe(&topic::features(&self.topic)).await?;
        let payload = BoundedGetter::new(sub, self.window)
            .require_fresh()
            .get()
            .await?;
        Ok(serde_json::from_str(&payload)?)
    }

    /// Enable or disable charging
    ///
    /// Enabling re-applies the last successfully applied nonzero current;
    /// disabling applies zero. Always issues a write command.
    pub async fn enable(&self, enable: bool) -> Result<()> {
        let mut milliamps = 0;
        if enable {
            milliamps = self.current.load(Ordering::SeqCst);
        }
        self.write_current(milliamps).await
    }

    /// Whether charging is currently enabled, from hardware state
    ///
    /// True iff the reported applied current reaches the IEC 61851 minimum.
    pub async fn enabled(&self) -> Result<bool> {
        let payload = self.external_current_g.get().await?;
        let res: protocol::ExternalCurrent = serde_json::from_str(&payload)?;
        Ok(res.current >= MIN_CURRENT_MA)
    }

    /// Current charge state of the connected vehicle
    pub async fn status(&self) -> Result<ChargeStatus> {
        let payload = self.evse_state_g.get().await?;
        let state: protocol::EvseState = serde_json::from_str(&payload)?;

        match state.iec61851_state {
            0 => Ok(ChargeStatus::Disconnected),
            1 => Ok(ChargeStatus::Connected),
            2 => Ok(ChargeStatus::Charging),
            code => Err(ElektraError::validation(
                "iec61851_state",
                &format!("invalid status code: {}", code),
            )),
        }
    }

    /// Set the maximum charge current in whole amps
    pub async fn max_current(&self, amps: i64) -> Result<()> {
        self.max_current_millis(amps as f64).await
    }

    /// Set the maximum charge current in amps with milliamp resolution
    ///
    /// Only a successful nonzero write updates the cached current that
    /// `enable` re-applies; a failed write leaves the previous known-good
    /// value.
    pub async fn max_current_millis(&self, amps: f64) -> Result<()> {
        let milliamps = amps_to_milliamps(amps)?;
        self.write_current(milliamps).await?;
        if milliamps > 0 {
            self.current.store(milliamps, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn write_current(&self, milliamps: i64) -> Result<()> {
        let payload = serde_json::json!({ "current": milliamps }).to_string();
        self.bus
            .publish(&topic::external_current_update(&self.topic), payload)
            .await
    }

    /// Instantaneous power in W
    pub async fn current_power(&self) -> Result<f64> {
        Ok(self.meter_values().await?.power)
    }

    /// Cumulative energy in kWh
    pub async fn total_energy(&self) -> Result<f64> {
        Ok(self.meter_values().await?.energy_abs)
    }

    async fn meter_values(&self) -> Result<protocol::MeterValues> {
        let payload = self.meter_g.get().await?;
        Ok(serde_json::from_str(&payload)?)
    }

    async fn all_values(&self) -> Result<Vec<f64>> {
        let payload = self.meter_all_g.get().await?;
        protocol::parse_all_values(&payload)
    }

    /// Per-phase voltages L1-L3 in V
    pub async fn voltages(&self) -> Result<[f64; 3]> {
        let values = self.all_values().await?;
        Ok([values[0], values[1], values[2]])
    }

    /// Per-phase currents L1-L3 in A
    pub async fn currents(&self) -> Result<[f64; 3]> {
        let values = self.all_values().await?;
        Ok([values[3], values[4], values[5]])
    }

    /// NFC tag of the most recent charge session; empty when untagged
    pub async fn identify(&self) -> Result<String> {
        let payload = self.charge_g.get().await?;
        let charge: protocol::CurrentCharge = serde_json::from_str(&payload)?;
        Ok(charge.authorization_info.tag_id)
    }

    /// User configuration document, surfaced uninterpreted
    pub async fn user_config(&self) -> Result<serde_json::Value> {
        let payload = self.users_config_g.get().await?;
        Ok(serde_json::from_str(&payload)?)
    }

    /// Fresh read of the energy manager state
    pub async fn energy_manager_state(&self) -> Result<protocol::EnergyManagerState> {
        let getter = self
            .em_state_g
            .as_ref()
            .ok_or_else(|| ElektraError::unsupported("no energy manager configured"))?;

        let payload = getter.get().await?;
        Ok(serde_json::from_str(&payload)?)
    }

    /// Request an AC phase-count change through the energy manager
    ///
    /// Re-reads the energy manager state at call time; an engaged automatic
    /// controller blocks the write with an error naming the control mode.
    pub async fn set_phases(&self, phases: u32) -> Result<()> {
        let em_root = self
            .em_topic
            .as_ref()
            .ok_or_else(|| ElektraError::unsupported("no energy manager configured"))?;

        let state = self.energy_manager_state().await?;
        if !state.external_control.available() {
            return Err(ElektraError::validation(
                "external_control",
                &format!("phase control not available: {}", state.external_control),
            ));
        }

        let payload = serde_json::json!({ "phases_wanted": phases }).to_string();
        self.bus
            .publish(&topic::external_control_update(em_root), payload)
            .await
    }
}

/// Convert amps to milliamps, truncating fractional milliamps
fn amps_to_milliamps(amps: f64) -> Result<i64> {
    if !amps.is_finite() || amps < 0.0 {
        return Err(ElektraError::validation(
            "current",
            &format!("invalid charge current: {}", amps),
        ));
    }
    Ok((amps * 1e3) as i64)
}

/// A charger with its capability set, as handed to the hosting system
///
/// The capability set is evaluated once at attach time and never changes.
/// Optional operations on a handle without the matching capability fail with
/// an unsupported-operation error instead of touching the bus.
pub struct ChargerHandle {
    charger: WarpCharger,
    capabilities: CapabilitySet,
}

impl std::fmt::Debug for ChargerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChargerHandle")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl ChargerHandle {
    /// Construct an adapter and compose its capability set
    ///
    /// Metering, per-phase readings and identity follow the advertised
    /// feature list. Phase switching requires a configured energy manager
    /// whose state reads back as not externally controlled; a failed state
    /// read conservatively omits the capability.
    pub async fn attach(bus: SharedBus, config: &ChargerConfig) -> Result<Self> {
        let charger = WarpCharger::new(bus, config).await?;
        let mut capabilities = CapabilitySet::new();

        if charger.has_feature(protocol::FEATURE_METER).await {
            capabilities.insert(Capability::Meter);
            capabilities.insert(Capability::MeterEnergy);
        }

        if charger.has_feature(protocol::FEATURE_METER_ALL_VALUES).await {
            capabilities.insert(Capability::PhaseCurrents);
            capabilities.insert(Capability::PhaseVoltages);
        }

        if charger.has_feature(protocol::FEATURE_NFC).await {
            capabilities.insert(Capability::Identify);
        }

        if charger.em_topic.is_some() {
            match charger.energy_manager_state().await {
                Ok(state) if state.external_control != ExternalControl::CONTROLLED => {
                    capabilities.insert(Capability::PhaseSwitch);
                }
                Ok(state) => {
                    charger.logger.info(&format!(
                        "Phase switching not exposed: control mode is {}",
                        state.external_control
                    ));
                }
                Err(e) => {
                    charger.logger.warn(&format!(
                        "Phase switching not exposed: energy manager state unavailable: {}",
                        e
                    ));
                }
            }
        }

        charger
            .logger
            .info(&format!("Attached with capabilities: [{}]", capabilities));

        Ok(Self {
            charger,
            capabilities,
        })
    }

    /// Capability set composed at attach time
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Whether the given capability was attached
    pub fn has(&self, cap: Capability) -> bool {
        self.capabilities.has(cap)
    }

    fn require(&self, cap: Capability) -> Result<()> {
        if self.capabilities.has(cap) {
            Ok(())
        } else {
            Err(ElektraError::unsupported(format!(
                "{} capability not attached",
                cap
            )))
        }
    }

    /// Enable or disable charging
    pub async fn enable(&self, enable: bool) -> Result<()> {
        self.charger.enable(enable).await
    }

    /// Whether charging is currently enabled
    pub async fn enabled(&self) -> Result<bool> {
        self.charger.enabled().await
    }

    /// Current charge state
    pub async fn status(&self) -> Result<ChargeStatus> {
        self.charger.status().await
    }

    /// Set the maximum charge current in whole amps
    pub async fn max_current(&self, amps: i64) -> Result<()> {
        self.charger.max_current(amps).await
    }

    /// Set the maximum charge current in amps with milliamp resolution
    pub async fn max_current_millis(&self, amps: f64) -> Result<()> {
        self.charger.max_current_millis(amps).await
    }

    /// User configuration document
    pub async fn user_config(&self) -> Result<serde_json::Value> {
        self.charger.user_config().await
    }

    /// Instantaneous power in W
    pub async fn current_power(&self) -> Result<f64> {
        self.require(Capability::Meter)?;
        self.charger.current_power().await
    }

    /// Cumulative energy in kWh
    pub async fn total_energy(&self) -> Result<f64> {
        self.require(Capability::MeterEnergy)?;
        self.charger.total_energy().await
    }

    /// Per-phase currents L1-L3 in A
    pub async fn currents(&self) -> Result<[f64; 3]> {
        self.require(Capability::PhaseCurrents)?;
        self.charger.currents().await
    }

    /// Per-phase voltages L1-L3 in V
    pub async fn voltages(&self) -> Result<[f64; 3]> {
        self.require(Capability::PhaseVoltages)?;
        self.charger.voltages().await
    }

    /// NFC tag of the most recent charge session
    pub async fn identify(&self) -> Result<String> {
        self.require(Capability::Identify)?;
        self.charger.identify().await
    }

    /// Request an AC phase-count change
    pub async fn set_phases(&self, phases: u32) -> Result<()> {
        self.require(Capability::PhaseSwitch)?;
        self.charger.set_phases(phases).await
    }
}
