//! # Elektra - MQTT EV Charger Adapter
//!
//! A Rust adapter exposing WARP-family EV charging stations to
//! energy-management systems over a publish/subscribe message bus,
//! translating between vendor JSON payloads and typed domain values.
//!
//! ## Features
//!
//! - **Capability discovery**: optional surfaces (metering, per-phase
//!   readings, NFC identity, phase switching) are composed at attach time
//!   from what the device instance advertises
//! - **Bounded reads**: every state read is timeout-bounded and anchored to
//!   the charger's keepalive topic, so an offline device fails fast instead
//!   of blocking
//! - **Typed translation**: milliamp/amp conversion, IEC 61851 status codes
//!   and per-phase value arrays are validated, never silently defaulted
//! - **Energy manager coordination**: manual phase-count changes check the
//!   automatic controller's mode before touching shared hardware
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! The crate follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `bus`: Message bus seam and bounded read primitives
//! - `protocol`: Vendor topic scheme and wire payload types
//! - `api`: Domain types exposed to the hosting system
//! - `charger`: The adapter core and capability composition
//! - `registry`: Driver factory table for the hosting process

pub mod api;
pub mod bus;
pub mod charger;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod registry;

// Re-export commonly used types
pub use api::{Capability, CapabilitySet, ChargeStatus};
pub use bus::{BusClient, SharedBus};
pub use charger::{ChargerHandle, WarpCharger};
pub use config::Config;
pub use error::{ElektraError, Result};
pub use registry::DriverRegistry;
