// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Hardware layer for the pit controller
//!
//! This module provides the hardware drivers:
//! - ADS1115 ADC access (vendor HAL, raw SMBus, and simulation backends)
//! - NTC thermistor temperature calculations
//! - pigpio daemon client
//! - damper servo actuator with slew-rate limiting

pub mod ads1115;
pub mod pigpio;
pub mod servo;
pub mod thermistor;

pub use ads1115::{Ads1115Manager, AdcBackendKind, ProbeSample, SimulationHandle};
pub use servo::{ServoController, ServoDiagnostics};
pub use thermistor::ThermistorCalculator;
