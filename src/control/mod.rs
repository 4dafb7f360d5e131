// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Control engine for the pit controller
//!
//! This module provides the real-time control core:
//! - the temperature monitor with its sampling thread and safety envelope
//! - the PID regulator with anti-windup and bumpless mode transfer
//! - the EggBot engine orchestrating monitor, regulator, and servo
//! - the CSV telemetry sink
//! - the error kinds shared across the command surface

pub mod controller;
pub mod csv_log;
pub mod error;
pub mod monitor;
pub mod pid;

pub use controller::{ControlMode, ControllerState, EggBotController};
pub use error::{ControlError, ControlResult};
pub use monitor::{Alert, AlertLevel, TemperatureMonitor, TemperatureTrend};
pub use pid::PidController;
