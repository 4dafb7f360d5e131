// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Rust EggBot Library
//!
//! A closed-loop temperature controller for charcoal smokers. A
//! single-board computer reads four NTC thermistor probes through an
//! ADS1115 I2C ADC, runs a PID control loop at fixed cadence, and drives an
//! RC servo that positions the intake damper. An HTTP surface exposes live
//! state, accepts setpoints and manual overrides, streams historical
//! telemetry, and can mirror the telemetry to a local CSV file.
//!
//! ## Main Components
//!
//! - **Hardware**: ADS1115 driver (HAL, raw SMBus, and simulation
//!   backends), thermistor math, pigpio client, and the servo actuator
//! - **Control**: the temperature monitor, the PID regulator, and the
//!   EggBot engine that orchestrates them
//! - **Server**: Rocket HTTP API mapping one-to-one onto the engine
//! - **Config**: YAML configuration with CLI and environment overrides
//! - **Daemon**: service lifecycle management for the engine and the API
//!
//! ## Usage
//!
//! The crate can be used either as a library (construct an
//! [`control::EggBotController`] and drive it directly) or through the
//! `rust_eggbot` binary, which loads the configuration and runs the daemon
//! until interrupted.

/// Configuration handling for the pit controller.
///
/// Provides functionality for loading, validating, and managing
/// application settings: server binding, hardware parameters, PID tuning,
/// and safety limits.
pub mod config;

/// Real-time control engine.
///
/// The temperature monitor, the PID regulator, the EggBot engine, the CSV
/// telemetry sink, and the error kinds of the command surface.
pub mod control;

/// Daemon process for background service management.
///
/// Launches and supervises the control engine and the API server, and
/// coordinates graceful shutdown.
pub mod daemon;

/// Hardware drivers.
///
/// ADS1115 ADC access, NTC thermistor calculations, the pigpio daemon
/// client, and the slew-limited servo actuator.
pub mod hardware;

/// HTTP API server.
///
/// Rocket routes, request/response models, and the saved-preset file
/// store.
pub mod server;

/// Utility helpers shared across the application.
pub mod utility;
