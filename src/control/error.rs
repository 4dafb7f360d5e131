// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error kinds for the control engine
//!
//! Hardware and math faults are absorbed by the temperature monitor and
//! become invalid samples; caller input faults surface synchronously from
//! the command surface; safety trips are asynchronous and observed through
//! the controller snapshot.

use thiserror::Error;

/// Errors surfaced by the control engine and its hardware layer.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A hardware backend failed to initialize permanently.
    #[error("hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// A single I2C transaction failed; the monitor retries next tick.
    #[error("transient I2C fault on channel {channel}: {message}")]
    TransientI2cFault {
        /// ADC channel the read was addressed to
        channel: u8,
        /// Underlying bus error description
        message: String,
    },

    /// A single servo pulse-width write failed.
    #[error("servo command fault: {0}")]
    ServoCommandFault(String),

    /// A caller-supplied value lies outside its validated envelope.
    #[error("{0}")]
    OutOfRange(String),

    /// A mode transition that the current state forbids.
    #[error("{0}")]
    ModeConflict(String),

    /// An operation that conflicts with the current lifecycle state.
    #[error("{0}")]
    StateConflict(String),

    /// Thermistor math received values outside the divider's valid range.
    #[error("math domain violation: {0}")]
    MathDomain(String),

    /// A temperature exceeded a critical envelope; the engine shut down.
    #[error("safety envelope tripped: {0}")]
    SafetyTripped(String),
}

impl ControlError {
    /// Short machine-readable code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::HardwareUnavailable(_) => "hardware_unavailable",
            ControlError::TransientI2cFault { .. } => "transient_i2c_fault",
            ControlError::ServoCommandFault(_) => "servo_command_fault",
            ControlError::OutOfRange(_) => "out_of_range",
            ControlError::ModeConflict(_) => "mode_conflict",
            ControlError::StateConflict(_) => "state_conflict",
            ControlError::MathDomain(_) => "math_domain",
            ControlError::SafetyTripped(_) => "safety_tripped",
        }
    }
}

/// Convenience alias for results carrying a [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            ControlError::OutOfRange("setpoint 500 outside [50, 400]".into()).code(),
            "out_of_range"
        );
        assert_eq!(
            ControlError::ModeConflict("automatic during shutdown".into()).code(),
            "mode_conflict"
        );
        assert_eq!(
            ControlError::TransientI2cFault {
                channel: 1,
                message: "nack".into()
            }
            .code(),
            "transient_i2c_fault"
        );
    }

    #[test]
    fn test_error_display_includes_detail() {
        let err = ControlError::MathDomain("non-positive resistance -12 ohm".into());
        assert!(err.to_string().contains("-12"));
    }
}
