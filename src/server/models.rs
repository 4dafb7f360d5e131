// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Request and response types for the HTTP API
//!
//! Every payload is an explicit serde type; controller snapshots serialize
//! through their own derives. Engine errors map onto HTTP statuses here.

use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::control::controller::ProbeStatusView;
use crate::control::error::ControlError;

/// Error envelope returned for every failed request.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Map an engine error onto an HTTP response.
///
/// Validation faults are client errors; mode and lifecycle conflicts are
/// conflicts; everything else is a server error.
pub fn control_error_response(err: ControlError) -> Custom<Json<ErrorResponse>> {
    let status = match &err {
        ControlError::OutOfRange(_) | ControlError::MathDomain(_) => Status::BadRequest,
        ControlError::ModeConflict(_) | ControlError::StateConflict(_) => Status::Conflict,
        ControlError::HardwareUnavailable(_)
        | ControlError::TransientI2cFault { .. }
        | ControlError::ServoCommandFault(_)
        | ControlError::SafetyTripped(_) => Status::InternalServerError,
    };
    Custom(
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

pub type ApiError = Custom<Json<ErrorResponse>>;

#[derive(Debug, Deserialize)]
pub struct SetpointIn {
    pub setpoint_c: f64,
}

#[derive(Debug, Deserialize)]
pub struct MeatSetpointIn {
    pub meat_setpoint_c: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DamperIn {
    pub damper_percent: f64,
}

#[derive(Debug, Deserialize)]
pub struct PidGainsIn {
    pub pid_gains: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ControlModeIn {
    pub control_mode: String,
}

#[derive(Debug, Deserialize)]
pub struct PidPresetLoadIn {
    pub preset_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProbeCalibrationIn {
    pub probe_name: String,
    pub actual_temperature: f64,
}

fn default_csv_interval() -> f64 {
    5.0
}

#[derive(Debug, Deserialize)]
pub struct CsvStartIn {
    pub filename: String,
    #[serde(default = "default_csv_interval")]
    pub interval_seconds: f64,
}

/// Saved PID preset file payload: `{name, gains: [kp, ki, kd]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetFile {
    pub name: String,
    pub gains: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct TelemetryOut {
    pub points: Vec<crate::control::ControllerState>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatusOut {
    pub probes: HashMap<String, ProbeStatusView>,
    pub system_enabled: bool,
    pub safety_shutdown: bool,
    pub control_loop_count: u64,
    pub telemetry_points: usize,
    pub connected_probes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping_statuses() {
        let response = control_error_response(ControlError::OutOfRange("x".into()));
        assert_eq!(response.0, Status::BadRequest);

        let response = control_error_response(ControlError::ModeConflict("x".into()));
        assert_eq!(response.0, Status::Conflict);

        let response = control_error_response(ControlError::StateConflict("x".into()));
        assert_eq!(response.0, Status::Conflict);

        let response =
            control_error_response(ControlError::HardwareUnavailable("gone".into()));
        assert_eq!(response.0, Status::InternalServerError);
    }

    #[test]
    fn test_csv_start_defaults_interval() {
        let parsed: CsvStartIn = serde_json::from_str(r#"{"filename": "run"}"#).unwrap();
        assert_eq!(parsed.interval_seconds, 5.0);
    }
}
