// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP routes for the pit controller
//!
//! The routes map one-to-one onto the engine's command and query surface.
//! Handlers hold the engine briefly and never block on hardware I/O beyond
//! a single transaction.

use chrono::{SecondsFormat, Utc};
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::{json, Json, Value};
use rocket::{get, post, State};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::control::controller::{ControlMode, ControllerState, PerformanceStats};
use crate::control::csv_log::CsvLoggingStatus;
use crate::control::error::ControlError;
use crate::control::pid::PidTuningInfo;
use crate::control::EggBotController;
use crate::server::models::{
    control_error_response, ApiError, ControlModeIn, CsvStartIn, DamperIn, ErrorResponse,
    MeatSetpointIn, PidGainsIn, PidPresetLoadIn, PresetFile, ProbeCalibrationIn, SetpointIn,
    SystemStatusOut, TelemetryOut,
};
use crate::server::presets::PresetStore;

type Engine = State<Arc<EggBotController>>;

fn bad_request(message: String) -> ApiError {
    control_error_response(ControlError::OutOfRange(message))
}

/// Liveness check.
#[get("/health")]
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// Current controller snapshot.
#[get("/status")]
pub async fn get_status(engine: &Engine) -> Json<ControllerState> {
    Json(engine.get_status())
}

/// Full telemetry ring.
#[get("/telemetry")]
pub async fn get_telemetry(engine: &Engine) -> Json<TelemetryOut> {
    Json(TelemetryOut {
        points: engine.get_telemetry(),
    })
}

/// Set the pit setpoint.
#[post("/setpoint", format = "json", data = "<body>")]
pub async fn set_setpoint(body: Json<SetpointIn>, engine: &Engine) -> Result<Json<Value>, ApiError> {
    engine
        .set_setpoint(body.setpoint_c)
        .map_err(control_error_response)?;
    Ok(Json(json!({ "ok": true, "setpoint_c": body.setpoint_c })))
}

/// Set or clear the meat setpoint.
#[post("/meat_setpoint", format = "json", data = "<body>")]
pub async fn set_meat_setpoint(
    body: Json<MeatSetpointIn>,
    engine: &Engine,
) -> Result<Json<Value>, ApiError> {
    engine
        .set_meat_setpoint(body.meat_setpoint_c)
        .map_err(control_error_response)?;
    Ok(Json(
        json!({ "ok": true, "meat_setpoint_c": body.meat_setpoint_c }),
    ))
}

/// Set the damper manually (switches to manual mode).
#[post("/damper", format = "json", data = "<body>")]
pub async fn set_damper(body: Json<DamperIn>, engine: &Engine) -> Result<Json<Value>, ApiError> {
    if !body.damper_percent.is_finite() || !(0.0..=100.0).contains(&body.damper_percent) {
        return Err(bad_request(format!(
            "Damper percent {} out of range [0-100]",
            body.damper_percent
        )));
    }
    let applied = engine.set_damper_percent(body.damper_percent);
    Ok(Json(json!({ "ok": true, "damper_percent": applied })))
}

/// Set the PID gains.
#[post("/pid_gains", format = "json", data = "<body>")]
pub async fn set_pid_gains(
    body: Json<PidGainsIn>,
    engine: &Engine,
) -> Result<Json<Value>, ApiError> {
    let [kp, ki, kd] = body.pid_gains.as_slice() else {
        return Err(bad_request(format!(
            "pid_gains must be [kp, ki, kd], got {} values",
            body.pid_gains.len()
        )));
    };
    engine
        .set_pid_gains(*kp, *ki, *kd)
        .map_err(control_error_response)?;
    Ok(Json(json!({ "ok": true, "pid_gains": body.pid_gains })))
}

/// Switch between manual and automatic control.
#[post("/control_mode", format = "json", data = "<body>")]
pub async fn set_control_mode(
    body: Json<ControlModeIn>,
    engine: &Engine,
) -> Result<Json<Value>, ApiError> {
    let mode = ControlMode::from_str(&body.control_mode).map_err(control_error_response)?;
    engine.set_control_mode(mode).map_err(control_error_response)?;
    Ok(Json(json!({ "ok": true, "control_mode": mode.as_str() })))
}

/// Comprehensive system status with all probes and counters.
#[get("/pi/system/status")]
pub async fn pi_system_status(engine: &Engine) -> Json<SystemStatusOut> {
    let status = engine.get_status();
    let performance = engine.get_performance_stats();
    let probes: HashMap<String, _> = engine
        .get_probe_status()
        .into_iter()
        .map(|view| (view.probe_name.clone(), view))
        .collect();

    Json(SystemStatusOut {
        probes,
        system_enabled: engine.is_running(),
        safety_shutdown: status.safety_shutdown,
        control_loop_count: performance.control_loop_count,
        telemetry_points: performance.telemetry_points,
        connected_probes: status.connected_probes.len(),
    })
}

/// Per-probe status map.
#[get("/pi/probes/status")]
pub async fn pi_probe_status(engine: &Engine) -> Json<Value> {
    let probes: HashMap<String, _> = engine
        .get_probe_status()
        .into_iter()
        .map(|view| (view.probe_name.clone(), view))
        .collect();
    Json(json!(probes))
}

/// Current temperatures from all probes.
#[get("/pi/temperatures")]
pub async fn pi_temperatures(engine: &Engine) -> Json<Value> {
    let status = engine.get_status();
    Json(json!({
        "pit_temp_c": status.pit_temp_c,
        "meat_temp_1_c": status.meat_temp_1_c,
        "meat_temp_2_c": status.meat_temp_2_c,
        "ambient_temp_c": status.ambient_temp_c,
        "connected_probes": status.connected_probes,
        "timestamp": status.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// PID tuning information.
#[get("/pi/pid/tuning-info")]
pub async fn pi_pid_tuning_info(engine: &Engine) -> Json<PidTuningInfo> {
    Json(engine.get_pid_tuning_info())
}

/// Built-in tuning preset names.
#[get("/pi/pid/presets")]
pub async fn pi_pid_presets(engine: &Engine) -> Json<Value> {
    Json(json!({ "presets": engine.available_presets() }))
}

/// Apply a built-in tuning preset.
#[post("/pi/pid/preset/load", format = "json", data = "<body>")]
pub async fn pi_load_pid_preset(
    body: Json<PidPresetLoadIn>,
    engine: &Engine,
) -> Result<Json<Value>, ApiError> {
    let (kp, ki, kd) = engine
        .load_pid_preset(&body.preset_name)
        .map_err(control_error_response)?;
    Ok(Json(json!({
        "ok": true,
        "preset_loaded": body.preset_name,
        "gains": { "kp": kp, "ki": ki, "kd": kd },
    })))
}

/// Calibrate a probe against a known temperature.
#[post("/pi/probes/calibrate", format = "json", data = "<body>")]
pub async fn pi_calibrate_probe(
    body: Json<ProbeCalibrationIn>,
    engine: &Engine,
) -> Result<Json<Value>, ApiError> {
    let offset = engine
        .calibrate_probe(&body.probe_name, body.actual_temperature)
        .map_err(control_error_response)?;
    Ok(Json(json!({
        "ok": true,
        "probe_calibrated": body.probe_name,
        "actual_temperature": body.actual_temperature,
        "offset_c": offset,
    })))
}

/// Clear the safety shutdown.
#[post("/pi/safety/reset")]
pub async fn pi_safety_reset(engine: &Engine) -> Json<Value> {
    engine.reset_safety_shutdown();
    Json(json!({ "ok": true, "message": "Safety shutdown reset" }))
}

/// Safety system snapshot.
#[get("/pi/safety/status")]
pub async fn pi_safety_status(engine: &Engine) -> Json<Value> {
    let status = engine.get_status();
    Json(json!({
        "safety_shutdown": status.safety_shutdown,
        "system_enabled": engine.is_running(),
        "control_mode": status.control_mode.as_str(),
        "pit_temp_c": status.pit_temp_c,
        "setpoint_c": status.setpoint_c,
        "connected_probes": status.connected_probes,
        "timestamp": status.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

/// Engine performance statistics.
#[get("/pi/system/performance")]
pub async fn pi_performance(engine: &Engine) -> Json<PerformanceStats> {
    Json(engine.get_performance_stats())
}

/// Servo diagnostics.
#[get("/pi/servo/diagnostics")]
pub async fn pi_servo_diagnostics(engine: &Engine) -> Json<crate::hardware::ServoDiagnostics> {
    Json(engine.get_servo_diagnostics())
}

/// Clear the telemetry ring.
#[post("/pi/telemetry/clear")]
pub async fn pi_clear_telemetry(engine: &Engine) -> Json<Value> {
    engine.clear_telemetry();
    Json(json!({ "ok": true, "message": "Telemetry data cleared" }))
}

/// Start the CSV telemetry sink.
#[post("/pi/csv/start", format = "json", data = "<body>")]
pub async fn pi_csv_start(body: Json<CsvStartIn>, engine: &Engine) -> Result<Json<Value>, ApiError> {
    let path = engine
        .start_csv_logging(&body.filename, body.interval_seconds)
        .map_err(control_error_response)?;
    Ok(Json(json!({
        "ok": true,
        "file_path": path,
        "interval_seconds": body.interval_seconds,
    })))
}

/// Stop the CSV telemetry sink, returning the file path.
#[post("/pi/csv/stop")]
pub async fn pi_csv_stop(engine: &Engine) -> Result<Json<Value>, ApiError> {
    let path = engine.stop_csv_logging().map_err(control_error_response)?;
    Ok(Json(json!({ "ok": true, "file_path": path })))
}

/// CSV sink status.
#[get("/pi/csv/status")]
pub async fn pi_csv_status(engine: &Engine) -> Json<CsvLoggingStatus> {
    Json(engine.csv_logging_status())
}

/// List saved preset files.
#[get("/pid-presets")]
pub async fn list_saved_presets(store: &State<PresetStore>) -> Json<Vec<PresetFile>> {
    Json(store.list())
}

/// Load one saved preset file.
#[get("/pid-presets/<name>")]
pub async fn load_saved_preset(
    name: &str,
    store: &State<PresetStore>,
) -> Result<Json<Value>, ApiError> {
    match store.load(name).map_err(control_error_response)? {
        Some(preset) => Ok(Json(json!({ "gains": preset.gains }))),
        None => Err(Custom(
            Status::NotFound,
            Json(ErrorResponse {
                error: "Preset not found".to_string(),
                code: "not_found".to_string(),
            }),
        )),
    }
}

/// Save a preset file.
#[post("/pid-presets", format = "json", data = "<body>")]
pub async fn save_preset(
    body: Json<PresetFile>,
    store: &State<PresetStore>,
) -> Result<Json<Value>, ApiError> {
    store.save(&body).map_err(control_error_response)?;
    Ok(Json(json!({ "ok": true })))
}
