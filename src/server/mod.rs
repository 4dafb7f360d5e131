// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP API server
//!
//! Thin Rocket wrapper over the engine's command/query surface. The engine
//! is injected as managed state; no global singleton exists.

pub mod models;
pub mod presets;
pub mod routes;

use anyhow::Result;
use log::info;
use rocket::http::Method;
use rocket::{routes, Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins, Cors, CorsOptions};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::control::EggBotController;
use crate::server::presets::PresetStore;

/// Build the CORS fairing from the comma-separated origins list; `*`
/// allows any origin.
fn build_cors(cors_origins: &str) -> Result<Cors> {
    let origins: Vec<String> = cors_origins
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    let allowed_origins = if origins.iter().any(|o| o == "*") || origins.is_empty() {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&origins)
    };

    CorsOptions::default()
        .allowed_origins(allowed_origins)
        .allowed_methods(
            vec![Method::Get, Method::Post]
                .into_iter()
                .map(From::from)
                .collect(),
        )
        .allowed_headers(AllowedHeaders::all())
        .allow_credentials(true)
        .to_cors()
        .map_err(|e| anyhow::anyhow!("CORS configuration error: {e}"))
}

/// Assemble the Rocket instance: engine and preset store as managed state,
/// all routes mounted at the root, CORS attached.
pub fn build_rocket(config: &Config, engine: Arc<EggBotController>) -> Result<Rocket<Build>> {
    let figment = rocket::Config::figment()
        .merge(("address", config.server.address.clone()))
        .merge(("port", config.server.port))
        .merge(("ident", config.server.name.clone()));

    let cors = build_cors(&config.server.cors_origins)?;
    let preset_store = PresetStore::new(PathBuf::from(&config.control.presets_dir));

    info!(
        "Building API server on {}:{}",
        config.server.address, config.server.port
    );

    Ok(rocket::custom(figment)
        .manage(engine)
        .manage(preset_store)
        .mount(
            "/",
            routes![
                routes::health,
                routes::get_status,
                routes::get_telemetry,
                routes::set_setpoint,
                routes::set_meat_setpoint,
                routes::set_damper,
                routes::set_pid_gains,
                routes::set_control_mode,
                routes::pi_system_status,
                routes::pi_probe_status,
                routes::pi_temperatures,
                routes::pi_pid_tuning_info,
                routes::pi_pid_presets,
                routes::pi_load_pid_preset,
                routes::pi_calibrate_probe,
                routes::pi_safety_reset,
                routes::pi_safety_status,
                routes::pi_performance,
                routes::pi_servo_diagnostics,
                routes::pi_clear_telemetry,
                routes::pi_csv_start,
                routes::pi_csv_stop,
                routes::pi_csv_status,
                routes::list_saved_presets,
                routes::load_saved_preset,
                routes::save_preset,
            ],
        )
        .attach(cors))
}
