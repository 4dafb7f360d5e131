// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Configuration Management
//!
//! This module implements configuration handling for the pit controller.
//! It supports loading, validating, and saving configuration from YAML
//! files.
//!
//! ## Configuration Structure
//!
//! The application's configuration is organized as a nested structure with
//! sections:
//! - `server`: settings for the HTTP API server
//! - `hardware`: GPIO, ADC, servo, and thermistor parameters
//! - `control`: PID gains, safety limits, and loop timings
//!
//! ## Usage
//!
//! ```no_run
//! use rust_eggbot::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(Some(8081), Some("0.0.0.0".to_string()), Some(true), true);
//!
//! println!("Server port: {}", config.server.port);
//! ```

pub mod control;
pub mod hardware;

pub use control::{pid_preset, ControlConfig, PidConfig, PidGains, PidLimits, SafetyLimits};
pub use hardware::{
    AdcConfig, GpioConfig, HardwareConfig, PigpioConfig, ProbeId, ProbeThermistors, ServoConfig,
    SteinhartHartCoefficients, ThermistorConfig,
};

use anyhow::{Context, Result};
use log::{debug, error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};

/// Configuration for the HTTP API server
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServerConfig {
    /// The TCP port the API server will listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// The network address the server will bind to
    #[serde(default = "default_address")]
    pub address: String,

    /// The server name reported in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Comma-separated list of allowed CORS origins; "*" allows any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,

    /// Enable or disable the API server
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_name() -> String {
    format!("EggBotApiServer/{}", env!("CARGO_PKG_VERSION"))
}

fn default_cors_origins() -> String {
    "http://localhost:5173".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            address: default_address(),
            name: default_name(),
            cors_origins: default_cors_origins(),
            enabled: default_enabled(),
        }
    }
}

/// Root configuration structure for the pit controller.
///
/// The configuration is deserialized from and serialized to YAML using the
/// serde framework. Each section falls back to default values when not
/// explicitly specified, allowing for minimal configuration files.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Settings for the HTTP API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Hardware parameters: GPIO, ADC, servo, thermistors
    #[serde(default)]
    pub hardware: HardwareConfig,

    /// Control system parameters: PID, safety limits, loop timings
    #[serde(default)]
    pub control: ControlConfig,
}

impl Config {
    /// Helper method to create a sample config file when parsing fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");

        if let Some(parent) = sample_path.parent() {
            if !parent.exists() && !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        let sample_config = Self::default();
        sample_config
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// When the file does not exist a default configuration is written to
    /// that path and returned. When the file exists but fails to parse, a
    /// `*.sample.yaml` with default values is written next to it and an
    /// error is returned.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                match Self::create_sample_config(path) {
                    Ok(_) => debug!("Successfully created sample config"),
                    Err(e) => error!("Failed to create sample config: {}", e),
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = Self::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values that are explicitly provided override the existing
    /// configuration.
    pub fn apply_args(
        &mut self,
        web_port: Option<u16>,
        web_address: Option<String>,
        simulate: Option<bool>,
        server_mode: bool,
    ) {
        if let Some(web_port) = web_port {
            debug!("Overriding port from command line: {}", web_port);
            self.server.port = web_port;
        }

        if let Some(web_address) = web_address {
            debug!("Overriding address from command line: {}", web_address);
            self.server.address = web_address;
        }

        if let Some(simulate) = simulate {
            debug!("Overriding simulate from command line: {}", simulate);
            self.hardware.simulate = simulate;
        }

        // Ensure the API server is enabled in daemon mode
        if server_mode {
            self.server.enabled = true;
        }
    }

    /// Apply `SIMULATE` and `CORS_ORIGINS` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(simulate) = std::env::var("SIMULATE") {
            let value = matches!(simulate.to_lowercase().as_str(), "1" | "true" | "yes");
            debug!("Overriding simulate from environment: {}", value);
            self.hardware.simulate = value;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            debug!("Overriding CORS origins from environment: {}", origins);
            self.server.cors_origins = origins;
        }
    }

    /// Validate rules that the type system does not capture
    fn validate_specific_rules(config: &Config) -> Result<()> {
        debug!("Performing additional validation checks");

        if config.server.port < 1 {
            anyhow::bail!("Invalid port number: {}", config.server.port);
        }

        let limits = &config.control.pid.limits;
        if limits.output_min >= limits.output_max {
            anyhow::bail!(
                "PID output_min ({}) must be less than output_max ({})",
                limits.output_min,
                limits.output_max
            );
        }
        if limits.integral_min >= limits.integral_max {
            anyhow::bail!(
                "PID integral_min ({}) must be less than integral_max ({})",
                limits.integral_min,
                limits.integral_max
            );
        }
        if !(0.0..=1.0).contains(&limits.derivative_filter) {
            anyhow::bail!(
                "PID derivative_filter ({}) must be in [0, 1]",
                limits.derivative_filter
            );
        }

        let safety = &config.control.safety;
        if safety.min_pit_temp >= safety.max_pit_temp {
            anyhow::bail!(
                "min_pit_temp ({}) must be less than max_pit_temp ({})",
                safety.min_pit_temp,
                safety.max_pit_temp
            );
        }

        let servo = &config.hardware.servo;
        if servo.min_pulse_width >= servo.max_pulse_width {
            anyhow::bail!(
                "Servo min_pulse_width ({}) must be less than max_pulse_width ({})",
                servo.min_pulse_width,
                servo.max_pulse_width
            );
        }

        if !(0.0..=1.0).contains(&config.control.filter_alpha) {
            anyhow::bail!(
                "filter_alpha ({}) must be in [0, 1]",
                config.control.filter_alpha
            );
        }

        Ok(())
    }
}

/// Output the configuration JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line. It generates the schema from the configuration
/// types and prints it to stdout, formatted for readability.
///
/// # Example
///
/// ```bash
/// ./rust_eggbot --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema = schemars::schema_for!(Config);

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yml::to_string(&config).unwrap();
        let parsed: Config = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.hardware.adc.i2c_address, 0x48);
        assert_eq!(parsed.control.pid.gains.kp, 2.0);
    }

    #[test]
    fn test_apply_args_overrides() {
        let mut config = Config::default();
        config.apply_args(Some(9000), Some("0.0.0.0".to_string()), Some(true), true);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.address, "0.0.0.0");
        assert!(config.hardware.simulate);
        assert!(config.server.enabled);
    }

    #[test]
    fn test_validation_rejects_inverted_limits() {
        let mut config = Config::default();
        config.control.pid.limits.output_min = 100.0;
        config.control.pid.limits.output_max = 0.0;
        assert!(Config::validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "server:\n  port: 9090\n";
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.address, "127.0.0.1");
        assert_eq!(config.control.control_loop_interval, 1.0);
        assert!(!config.hardware.simulate);
    }
}
