// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::sync::Once;
use tempfile::tempdir;

use rust_eggbot::config::Config;

static INIT: Once = Once::new();

// Setup logger for tests
fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

#[test]
fn test_missing_config_creates_default_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    let config = Config::from_file(&config_path)?;
    assert!(config_path.exists(), "default config file was not created");
    assert_eq!(config.server.port, 8080);
    assert!(!config.hardware.simulate);

    // Loading the generated file again returns the same configuration.
    let reloaded = Config::from_file(&config_path)?;
    assert_eq!(reloaded.server.port, config.server.port);
    assert_eq!(reloaded.control.pid.gains.kp, config.control.pid.gains.kp);

    Ok(())
}

#[test]
fn test_config_deserialization_error_creates_sample_file() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Valid YAML but wrong structure (type mismatches).
    let invalid_yaml = r#"
server:
  port: "not-an-integer"
  address: 12345
  enabled: "true"
"#;
    fs::write(&config_path, invalid_yaml)?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err(), "config loading should have failed");

    let sample_path = config_path.with_extension("sample.yaml");
    assert!(
        Path::new(&sample_path).exists(),
        "sample config file was not created"
    );

    // The sample file itself is valid.
    let sample_config = Config::from_file(&sample_path)?;
    assert_eq!(sample_config.server.port, 8080);

    Ok(())
}

#[test]
fn test_invalid_limits_rejected_with_sample() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Parses fine but violates the inverted-limits rule.
    let yaml = r#"
control:
  pid:
    gains:
      kp: 2.0
      ki: 0.1
      kd: 1.0
    limits:
      output_min: 100.0
      output_max: 0.0
"#;
    fs::write(&config_path, yaml)?;

    let result = Config::from_file(&config_path);
    assert!(result.is_err());
    assert!(config_path.with_extension("sample.yaml").exists());

    Ok(())
}

#[test]
fn test_partial_config_uses_defaults() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    fs::write(
        &config_path,
        "server:\n  port: 9001\nhardware:\n  simulate: true\n",
    )?;

    let config = Config::from_file(&config_path)?;
    assert_eq!(config.server.port, 9001);
    assert!(config.hardware.simulate);
    // Untouched sections keep their defaults.
    assert_eq!(config.control.safety.max_pit_temp, 400.0);
    assert_eq!(config.hardware.servo.min_pulse_width, 1033);
    assert_eq!(config.hardware.thermistors.pit_probe.b_coefficient, 3950);

    Ok(())
}

#[test]
fn test_save_and_reload_round_trip() -> Result<()> {
    setup();
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("saved.yaml");

    let mut config = Config::default();
    config.server.port = 8123;
    config.control.pid.gains.kp = 3.5;
    config.hardware.thermistors.pit_probe.offset_c = -1.25;
    config.save_to_file(&config_path)?;

    let reloaded = Config::from_file(&config_path)?;
    assert_eq!(reloaded.server.port, 8123);
    assert_eq!(reloaded.control.pid.gains.kp, 3.5);
    assert_eq!(reloaded.hardware.thermistors.pit_probe.offset_c, -1.25);

    Ok(())
}

#[test]
fn test_example_config_parses() -> Result<()> {
    setup();
    // The demo configuration embedded in the binary must stay loadable.
    let example = include_str!("../config.example.yaml");
    let config: Config = serde_yml::from_str(example)?;
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.hardware.adc.i2c_address, 0x48);
    assert_eq!(config.control.control_loop_interval, 1.0);
    Ok(())
}
