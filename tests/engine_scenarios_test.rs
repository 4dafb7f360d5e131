// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end control engine scenarios against the simulated hardware.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_eggbot::config::{Config, ProbeId};
use rust_eggbot::control::error::ControlError;
use rust_eggbot::control::monitor::AlertLevel;
use rust_eggbot::control::{ControlMode, EggBotController};

fn simulated_config(logs_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.hardware.simulate = true;
    config.control.logs_dir = logs_dir.display().to_string();
    config
}

fn started_engine(config: &Config) -> Arc<EggBotController> {
    let engine = Arc::new(EggBotController::new(config));
    engine.start();
    engine
}

/// Poll until the predicate holds or the timeout elapses.
fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    predicate()
}

#[test]
fn test_bumpless_transfer_from_manual_damper() {
    let dir = tempfile::tempdir().unwrap();
    let engine = started_engine(&simulated_config(dir.path()));
    let sim = engine.simulation().expect("simulation backend");

    // Pit locked at 100 degC, setpoint at the default 110 degC. The
    // low-pass filter needs a few samples to converge on the step.
    sim.set_channel_temperature(0, 100.0);
    assert!(
        wait_until(Duration::from_secs(15), || {
            engine
                .get_status()
                .pit_temp_c
                .map_or(false, |t| (t - 100.0).abs() < 3.0)
        }),
        "pit temperature never settled at 100 degC"
    );

    // Manual damper at 40 %, then switch to automatic.
    engine.set_damper_percent(40.0);
    engine.set_control_mode(ControlMode::Automatic).unwrap();

    // The first automatic tick must hold approximately the manual output.
    assert!(
        wait_until(Duration::from_secs(4), || engine.get_status().pid_output != 0.0),
        "PID never produced an output"
    );
    let first_output = engine.get_status().pid_output;
    assert!(
        (38.0..=42.0).contains(&first_output),
        "first automatic output {first_output} outside [38, 42]"
    );

    // Subsequent ticks trend upward as the integral accrues (the pit sits
    // 10 degC below the setpoint).
    assert!(
        wait_until(Duration::from_secs(6), || {
            engine.get_status().pid_output > first_output + 5.0
        }),
        "output did not trend upward after the transfer"
    );

    engine.stop();
}

#[test]
fn test_setpoint_jump_reseeds_integral() {
    let dir = tempfile::tempdir().unwrap();
    let engine = started_engine(&simulated_config(dir.path()));
    let sim = engine.simulation().expect("simulation backend");

    sim.set_channel_temperature(0, 100.0);
    assert!(wait_until(Duration::from_secs(5), || {
        engine.get_status().pit_temp_c.is_some()
    }));

    engine.set_control_mode(ControlMode::Automatic).unwrap();

    // Let the integral accrue under a sustained 10 degC error.
    assert!(
        wait_until(Duration::from_secs(15), || {
            engine.get_pid_tuning_info().integral_contribution.abs() > 5.0
        }),
        "integral never accrued past 5"
    );

    // A >5 degC setpoint change reseeds the integral immediately.
    engine.set_setpoint(130.0).unwrap();
    let integral = engine.get_pid_tuning_info().integral_contribution;
    assert!(
        integral.abs() <= 0.01,
        "integral {integral} not reset after setpoint jump"
    );

    engine.stop();
}

#[test]
fn test_safety_trip_and_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let engine = started_engine(&simulated_config(dir.path()));
    let sim = engine.simulation().expect("simulation backend");

    sim.set_channel_temperature(0, 110.0);
    assert!(wait_until(Duration::from_secs(5), || {
        engine.get_status().pit_temp_c.is_some()
    }));
    engine.set_damper_percent(40.0);

    // Inject an over-limit pit sample.
    engine.monitor().inject_reading(0, 405.0);

    assert!(
        wait_until(Duration::from_secs(2), || engine.get_status().safety_shutdown),
        "safety shutdown not observed within one control tick"
    );
    let status = engine.get_status();
    assert_eq!(status.control_mode, ControlMode::Manual);
    assert_eq!(status.damper_percent, 0.0);

    // A CRITICAL alert was recorded.
    assert!(engine
        .recent_alerts()
        .iter()
        .any(|a| a.level == AlertLevel::Critical && a.message.contains("405")));

    // Automatic mode is refused while tripped.
    assert!(matches!(
        engine.set_control_mode(ControlMode::Automatic),
        Err(ControlError::ModeConflict(_))
    ));

    // After an explicit reset it succeeds again.
    engine.monitor().inject_reading(0, 110.0);
    engine.reset_safety_shutdown();
    assert!(
        wait_until(Duration::from_secs(2), || !engine.get_status().safety_shutdown),
        "shutdown flag still set after reset"
    );
    engine.set_control_mode(ControlMode::Automatic).unwrap();
    assert_eq!(engine.get_control_mode(), ControlMode::Automatic);

    engine.stop();
}

#[test]
fn test_probe_disconnection_detection() {
    let dir = tempfile::tempdir().unwrap();
    let engine = started_engine(&simulated_config(dir.path()));
    let sim = engine.simulation().expect("simulation backend");

    // Channel 1 valid first, so the probe is connected.
    sim.set_channel_temperature(1, 60.0);
    assert!(wait_until(Duration::from_secs(5), || {
        engine.monitor().probe_status(ProbeId::Meat1).is_connected
    }));

    // Drive the channel outside the divider's valid range; every sample
    // from now on fails conversion.
    sim.set_channel_temperature(1, -120.0);

    assert!(
        wait_until(Duration::from_secs(10), || {
            !engine.monitor().probe_status(ProbeId::Meat1).is_connected
        }),
        "probe never marked disconnected"
    );

    let status = engine.monitor().probe_status(ProbeId::Meat1);
    assert!(status.consecutive_errors >= 6);

    assert!(engine
        .recent_alerts()
        .iter()
        .any(|a| a.level == AlertLevel::Warning && a.message.contains("meat_probe_1")));

    // The disconnected probe drops out of the connected list.
    assert!(wait_until(Duration::from_secs(2), || {
        !engine
            .get_status()
            .connected_probes
            .contains(&"meat_probe_1".to_string())
    }));

    engine.stop();
}

#[test]
fn test_servo_slew_rate_limit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = started_engine(&simulated_config(dir.path()));

    engine.set_damper_percent(100.0);
    let issued = Instant::now();

    std::thread::sleep(Duration::from_secs(1).saturating_sub(issued.elapsed()));
    let position = engine.get_servo_diagnostics().current_position_percent;
    assert!(
        (28.0..=32.0).contains(&position),
        "after 1 s at 30 %/s the position was {position}"
    );

    // Within tolerance of fully open after the full travel time.
    assert!(
        wait_until(Duration::from_secs(5), || {
            engine.get_servo_diagnostics().current_position_percent >= 97.0
        }),
        "servo never reached the open position"
    );

    engine.stop();
}

#[test]
fn test_csv_integrity_over_ten_seconds() {
    let dir = tempfile::tempdir().unwrap();
    let engine = started_engine(&simulated_config(dir.path()));

    engine.start_csv_logging("integrity", 1.0).unwrap();
    std::thread::sleep(Duration::from_secs(10));
    let path = engine.stop_csv_logging().unwrap();
    engine.stop();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert!(lines[0].starts_with("time_since_start_seconds,timestamp,pit_temp_c"));

    let data_rows = &lines[1..];
    assert!(
        (8..=12).contains(&data_rows.len()),
        "expected about 10 data rows, got {}",
        data_rows.len()
    );

    // time_since_start_seconds is monotone non-decreasing with ~1 s steps.
    let times: Vec<f64> = data_rows
        .iter()
        .map(|line| line.split(',').next().unwrap().parse().unwrap())
        .collect();
    for pair in times.windows(2) {
        assert!(pair[1] >= pair[0], "time went backwards: {pair:?}");
    }
    let mean_step = (times[times.len() - 1] - times[0]) / (times.len() - 1) as f64;
    assert!(
        (0.8..=1.4).contains(&mean_step),
        "mean step {mean_step} not close to the 1 s interval"
    );

    // Every row parses into the full column set.
    for row in data_rows {
        assert_eq!(row.split(',').count(), 13, "short row: {row}");
    }
}

#[test]
fn test_telemetry_timestamps_monotone_under_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = simulated_config(dir.path());
    config.control.telemetry_interval = 0.5;
    let engine = started_engine(&config);

    // Concurrent readers while the control thread appends telemetry.
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let _ = engine.get_status();
                    let _ = engine.get_telemetry();
                    std::thread::sleep(Duration::from_millis(20));
                }
            })
        })
        .collect();

    std::thread::sleep(Duration::from_secs(4));
    for reader in readers {
        reader.join().unwrap();
    }

    let telemetry = engine.get_telemetry();
    assert!(telemetry.len() >= 4, "telemetry ring too small: {}", telemetry.len());
    for pair in telemetry.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }

    engine.stop();
}
