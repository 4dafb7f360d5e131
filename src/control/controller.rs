// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! EggBot engine
//!
//! Orchestrates the temperature monitor, the PID regulator, and the servo
//! actuator. Owns the setpoints and the aggregated controller snapshot,
//! runs the cadenced control loop, enforces the safety envelope, and feeds
//! the telemetry ring and the optional CSV sink.
//!
//! The engine is constructed once and shared behind an `Arc`; every command
//! and query is thread-safe and returns copies, never references into the
//! internal state.

use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::control::{pid_preset, PID_PRESET_NAMES};
use crate::config::{Config, ControlConfig, ProbeId};
use crate::control::csv_log::{CsvLogger, CsvLoggingStatus};
use crate::control::error::{ControlError, ControlResult};
use crate::control::monitor::{Alert, AlertLevel, TemperatureMonitor};
use crate::control::pid::{PidController, PidPerformanceStats, PidTuningInfo};
use crate::hardware::ads1115::SimulationHandle;
use crate::hardware::servo::{ServoController, ServoDiagnostics};

/// Initial pit setpoint.
pub const DEFAULT_SETPOINT_C: f64 = 110.0;

/// Accepted calibration temperature envelope.
const CALIBRATION_MIN_C: f64 = -40.0;
const CALIBRATION_MAX_C: f64 = 200.0;

/// Control mode of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Manual,
    Automatic,
}

impl ControlMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlMode::Manual => "manual",
            ControlMode::Automatic => "automatic",
        }
    }
}

impl FromStr for ControlMode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ControlMode::Manual),
            "automatic" => Ok(ControlMode::Automatic),
            other => Err(ControlError::OutOfRange(format!(
                "Invalid control mode {other:?}. Use \"manual\" or \"automatic\""
            ))),
        }
    }
}

/// Aggregated controller snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerState {
    pub pit_temp_c: Option<f64>,
    pub meat_temp_1_c: Option<f64>,
    pub meat_temp_2_c: Option<f64>,
    pub ambient_temp_c: Option<f64>,
    pub setpoint_c: f64,
    pub meat_setpoint_c: Option<f64>,
    pub damper_percent: f64,
    pub control_mode: ControlMode,
    pub safety_shutdown: bool,
    pub connected_probes: Vec<String>,
    pub pid_output: f64,
    pub pid_error: f64,
    pub pid_gains: (f64, f64, f64),
    pub timestamp: DateTime<Utc>,
}

impl ControllerState {
    fn initial(gains: (f64, f64, f64)) -> Self {
        Self {
            pit_temp_c: None,
            meat_temp_1_c: None,
            meat_temp_2_c: None,
            ambient_temp_c: None,
            setpoint_c: DEFAULT_SETPOINT_C,
            meat_setpoint_c: None,
            damper_percent: 0.0,
            control_mode: ControlMode::Manual,
            safety_shutdown: false,
            connected_probes: Vec::new(),
            pid_output: 0.0,
            pid_error: 0.0,
            pid_gains: gains,
            timestamp: Utc::now(),
        }
    }
}

/// Serializable per-probe status view.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeStatusView {
    pub probe_name: String,
    pub connected: bool,
    pub last_temp: Option<f64>,
    pub last_update: Option<String>,
    pub total_readings: u64,
    pub consecutive_errors: u32,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub average_temp: Option<f64>,
}

/// One validated temperature envelope.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
}

/// The configured setpoint envelopes.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TemperatureLimits {
    pub pit_temp: TemperatureRange,
    pub meat_temp: TemperatureRange,
}

/// Engine performance counters.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub pid_controller: PidPerformanceStats,
    pub control_loop_count: u64,
    pub telemetry_points: usize,
    pub connected_probes: usize,
    pub uptime_seconds: f64,
}

/// Main controller that orchestrates all pit-control components.
pub struct EggBotController {
    control_config: ControlConfig,
    monitor: TemperatureMonitor,
    pid: PidController,
    servo: ServoController,
    state: Mutex<ControllerState>,
    telemetry: Mutex<VecDeque<ControllerState>>,
    csv: Mutex<Option<CsvLogger>>,
    alerts: Mutex<mpsc::Receiver<Alert>>,
    running: Arc<AtomicBool>,
    control_thread: Mutex<Option<JoinHandle<()>>>,
    control_loop_count: AtomicU64,
    started_at: Instant,
}

impl EggBotController {
    /// Construct all sub-components with shared configuration. The engine
    /// is idle until [`Self::start`] is called.
    pub fn new(config: &Config) -> Self {
        let monitor = TemperatureMonitor::new(&config.control, &config.hardware);

        let (alert_tx, alert_rx) = mpsc::channel();
        monitor.set_alert_sender(alert_tx);

        let pid = PidController::new(&config.control.pid);
        pid.set_setpoint(DEFAULT_SETPOINT_C);

        let servo = ServoController::new(
            config.hardware.gpio.servo_pin,
            &config.hardware.servo,
            &config.hardware.pigpio,
            config.hardware.simulate,
        );

        let gains = config.control.pid.gains.as_tuple();

        info!(
            "EggBotController initialized (simulate={})",
            config.hardware.simulate
        );

        Self {
            control_config: config.control.clone(),
            monitor,
            pid,
            servo,
            state: Mutex::new(ControllerState::initial(gains)),
            telemetry: Mutex::new(VecDeque::with_capacity(1024)),
            csv: Mutex::new(None),
            alerts: Mutex::new(alert_rx),
            running: Arc::new(AtomicBool::new(false)),
            control_thread: Mutex::new(None),
            control_loop_count: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Start the monitor sampler and the control thread. No-op when
    /// already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        self.monitor.start_monitoring();

        let engine = Arc::clone(self);
        let main_loop_interval = Duration::from_secs_f64(self.control_config.main_loop_interval);

        let handle = thread::Builder::new()
            .name("eggbot-control".to_string())
            .spawn(move || {
                let mut last_control: Option<Instant> = None;
                let mut last_telemetry: Option<Instant> = None;

                while engine.running.load(Ordering::Relaxed) {
                    if let Err(err) = engine.control_pass(&mut last_control, &mut last_telemetry) {
                        error!("Error in control loop: {}", err);
                        thread::sleep(Duration::from_secs(1));
                        continue;
                    }
                    thread::sleep(main_loop_interval);
                }
            })
            .expect("failed to spawn control thread");

        *self.control_thread.lock().unwrap() = Some(handle);
        info!("EggBotController started");
    }

    /// One pass of the control thread.
    fn control_pass(
        &self,
        last_control: &mut Option<Instant>,
        last_telemetry: &mut Option<Instant>,
    ) -> ControlResult<()> {
        self.drain_alerts();
        self.refresh_snapshot();

        let now = Instant::now();

        let control_due = last_control.map_or(true, |t| {
            now.duration_since(t).as_secs_f64() >= self.control_config.control_loop_interval
        });
        if control_due {
            self.run_pid_control();
            *last_control = Some(now);
            self.control_loop_count.fetch_add(1, Ordering::Relaxed);
        }

        let telemetry_due = last_telemetry.map_or(true, |t| {
            now.duration_since(t).as_secs_f64() >= self.control_config.telemetry_interval
        });
        if telemetry_due {
            self.record_telemetry();
            *last_telemetry = Some(now);
        }

        self.log_csv_if_due();
        Ok(())
    }

    /// Drain monitor alerts; CRITICAL triggers the emergency shutdown.
    fn drain_alerts(&self) {
        let pending: Vec<Alert> = {
            let receiver = self.alerts.lock().unwrap();
            receiver.try_iter().collect()
        };

        for alert in pending {
            match alert.level {
                AlertLevel::Critical => {
                    error!("CRITICAL ALERT: {}", alert.message);
                    self.emergency_shutdown();
                }
                AlertLevel::Warning => {
                    warn!("Temperature alert [{}]: {}", alert.level, alert.message);
                }
            }
        }
    }

    /// Refresh the aggregated snapshot from the monitor and the servo.
    fn refresh_snapshot(&self) {
        // Cross-component reads happen outside the engine lock.
        let temps = self.monitor.current_temperatures();
        let monitor_shutdown = self.monitor.is_safety_shutdown();
        let servo_position = self.servo.position_percent();

        let connected: Vec<String> = ProbeId::ALL
            .iter()
            .filter(|probe| temps.get(**probe).is_some())
            .map(|probe| probe.name().to_string())
            .collect();

        let newly_tripped = {
            let mut state = self.state.lock().unwrap();
            state.pit_temp_c = temps.pit;
            state.meat_temp_1_c = temps.meat_1;
            state.meat_temp_2_c = temps.meat_2;
            state.ambient_temp_c = temps.ambient;
            state.connected_probes = connected;
            if state.control_mode == ControlMode::Automatic {
                state.damper_percent = servo_position.clamp(0.0, 100.0);
            }
            let newly_tripped = monitor_shutdown && !state.safety_shutdown;
            if monitor_shutdown {
                state.safety_shutdown = true;
            }
            state.timestamp = Utc::now();
            newly_tripped
        };

        if newly_tripped {
            self.emergency_shutdown();
        }
    }

    /// Run the PID when automatic, not shut down, and the pit probe reads.
    fn run_pid_control(&self) {
        let (mode, shutdown, pit_temp) = {
            let state = self.state.lock().unwrap();
            (state.control_mode, state.safety_shutdown, state.pit_temp_c)
        };

        let Some(pit_temp) = pit_temp else { return };
        if mode != ControlMode::Automatic || shutdown {
            return;
        }

        let output = self.pid.compute(pit_temp);
        self.servo.set_position_percent(output);

        let pid_state = self.pid.get_state();
        let position = self.servo.position_percent();

        let mut state = self.state.lock().unwrap();
        state.pid_output = output;
        state.pid_error = pid_state.error;
        state.damper_percent = position.clamp(0.0, 100.0);
    }

    /// Append the current snapshot to the bounded telemetry ring.
    fn record_telemetry(&self) {
        let snapshot = self.state.lock().unwrap().clone();
        let mut telemetry = self.telemetry.lock().unwrap();
        telemetry.push_back(snapshot);
        while telemetry.len() > self.control_config.max_telemetry_points {
            telemetry.pop_front();
        }
    }

    /// Write a CSV row when the sink is enabled and its interval elapsed.
    fn log_csv_if_due(&self) {
        let mut csv = self.csv.lock().unwrap();
        if let Some(logger) = csv.as_mut() {
            if logger.should_log() {
                let snapshot = self.state.lock().unwrap().clone();
                logger.log_row(&snapshot);
            }
        }
    }

    /// Emergency shutdown: latch the flag, force manual, disable the
    /// regulator, command the damper closed.
    pub fn emergency_shutdown(&self) {
        error!("EMERGENCY SHUTDOWN TRIGGERED");

        {
            let mut state = self.state.lock().unwrap();
            state.safety_shutdown = true;
            state.control_mode = ControlMode::Manual;
            state.damper_percent = 0.0;
        }

        self.pid.set_auto_mode(false);
        self.pid.disable();
        self.servo.set_position_percent(0.0);
    }

    // ---- command surface -------------------------------------------------

    /// Set the pit temperature setpoint.
    pub fn set_setpoint(&self, setpoint_c: f64) -> ControlResult<()> {
        let safety = &self.control_config.safety;
        if !setpoint_c.is_finite()
            || !(safety.min_pit_temp..=safety.max_pit_temp).contains(&setpoint_c)
        {
            let message = format!(
                "Setpoint {setpoint_c} degC out of range [{}-{}] degC",
                safety.min_pit_temp, safety.max_pit_temp
            );
            warn!("Invalid setpoint request: {}", message);
            return Err(ControlError::OutOfRange(message));
        }

        self.state.lock().unwrap().setpoint_c = setpoint_c;
        self.pid.set_setpoint(setpoint_c);
        info!(
            "Setpoint set to {} degC (range: [{}-{}] degC)",
            setpoint_c, safety.min_pit_temp, safety.max_pit_temp
        );
        Ok(())
    }

    pub fn get_setpoint(&self) -> f64 {
        self.state.lock().unwrap().setpoint_c
    }

    /// Set or clear the meat temperature setpoint.
    pub fn set_meat_setpoint(&self, setpoint_c: Option<f64>) -> ControlResult<()> {
        let safety = &self.control_config.safety;
        if let Some(setpoint_c) = setpoint_c {
            if !setpoint_c.is_finite()
                || !(safety.min_meat_temp..=safety.max_meat_temp).contains(&setpoint_c)
            {
                let message = format!(
                    "Meat setpoint {setpoint_c} degC out of range [{}-{}] degC",
                    safety.min_meat_temp, safety.max_meat_temp
                );
                warn!("Invalid meat setpoint request: {}", message);
                return Err(ControlError::OutOfRange(message));
            }
        }

        self.state.lock().unwrap().meat_setpoint_c = setpoint_c;
        match setpoint_c {
            Some(value) => info!("Meat setpoint set to {} degC", value),
            None => info!("Meat setpoint cleared"),
        }
        Ok(())
    }

    pub fn get_meat_setpoint(&self) -> Option<f64> {
        self.state.lock().unwrap().meat_setpoint_c
    }

    /// Set the damper manually; switches the engine to manual mode.
    /// Returns the clamped percentage.
    pub fn set_damper_percent(&self, percent: f64) -> f64 {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };

        {
            let mut state = self.state.lock().unwrap();
            state.control_mode = ControlMode::Manual;
            state.damper_percent = percent;
        }

        self.pid.set_auto_mode(false);
        self.pid.set_manual_output(percent);
        self.servo.set_position_percent(percent);

        info!("Manual damper set to {} %", percent);
        percent
    }

    /// Switch between manual and automatic control.
    ///
    /// Automatic mode is refused while the safety shutdown is latched; the
    /// manual-to-automatic transition is bumpless.
    pub fn set_control_mode(&self, mode: ControlMode) -> ControlResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.safety_shutdown && mode == ControlMode::Automatic {
                return Err(ControlError::ModeConflict(
                    "Cannot switch to automatic mode during safety shutdown".to_string(),
                ));
            }
            state.control_mode = mode;
        }

        match mode {
            ControlMode::Automatic => {
                self.pid.enable();
                self.pid.set_auto_mode(true);
            }
            ControlMode::Manual => {
                // Servo retains its position.
                self.pid.set_auto_mode(false);
            }
        }

        info!("Control mode set to {}", mode.as_str());
        Ok(())
    }

    pub fn get_control_mode(&self) -> ControlMode {
        self.state.lock().unwrap().control_mode
    }

    /// Update the regulator gains.
    pub fn set_pid_gains(&self, kp: f64, ki: f64, kd: f64) -> ControlResult<()> {
        for (name, value) in [("kp", kp), ("ki", ki), ("kd", kd)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ControlError::OutOfRange(format!(
                    "PID gain {name} must be a non-negative number, got {value}"
                )));
            }
        }

        self.pid.set_gains(kp, ki, kd);
        self.state.lock().unwrap().pid_gains = (kp, ki, kd);
        info!("PID gains set to Kp={}, Ki={}, Kd={}", kp, ki, kd);
        Ok(())
    }

    pub fn get_pid_gains(&self) -> (f64, f64, f64) {
        self.pid.gains()
    }

    /// Apply a named tuning preset's gains. Returns the applied triple.
    pub fn load_pid_preset(&self, preset_name: &str) -> ControlResult<(f64, f64, f64)> {
        let preset = pid_preset(preset_name).ok_or_else(|| {
            ControlError::OutOfRange(format!("Unknown PID preset: {preset_name}"))
        })?;

        let (kp, ki, kd) = preset.gains.as_tuple();
        self.set_pid_gains(kp, ki, kd)?;
        info!("Loaded PID preset: {}", preset_name);
        Ok((kp, ki, kd))
    }

    /// Names of the built-in tuning presets.
    pub fn available_presets(&self) -> Vec<&'static str> {
        PID_PRESET_NAMES.to_vec()
    }

    /// Calibrate a probe against a known actual temperature.
    pub fn calibrate_probe(&self, probe_name: &str, actual_temperature: f64) -> ControlResult<f64> {
        let probe = ProbeId::from_name(probe_name).ok_or_else(|| {
            ControlError::OutOfRange(format!("Unknown probe name: {probe_name}"))
        })?;

        if !actual_temperature.is_finite()
            || !(CALIBRATION_MIN_C..=CALIBRATION_MAX_C).contains(&actual_temperature)
        {
            return Err(ControlError::OutOfRange(format!(
                "Calibration temperature {actual_temperature} degC out of range \
                 [{CALIBRATION_MIN_C}-{CALIBRATION_MAX_C}] degC"
            )));
        }

        self.monitor.calibrate_probe(probe, actual_temperature)
    }

    /// Clear the safety shutdown. Automatic mode is not re-enabled.
    pub fn reset_safety_shutdown(&self) {
        self.monitor.reset_safety_shutdown();
        self.state.lock().unwrap().safety_shutdown = false;
        info!("Safety shutdown reset");
    }

    // ---- CSV sink --------------------------------------------------------

    /// Start mirroring telemetry to a CSV file. Fails with a state
    /// conflict when already running.
    pub fn start_csv_logging(
        &self,
        filename: &str,
        interval_seconds: f64,
    ) -> ControlResult<String> {
        let mut csv = self.csv.lock().unwrap();
        if csv.is_some() {
            return Err(ControlError::StateConflict(
                "CSV logging is already active".to_string(),
            ));
        }

        let logger = CsvLogger::create(
            std::path::Path::new(&self.control_config.logs_dir),
            filename,
            interval_seconds,
        )?;
        let path = logger.path().display().to_string();
        *csv = Some(logger);
        Ok(path)
    }

    /// Stop the CSV sink, returning the file path. Fails with a state
    /// conflict when idle.
    pub fn stop_csv_logging(&self) -> ControlResult<String> {
        let logger = self.csv.lock().unwrap().take().ok_or_else(|| {
            ControlError::StateConflict("CSV logging is not active".to_string())
        })?;
        Ok(logger.finish().display().to_string())
    }

    /// Status of the CSV sink.
    pub fn csv_logging_status(&self) -> CsvLoggingStatus {
        match self.csv.lock().unwrap().as_ref() {
            Some(logger) => logger.status(),
            None => CsvLoggingStatus::idle(),
        }
    }

    // ---- queries ---------------------------------------------------------

    /// Current controller snapshot.
    pub fn get_status(&self) -> ControllerState {
        let mut snapshot = self.state.lock().unwrap().clone();
        snapshot.timestamp = Utc::now();
        snapshot
    }

    /// Copy of the telemetry ring, oldest first.
    pub fn get_telemetry(&self) -> Vec<ControllerState> {
        self.telemetry.lock().unwrap().iter().cloned().collect()
    }

    /// Clear the telemetry ring.
    pub fn clear_telemetry(&self) {
        self.telemetry.lock().unwrap().clear();
        info!("Telemetry data cleared");
    }

    /// Per-probe status views, in channel order.
    pub fn get_probe_status(&self) -> Vec<ProbeStatusView> {
        self.monitor
            .all_probe_status()
            .into_iter()
            .map(|status| ProbeStatusView {
                probe_name: status.probe.name().to_string(),
                connected: status.is_connected,
                last_temp: status
                    .last_reading
                    .as_ref()
                    .filter(|r| r.is_valid)
                    .map(|r| r.temperature_c),
                last_update: status
                    .last_update
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
                total_readings: status.total_readings,
                consecutive_errors: status.consecutive_errors,
                min_temp: status.min_temp.is_finite().then_some(status.min_temp),
                max_temp: status.max_temp.is_finite().then_some(status.max_temp),
                average_temp: (status.total_readings > 0
                    && !status.temperature_history.is_empty())
                .then_some(status.average_temp),
            })
            .collect()
    }

    /// Regulator tuning information.
    pub fn get_pid_tuning_info(&self) -> PidTuningInfo {
        self.pid.tuning_info()
    }

    /// Engine performance counters. Uptime counts from construction.
    pub fn get_performance_stats(&self) -> PerformanceStats {
        let connected = self.state.lock().unwrap().connected_probes.len();
        PerformanceStats {
            pid_controller: self.pid.performance_stats(),
            control_loop_count: self.control_loop_count.load(Ordering::Relaxed),
            telemetry_points: self.telemetry.lock().unwrap().len(),
            connected_probes: connected,
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
        }
    }

    /// The configured setpoint envelopes.
    pub fn get_temperature_limits(&self) -> TemperatureLimits {
        let safety = &self.control_config.safety;
        TemperatureLimits {
            pit_temp: TemperatureRange {
                min: safety.min_pit_temp,
                max: safety.max_pit_temp,
            },
            meat_temp: TemperatureRange {
                min: safety.min_meat_temp,
                max: safety.max_meat_temp,
            },
        }
    }

    /// Servo health and configuration snapshot.
    pub fn get_servo_diagnostics(&self) -> ServoDiagnostics {
        self.servo.diagnostics()
    }

    /// Recent safety alerts.
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.monitor.recent_alerts()
    }

    /// The temperature monitor (probe status, trend, injection).
    pub fn monitor(&self) -> &TemperatureMonitor {
        &self.monitor
    }

    /// Handle into the simulated ADC, when simulating.
    pub fn simulation(&self) -> Option<SimulationHandle> {
        self.monitor.simulation()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the engine: control thread, monitor, CSV sink, servo. Bounded
    /// joins; idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.control_thread.lock().unwrap().take() {
            let deadline = Instant::now() + Duration::from_secs(3);
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("Control thread did not stop within 3 s");
            }
        }

        self.monitor.stop_monitoring();

        if self.csv.lock().unwrap().is_some() {
            if let Err(err) = self.stop_csv_logging() {
                error!("Error stopping CSV logging: {}", err);
            }
        }

        // Close the damper, give the motion thread a beat, release the
        // daemon session.
        self.servo.set_position_percent(0.0);
        thread::sleep(Duration::from_millis(200));
        self.servo.close();

        info!("EggBotController stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated_engine() -> Arc<EggBotController> {
        let mut config = Config::default();
        config.hardware.simulate = true;
        Arc::new(EggBotController::new(&config))
    }

    #[test]
    fn test_setpoint_validation_and_round_trip() {
        let engine = simulated_engine();
        assert_eq!(engine.get_setpoint(), DEFAULT_SETPOINT_C);

        engine.set_setpoint(120.0).unwrap();
        assert_eq!(engine.get_setpoint(), 120.0);

        // Rejected out-of-range values leave the setpoint unchanged.
        assert!(matches!(
            engine.set_setpoint(500.0),
            Err(ControlError::OutOfRange(_))
        ));
        assert!(matches!(
            engine.set_setpoint(10.0),
            Err(ControlError::OutOfRange(_))
        ));
        assert_eq!(engine.get_setpoint(), 120.0);
        engine.stop();
    }

    #[test]
    fn test_meat_setpoint_accepts_none() {
        let engine = simulated_engine();
        engine.set_meat_setpoint(Some(63.0)).unwrap();
        assert_eq!(engine.get_meat_setpoint(), Some(63.0));
        engine.set_meat_setpoint(None).unwrap();
        assert_eq!(engine.get_meat_setpoint(), None);
        assert!(engine.set_meat_setpoint(Some(150.0)).is_err());
        engine.stop();
    }

    #[test]
    fn test_damper_clamps_and_forces_manual() {
        let engine = simulated_engine();
        assert_eq!(engine.set_damper_percent(140.0), 100.0);
        assert_eq!(engine.get_control_mode(), ControlMode::Manual);
        assert_eq!(engine.set_damper_percent(-10.0), 0.0);
        let status = engine.get_status();
        assert!(status.damper_percent >= 0.0);
        assert!(status.damper_percent <= 100.0);
        engine.stop();
    }

    #[test]
    fn test_mode_conflict_during_shutdown() {
        let engine = simulated_engine();
        engine.emergency_shutdown();

        assert!(matches!(
            engine.set_control_mode(ControlMode::Automatic),
            Err(ControlError::ModeConflict(_))
        ));
        assert_eq!(engine.get_control_mode(), ControlMode::Manual);

        engine.reset_safety_shutdown();
        engine.set_control_mode(ControlMode::Automatic).unwrap();
        assert_eq!(engine.get_control_mode(), ControlMode::Automatic);
        engine.stop();
    }

    #[test]
    fn test_pid_gain_validation() {
        let engine = simulated_engine();
        engine.set_pid_gains(3.0, 0.2, 1.5).unwrap();
        assert_eq!(engine.get_pid_gains(), (3.0, 0.2, 1.5));
        assert!(engine.set_pid_gains(-1.0, 0.1, 1.0).is_err());
        assert!(engine.set_pid_gains(1.0, f64::NAN, 1.0).is_err());
        engine.stop();
    }

    #[test]
    fn test_preset_loading() {
        let engine = simulated_engine();
        let gains = engine.load_pid_preset("aggressive").unwrap();
        assert_eq!(gains, (4.0, 0.3, 2.0));
        assert_eq!(engine.get_pid_gains(), (4.0, 0.3, 2.0));
        assert!(engine.load_pid_preset("nope").is_err());
        assert_eq!(engine.available_presets().len(), 5);
        engine.stop();
    }

    #[test]
    fn test_calibration_validation() {
        let engine = simulated_engine();
        assert!(matches!(
            engine.calibrate_probe("lid_probe", 100.0),
            Err(ControlError::OutOfRange(_))
        ));
        assert!(matches!(
            engine.calibrate_probe("pit_probe", 300.0),
            Err(ControlError::OutOfRange(_))
        ));
        // No valid reading yet: state conflict.
        assert!(matches!(
            engine.calibrate_probe("pit_probe", 100.0),
            Err(ControlError::StateConflict(_))
        ));
        engine.stop();
    }

    #[test]
    fn test_csv_state_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.hardware.simulate = true;
        config.control.logs_dir = dir.path().join("logs").display().to_string();
        let engine = Arc::new(EggBotController::new(&config));

        let path = engine.start_csv_logging("cook", 5.0).unwrap();
        assert!(path.ends_with("cook.csv"));
        assert!(matches!(
            engine.start_csv_logging("cook2", 5.0),
            Err(ControlError::StateConflict(_))
        ));

        let stopped = engine.stop_csv_logging().unwrap();
        assert_eq!(stopped, path);
        assert!(matches!(
            engine.stop_csv_logging(),
            Err(ControlError::StateConflict(_))
        ));

        engine.stop();
    }

    #[test]
    fn test_telemetry_ring_bounded() {
        let mut config = Config::default();
        config.hardware.simulate = true;
        config.control.max_telemetry_points = 5;
        let engine = Arc::new(EggBotController::new(&config));

        for _ in 0..12 {
            engine.record_telemetry();
        }
        let telemetry = engine.get_telemetry();
        assert_eq!(telemetry.len(), 5);

        // FIFO by insertion: timestamps never decrease.
        for pair in telemetry.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }

        engine.clear_telemetry();
        assert!(engine.get_telemetry().is_empty());
        engine.stop();
    }

    #[test]
    fn test_emergency_shutdown_effects() {
        let engine = simulated_engine();
        engine.set_damper_percent(60.0);
        engine.set_control_mode(ControlMode::Automatic).unwrap();

        engine.emergency_shutdown();

        let status = engine.get_status();
        assert!(status.safety_shutdown);
        assert_eq!(status.control_mode, ControlMode::Manual);
        assert_eq!(status.damper_percent, 0.0);
        engine.stop();
    }

    #[test]
    fn test_performance_stats_uptime_counts_from_start() {
        let engine = simulated_engine();
        std::thread::sleep(Duration::from_millis(50));
        let stats = engine.get_performance_stats();
        assert!(stats.uptime_seconds >= 0.05);
        assert_eq!(stats.control_loop_count, 0);
        engine.stop();
    }

    #[test]
    fn test_temperature_limits_reflect_config() {
        let engine = simulated_engine();
        let limits = engine.get_temperature_limits();
        assert_eq!(limits.pit_temp.min, 50.0);
        assert_eq!(limits.pit_temp.max, 400.0);
        assert_eq!(limits.meat_temp.max, 100.0);
        engine.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let engine = simulated_engine();
        engine.start();
        assert!(engine.is_running());
        engine.stop();
        assert!(!engine.is_running());
        engine.stop();
    }
}
