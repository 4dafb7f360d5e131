// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Temperature monitor
//!
//! Owns the sampling thread that reads all four ADC channels, converts the
//! voltages through the thermistor math, filters and validates the results,
//! tracks per-probe statistics and connectivity, and evaluates the safety
//! envelope. Alerts flow through an `mpsc` channel to the engine and into a
//! bounded recent-alerts log.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::control::{ControlConfig, SafetyLimits};
use crate::config::hardware::HardwareConfig;
use crate::config::ProbeId;
use crate::control::error::{ControlError, ControlResult};
use crate::hardware::ads1115::{Ads1115Manager, AdcBackendKind, SimulationHandle};
use crate::hardware::thermistor::ThermistorCalculator;

/// Consecutive invalid samples after which a probe is marked disconnected.
const DISCONNECT_ERROR_THRESHOLD: u32 = 5;
/// Per-probe temperature history bound.
const TEMPERATURE_HISTORY_SIZE: usize = 100;
/// Bounded recent-alert log size.
const ALERT_LOG_SIZE: usize = 100;
/// History samples examined by the rate-of-change check.
const RATE_CHECK_SAMPLES: usize = 10;
/// Aggressive filter coefficient applied on implausible temperature jumps.
const FAST_CHANGE_ALPHA: f64 = 0.3;

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Warning => write!(f, "WARNING"),
            AlertLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One safety alert.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One converted temperature sample with validity metadata.
#[derive(Debug, Clone)]
pub struct TemperatureReading {
    pub channel: u8,
    pub probe: ProbeId,
    /// Post-filter, post-offset temperature
    pub temperature_c: f64,
    pub voltage: f64,
    pub raw_count: i16,
    pub timestamp: DateTime<Utc>,
    pub is_valid: bool,
    pub error_message: Option<String>,
}

/// Rolling status for one probe.
#[derive(Debug, Clone)]
pub struct ProbeStatus {
    pub probe: ProbeId,
    pub channel: u8,
    pub is_connected: bool,
    pub last_reading: Option<TemperatureReading>,
    pub last_update: Option<DateTime<Utc>>,
    /// Last time a *valid* sample arrived
    pub last_valid_update: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub total_readings: u64,
    pub average_temp: f64,
    pub min_temp: f64,
    pub max_temp: f64,
    pub temperature_history: VecDeque<f64>,
    timeout_alerted: bool,
}

impl ProbeStatus {
    fn new(probe: ProbeId) -> Self {
        Self {
            probe,
            channel: probe.channel(),
            is_connected: false,
            last_reading: None,
            last_update: None,
            last_valid_update: None,
            consecutive_errors: 0,
            total_readings: 0,
            average_temp: 0.0,
            min_temp: f64::INFINITY,
            max_temp: f64::NEG_INFINITY,
            temperature_history: VecDeque::with_capacity(TEMPERATURE_HISTORY_SIZE),
            timeout_alerted: false,
        }
    }
}

/// Snapshot of the four current temperatures; `None` means the probe has no
/// recent valid reading.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CurrentTemperatures {
    pub pit: Option<f64>,
    pub meat_1: Option<f64>,
    pub meat_2: Option<f64>,
    pub ambient: Option<f64>,
}

impl CurrentTemperatures {
    pub fn get(&self, probe: ProbeId) -> Option<f64> {
        match probe {
            ProbeId::Pit => self.pit,
            ProbeId::Meat1 => self.meat_1,
            ProbeId::Meat2 => self.meat_2,
            ProbeId::Ambient => self.ambient,
        }
    }
}

/// Temperature trend over a query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperatureTrend {
    Stable,
    Rising,
    Falling,
    InsufficientData,
}

impl TemperatureTrend {
    pub fn as_str(self) -> &'static str {
        match self {
            TemperatureTrend::Stable => "stable",
            TemperatureTrend::Rising => "rising",
            TemperatureTrend::Falling => "falling",
            TemperatureTrend::InsufficientData => "insufficient_data",
        }
    }
}

struct MonitorShared {
    probes: [ProbeStatus; 4],
    calculator: ThermistorCalculator,
    safety_shutdown: bool,
    recent_alerts: VecDeque<Alert>,
    alert_tx: Option<mpsc::Sender<Alert>>,
    high_temp_alerted: bool,
    rate_alerted: bool,
}

/// Monitors the temperature probes and evaluates the safety envelope.
pub struct TemperatureMonitor {
    shared: Arc<Mutex<MonitorShared>>,
    adc: Arc<Ads1115Manager>,
    update_interval: Duration,
    filter_alpha: f64,
    max_temp_change_per_second: f64,
    safety: SafetyLimits,
    running: Arc<AtomicBool>,
    sampler_thread: Mutex<Option<JoinHandle<()>>>,
}

impl TemperatureMonitor {
    pub fn new(control: &ControlConfig, hardware: &HardwareConfig) -> Self {
        let adc = Arc::new(Ads1115Manager::new(hardware));

        let mut calculator = ThermistorCalculator::new(hardware.adc.supply_voltage);
        for probe in ProbeId::ALL {
            let _ = calculator.set_probe_config(probe.channel(), hardware.thermistors.get(probe).clone());
        }

        let shared = MonitorShared {
            probes: [
                ProbeStatus::new(ProbeId::Pit),
                ProbeStatus::new(ProbeId::Meat1),
                ProbeStatus::new(ProbeId::Meat2),
                ProbeStatus::new(ProbeId::Ambient),
            ],
            calculator,
            safety_shutdown: false,
            recent_alerts: VecDeque::with_capacity(ALERT_LOG_SIZE),
            alert_tx: None,
            high_temp_alerted: false,
            rate_alerted: false,
        };

        info!(
            "TemperatureMonitor initialized with 4 probes ({} backend)",
            adc.backend_kind().as_str()
        );

        Self {
            shared: Arc::new(Mutex::new(shared)),
            adc,
            update_interval: Duration::from_secs_f64(control.monitor_interval),
            filter_alpha: control.filter_alpha,
            max_temp_change_per_second: control.max_temp_change_per_second,
            safety: control.safety,
            running: Arc::new(AtomicBool::new(false)),
            sampler_thread: Mutex::new(None),
        }
    }

    /// Register the channel the engine drains safety alerts from.
    pub fn set_alert_sender(&self, sender: mpsc::Sender<Alert>) {
        self.shared.lock().unwrap().alert_tx = Some(sender);
    }

    /// Start the sampling thread. No-op when already running.
    pub fn start_monitoring(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let adc = Arc::clone(&self.adc);
        let running = Arc::clone(&self.running);
        let update_interval = self.update_interval;
        let filter_alpha = self.filter_alpha;
        let max_rate = self.max_temp_change_per_second;
        let safety = self.safety;

        let handle = thread::Builder::new()
            .name("temp-monitor".to_string())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    let started = Instant::now();

                    let pass = || -> ControlResult<()> {
                        // I2C transactions happen outside the monitor lock.
                        let samples = adc.read_all();

                        let mut guard = shared.lock().unwrap();
                        for (channel, result) in samples {
                            let reading = Self::build_reading(&guard.calculator, channel, result);
                            Self::apply_reading(&mut guard, reading, true, filter_alpha, max_rate);
                        }
                        Self::check_safety(&mut guard, &safety, update_interval);
                        Ok(())
                    };

                    if let Err(err) = pass() {
                        error!("Error in temperature monitor loop: {}", err);
                        thread::sleep(Duration::from_secs(1));
                        continue;
                    }

                    let elapsed = started.elapsed();
                    if elapsed < update_interval {
                        thread::sleep(update_interval - elapsed);
                    }
                }
            })
            .expect("failed to spawn temperature monitor thread");

        *self.sampler_thread.lock().unwrap() = Some(handle);
        info!("Temperature monitoring started");
    }

    /// Stop the sampling thread, joining with a 2 s bound. No-op when idle.
    pub fn stop_monitoring(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.sampler_thread.lock().unwrap().take() {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("Temperature monitor thread did not stop within 2 s");
            }
        }

        info!("Temperature monitoring stopped");
    }

    /// Convert one ADC result into a temperature reading.
    fn build_reading(
        calculator: &ThermistorCalculator,
        channel: u8,
        result: ControlResult<crate::hardware::ads1115::ProbeSample>,
    ) -> TemperatureReading {
        let probe = ProbeId::from_channel(channel).unwrap_or(ProbeId::Pit);
        match result {
            Err(err) => TemperatureReading {
                channel,
                probe,
                temperature_c: 0.0,
                voltage: 0.0,
                raw_count: 0,
                timestamp: Utc::now(),
                is_valid: false,
                error_message: Some(err.to_string()),
            },
            Ok(sample) => match calculator.voltage_to_temperature(sample.voltage, channel) {
                None => TemperatureReading {
                    channel,
                    probe,
                    temperature_c: 0.0,
                    voltage: sample.voltage,
                    raw_count: sample.raw_count,
                    timestamp: sample.timestamp,
                    is_valid: false,
                    error_message: Some("Temperature conversion failed".to_string()),
                },
                Some(temperature_c) => {
                    let is_valid = calculator.validate_reading(temperature_c, channel);
                    TemperatureReading {
                        channel,
                        probe,
                        temperature_c,
                        voltage: sample.voltage,
                        raw_count: sample.raw_count,
                        timestamp: sample.timestamp,
                        is_valid,
                        error_message: if is_valid {
                            None
                        } else {
                            Some("Reading outside valid range".to_string())
                        },
                    }
                }
            },
        }
    }

    /// Fold one reading into the probe status. `filtered` selects whether
    /// the low-pass filter applies (the sampler path) or the reading is
    /// taken as-is (injection path).
    fn apply_reading(
        shared: &mut MonitorShared,
        mut reading: TemperatureReading,
        filtered: bool,
        filter_alpha: f64,
        max_rate: f64,
    ) {
        let index = reading.channel as usize;
        if index >= shared.probes.len() {
            return;
        }

        if filtered && reading.is_valid {
            if let Some(previous) = shared.probes[index]
                .last_reading
                .as_ref()
                .filter(|r| r.is_valid)
            {
                let dt = (reading.timestamp - previous.timestamp)
                    .num_milliseconds()
                    .max(0) as f64
                    / 1000.0;
                if dt > 0.0 {
                    let rate = (reading.temperature_c - previous.temperature_c).abs() / dt;
                    let alpha = if rate > max_rate {
                        FAST_CHANGE_ALPHA
                    } else {
                        filter_alpha
                    };
                    reading.temperature_c =
                        alpha * reading.temperature_c + (1.0 - alpha) * previous.temperature_c;
                }
            }
        }

        let probe = &mut shared.probes[index];
        let is_valid = reading.is_valid;
        let temperature = reading.temperature_c;
        probe.last_update = Some(reading.timestamp);
        probe.total_readings += 1;

        if is_valid {
            probe.last_valid_update = Some(reading.timestamp);
            probe.consecutive_errors = 0;
            probe.is_connected = true;
            probe.timeout_alerted = false;

            probe.min_temp = probe.min_temp.min(temperature);
            probe.max_temp = probe.max_temp.max(temperature);

            probe.temperature_history.push_back(temperature);
            if probe.temperature_history.len() > TEMPERATURE_HISTORY_SIZE {
                probe.temperature_history.pop_front();
            }
            probe.average_temp = probe.temperature_history.iter().sum::<f64>()
                / probe.temperature_history.len() as f64;

            probe.last_reading = Some(reading);
        } else {
            probe.consecutive_errors += 1;
            probe.last_reading = Some(reading);
            let mut alert_message = None;
            if probe.consecutive_errors > DISCONNECT_ERROR_THRESHOLD {
                if probe.is_connected {
                    alert_message = Some(format!(
                        "Probe {} appears disconnected ({} consecutive errors)",
                        probe.probe.name(),
                        probe.consecutive_errors
                    ));
                }
                probe.is_connected = false;
            }
            if let Some(message) = alert_message {
                Self::trigger_alert(shared, AlertLevel::Warning, message);
            }
        }
    }

    /// Evaluate the safety envelope against the pit probe and probe
    /// liveness.
    fn check_safety(shared: &mut MonitorShared, safety: &SafetyLimits, update_interval: Duration) {
        let pit_temp = shared.probes[0]
            .last_reading
            .as_ref()
            .filter(|r| r.is_valid)
            .map(|r| r.temperature_c);

        if let Some(temp) = pit_temp {
            if temp > safety.max_pit_temp {
                if !shared.safety_shutdown {
                    shared.safety_shutdown = true;
                    let message = format!(
                        "Pit temperature {:.1} degC exceeds maximum {:.1} degC",
                        temp, safety.max_pit_temp
                    );
                    Self::trigger_alert(shared, AlertLevel::Critical, message);
                }
            } else if temp > safety.high_temp_warning {
                if !shared.high_temp_alerted {
                    shared.high_temp_alerted = true;
                    let message = format!(
                        "Pit temperature {:.1} degC approaching maximum",
                        temp
                    );
                    Self::trigger_alert(shared, AlertLevel::Warning, message);
                }
            } else {
                shared.high_temp_alerted = false;
            }

            // Rate of change over the recent history, in degC per minute.
            let history = &shared.probes[0].temperature_history;
            if history.len() >= 2 {
                let window = history.len().min(RATE_CHECK_SAMPLES);
                let recent: Vec<f64> = history.iter().rev().take(window).rev().copied().collect();
                let minutes = recent.len() as f64 * update_interval.as_secs_f64() / 60.0;
                if minutes > 0.0 {
                    let rate = (recent[recent.len() - 1] - recent[0]) / minutes;
                    if rate > safety.temp_rate_limit {
                        if !shared.rate_alerted {
                            shared.rate_alerted = true;
                            let message =
                                format!("Temperature rising rapidly: {:.1} degC/min", rate);
                            Self::trigger_alert(shared, AlertLevel::Warning, message);
                        }
                    } else {
                        shared.rate_alerted = false;
                    }
                }
            }
        }

        // Probes that stopped delivering valid samples.
        let now = Utc::now();
        for index in 0..shared.probes.len() {
            let (name, silent_for) = {
                let probe = &shared.probes[index];
                let silent = probe.last_valid_update.map(|last| {
                    (now - last).num_milliseconds().max(0) as f64 / 1000.0
                });
                (probe.probe.name(), silent)
            };

            if let Some(seconds) = silent_for {
                if seconds > safety.probe_timeout && !shared.probes[index].timeout_alerted {
                    shared.probes[index].timeout_alerted = true;
                    let message = format!(
                        "Probe {} timeout - no valid reading for {:.1} s",
                        name, seconds
                    );
                    Self::trigger_alert(shared, AlertLevel::Warning, message);
                }
            }
        }
    }

    fn trigger_alert(shared: &mut MonitorShared, level: AlertLevel, message: String) {
        warn!("ALERT [{}]: {}", level, message);
        let alert = Alert {
            level,
            message,
            timestamp: Utc::now(),
        };

        shared.recent_alerts.push_back(alert.clone());
        if shared.recent_alerts.len() > ALERT_LOG_SIZE {
            shared.recent_alerts.pop_front();
        }

        if let Some(sender) = &shared.alert_tx {
            if sender.send(alert).is_err() {
                // Engine side closed; keep the log-only path.
                shared.alert_tx = None;
            }
        }
    }

    /// Diagnostic entry: feed a temperature straight into the per-sample
    /// path, bypassing the low-pass filter. Validity is still evaluated.
    pub fn inject_reading(&self, channel: u8, temperature_c: f64) {
        let mut guard = self.shared.lock().unwrap();
        let probe = ProbeId::from_channel(channel).unwrap_or(ProbeId::Pit);
        let is_valid = guard.calculator.validate_reading(temperature_c, channel);
        let reading = TemperatureReading {
            channel,
            probe,
            temperature_c,
            voltage: 0.0,
            raw_count: 0,
            timestamp: Utc::now(),
            is_valid,
            error_message: if is_valid {
                None
            } else {
                Some("Reading outside valid range".to_string())
            },
        };
        Self::apply_reading(
            &mut guard,
            reading,
            false,
            self.filter_alpha,
            self.max_temp_change_per_second,
        );
        Self::check_safety(&mut guard, &self.safety, self.update_interval);
    }

    /// Diagnostic entry: feed an invalid sample into the per-sample path.
    pub fn inject_error(&self, channel: u8, message: &str) {
        let mut guard = self.shared.lock().unwrap();
        let probe = ProbeId::from_channel(channel).unwrap_or(ProbeId::Pit);
        let reading = TemperatureReading {
            channel,
            probe,
            temperature_c: 0.0,
            voltage: 0.0,
            raw_count: 0,
            timestamp: Utc::now(),
            is_valid: false,
            error_message: Some(message.to_string()),
        };
        Self::apply_reading(
            &mut guard,
            reading,
            false,
            self.filter_alpha,
            self.max_temp_change_per_second,
        );
        Self::check_safety(&mut guard, &self.safety, self.update_interval);
    }

    /// Current temperatures; a probe reports `None` unless its most recent
    /// sample was valid within the probe timeout.
    pub fn current_temperatures(&self) -> CurrentTemperatures {
        let guard = self.shared.lock().unwrap();
        let now = Utc::now();
        let fresh = |probe: &ProbeStatus| -> Option<f64> {
            let reading = probe.last_reading.as_ref().filter(|r| r.is_valid)?;
            let last_valid = probe.last_valid_update?;
            let age = (now - last_valid).num_milliseconds().max(0) as f64 / 1000.0;
            if age > self.safety.probe_timeout {
                return None;
            }
            Some(reading.temperature_c)
        };

        CurrentTemperatures {
            pit: fresh(&guard.probes[0]),
            meat_1: fresh(&guard.probes[1]),
            meat_2: fresh(&guard.probes[2]),
            ambient: fresh(&guard.probes[3]),
        }
    }

    /// Current pit temperature (the PID process variable).
    pub fn pit_temperature(&self) -> Option<f64> {
        self.current_temperatures().pit
    }

    /// Status copy for one probe.
    pub fn probe_status(&self, probe: ProbeId) -> ProbeStatus {
        let guard = self.shared.lock().unwrap();
        guard.probes[probe.channel() as usize].clone()
    }

    /// Status copies for all probes, in channel order.
    pub fn all_probe_status(&self) -> Vec<ProbeStatus> {
        let guard = self.shared.lock().unwrap();
        guard.probes.iter().cloned().collect()
    }

    /// Temperature trend for a probe over a query window: the average of
    /// the first three samples compared against the last three.
    pub fn temperature_trend(&self, probe: ProbeId, window: Duration) -> TemperatureTrend {
        let guard = self.shared.lock().unwrap();
        let history = &guard.probes[probe.channel() as usize].temperature_history;

        let samples_needed = ((window.as_secs_f64() / self.update_interval.as_secs_f64()) as usize)
            .max(2);
        if history.len() < samples_needed {
            return TemperatureTrend::InsufficientData;
        }

        let recent: Vec<f64> = history
            .iter()
            .rev()
            .take(samples_needed)
            .rev()
            .copied()
            .collect();
        let head = recent.len().min(3);
        let start: f64 = recent[..head].iter().sum::<f64>() / head as f64;
        let end: f64 = recent[recent.len() - head..].iter().sum::<f64>() / head as f64;

        let change = end - start;
        if change.abs() < 0.5 {
            TemperatureTrend::Stable
        } else if change > 0.0 {
            TemperatureTrend::Rising
        } else {
            TemperatureTrend::Falling
        }
    }

    /// Calibrate a probe against a known actual temperature, using its most
    /// recent valid reading as the measured value. Returns the new offset.
    pub fn calibrate_probe(&self, probe: ProbeId, actual_temperature: f64) -> ControlResult<f64> {
        let mut guard = self.shared.lock().unwrap();
        let measured = guard.probes[probe.channel() as usize]
            .last_reading
            .as_ref()
            .filter(|r| r.is_valid)
            .map(|r| r.temperature_c)
            .ok_or_else(|| {
                ControlError::StateConflict(format!(
                    "Cannot calibrate {}: no valid reading available",
                    probe.name()
                ))
            })?;

        let offset = guard
            .calculator
            .calibrate_probe(probe.channel(), measured, actual_temperature)?;
        info!(
            "Probe {} calibrated: offset = {:.2} degC",
            probe.name(),
            offset
        );
        Ok(offset)
    }

    /// Whether the monitor has latched a safety shutdown.
    pub fn is_safety_shutdown(&self) -> bool {
        self.shared.lock().unwrap().safety_shutdown
    }

    /// Clear the latched safety shutdown.
    pub fn reset_safety_shutdown(&self) {
        self.shared.lock().unwrap().safety_shutdown = false;
        info!("Safety shutdown reset");
    }

    /// Copy of the bounded recent-alert log.
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.shared.lock().unwrap().recent_alerts.iter().cloned().collect()
    }

    /// Handle into the simulated ADC, when simulating.
    pub fn simulation(&self) -> Option<SimulationHandle> {
        self.adc.simulation()
    }

    /// Which ADC backend is active.
    pub fn adc_backend_kind(&self) -> AdcBackendKind {
        self.adc.backend_kind()
    }

    /// The sampler period.
    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Release monitor resources. Idempotent.
    pub fn close(&self) {
        self.stop_monitoring();
        info!("TemperatureMonitor closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn simulated_monitor() -> TemperatureMonitor {
        let mut config = Config::default();
        config.hardware.simulate = true;
        TemperatureMonitor::new(&config.control, &config.hardware)
    }

    #[test]
    fn test_injected_reading_updates_statistics() {
        let monitor = simulated_monitor();
        monitor.inject_reading(0, 110.0);
        monitor.inject_reading(0, 112.0);

        let status = monitor.probe_status(ProbeId::Pit);
        assert!(status.is_connected);
        assert_eq!(status.total_readings, 2);
        assert_eq!(status.consecutive_errors, 0);
        assert_eq!(status.min_temp, 110.0);
        assert_eq!(status.max_temp, 112.0);
        assert!((status.average_temp - 111.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_samples_do_not_update_statistics() {
        let monitor = simulated_monitor();
        monitor.inject_reading(1, 60.0);
        monitor.inject_error(1, "i2c nack");

        let status = monitor.probe_status(ProbeId::Meat1);
        assert_eq!(status.consecutive_errors, 1);
        assert_eq!(status.min_temp, 60.0);
        assert_eq!(status.max_temp, 60.0);
        assert_eq!(status.temperature_history.len(), 1);
    }

    #[test]
    fn test_disconnect_after_six_consecutive_errors() {
        let monitor = simulated_monitor();
        monitor.inject_reading(1, 60.0);

        for _ in 0..5 {
            monitor.inject_error(1, "open circuit");
        }
        assert!(monitor.probe_status(ProbeId::Meat1).is_connected);

        monitor.inject_error(1, "open circuit");
        let status = monitor.probe_status(ProbeId::Meat1);
        assert!(!status.is_connected);
        assert!(status.consecutive_errors >= 6);

        let alerts = monitor.recent_alerts();
        assert!(alerts
            .iter()
            .any(|a| a.level == AlertLevel::Warning && a.message.contains("meat_probe_1")));
    }

    #[test]
    fn test_critical_alert_latches_shutdown() {
        let monitor = simulated_monitor();
        let (tx, rx) = mpsc::channel();
        monitor.set_alert_sender(tx);

        monitor.inject_reading(0, 405.0);
        assert!(monitor.is_safety_shutdown());

        let alert = rx.try_recv().expect("alert should be delivered");
        assert_eq!(alert.level, AlertLevel::Critical);
        assert!(alert.message.contains("405"));

        monitor.reset_safety_shutdown();
        assert!(!monitor.is_safety_shutdown());
    }

    #[test]
    fn test_high_temp_warning_below_critical() {
        let monitor = simulated_monitor();
        monitor.inject_reading(0, 360.0);

        assert!(!monitor.is_safety_shutdown());
        let alerts = monitor.recent_alerts();
        assert!(alerts
            .iter()
            .any(|a| a.level == AlertLevel::Warning && a.message.contains("approaching")));
    }

    #[test]
    fn test_current_temperatures_only_reports_valid_probes() {
        let monitor = simulated_monitor();
        monitor.inject_reading(0, 110.0);
        monitor.inject_error(1, "open circuit");

        let temps = monitor.current_temperatures();
        assert!(temps.pit.is_some());
        assert!(temps.meat_1.is_none());
        assert!(temps.meat_2.is_none());
        assert!((temps.pit.unwrap() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_rising_and_insufficient_data() {
        let monitor = simulated_monitor();
        assert_eq!(
            monitor.temperature_trend(ProbeId::Pit, Duration::from_secs(5)),
            TemperatureTrend::InsufficientData
        );

        for i in 0..10 {
            monitor.inject_reading(0, 100.0 + i as f64 * 2.0);
        }
        assert_eq!(
            monitor.temperature_trend(ProbeId::Pit, Duration::from_secs(5)),
            TemperatureTrend::Rising
        );
    }

    #[test]
    fn test_trend_stable_within_half_degree() {
        let monitor = simulated_monitor();
        for _ in 0..10 {
            monitor.inject_reading(0, 110.0);
        }
        assert_eq!(
            monitor.temperature_trend(ProbeId::Pit, Duration::from_secs(5)),
            TemperatureTrend::Stable
        );
    }

    #[test]
    fn test_calibration_requires_valid_reading() {
        let monitor = simulated_monitor();
        assert!(matches!(
            monitor.calibrate_probe(ProbeId::Pit, 100.0),
            Err(ControlError::StateConflict(_))
        ));

        monitor.inject_reading(0, 95.0);
        let offset = monitor.calibrate_probe(ProbeId::Pit, 100.0).unwrap();
        assert!((offset - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_sampler_thread_populates_probes() {
        let monitor = simulated_monitor();
        monitor.start_monitoring();
        thread::sleep(Duration::from_millis(1200));
        monitor.stop_monitoring();

        let status = monitor.probe_status(ProbeId::Pit);
        assert!(status.total_readings >= 2);
        assert!(status.is_connected);
        let temps = monitor.current_temperatures();
        assert!(temps.pit.is_some());
        // Simulation starts the pit near ambient.
        assert!(temps.pit.unwrap() > 15.0);
        assert!(temps.pit.unwrap() < 120.0);
    }
}
