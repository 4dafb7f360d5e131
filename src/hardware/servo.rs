// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Damper servo actuator
//!
//! Maps damper percentages onto servo pulse widths and shapes motion with a
//! slew-rate-limited background thread. The servo is driven through the
//! pigpio daemon; when the daemon cannot be reached the actuator falls back
//! to simulation (commands are accepted but produce no physical motion).

use log::{debug, error, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::hardware::{PigpioConfig, ServoConfig};
use crate::hardware::pigpio::PigpioClient;

/// Motion thread tick: 20 Hz.
const MOTION_TICK: Duration = Duration::from_millis(50);
/// Seconds between daemon health checks.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
/// Connection attempts before falling back to simulation.
const MAX_CONNECTION_ATTEMPTS: u32 = 10;
/// Delay between connection attempts.
const CONNECTION_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Consecutive write failures that trigger a full reconnect.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Convert a damper percentage (0-100) to a pulse width in microseconds.
pub fn percent_to_pulse_width(config: &ServoConfig, percent: f64) -> u32 {
    let percent = percent.clamp(0.0, 100.0);
    let span = (config.max_pulse_width - config.min_pulse_width) as f64;
    (config.min_pulse_width as f64 + (percent / 100.0) * span).round() as u32
}

/// Convert a pulse width in microseconds back to a damper percentage.
pub fn pulse_width_to_percent(config: &ServoConfig, pulse_width: u32) -> f64 {
    if pulse_width <= config.min_pulse_width {
        return 0.0;
    }
    if pulse_width >= config.max_pulse_width {
        return 100.0;
    }
    let span = (config.max_pulse_width - config.min_pulse_width) as f64;
    ((pulse_width - config.min_pulse_width) as f64 / span) * 100.0
}

/// Queryable servo health and configuration snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ServoDiagnostics {
    pub connected: bool,
    pub simulate_mode: bool,
    pub pigpio_host: String,
    pub pigpio_port: u16,
    pub connection_attempts: u32,
    pub connection_lost_count: u32,
    pub command_success_count: u64,
    pub command_failure_count: u64,
    pub total_commands: u64,
    pub success_rate: f64,
    pub seconds_since_last_success: Option<f64>,
    pub current_position_percent: f64,
    pub target_position_percent: f64,
    pub last_pulse_width: u32,
    pub gpio_pin: u8,
    pub min_pulse_width: u32,
    pub max_pulse_width: u32,
    pub pwm_frequency: u16,
    pub max_speed: f64,
    pub position_tolerance: f64,
    pub pigpio_version: Option<u32>,
}

struct ServoShared {
    current_position: f64,
    target_position: f64,
    last_pulse_width: u32,
    client: Option<PigpioClient>,
    simulate: bool,
    connection_attempts: u32,
    consecutive_failures: u32,
    connection_lost_count: u32,
    command_success_count: u64,
    command_failure_count: u64,
    last_successful_command: Option<Instant>,
    last_health_check: Instant,
    pigpio_version: Option<u32>,
}

/// Controls the damper servo through the pigpio daemon.
pub struct ServoController {
    shared: Arc<Mutex<ServoShared>>,
    config: ServoConfig,
    pigpio: PigpioConfig,
    gpio_pin: u8,
    running: Arc<AtomicBool>,
    motion_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ServoController {
    /// Connect to the daemon (or fall back to simulation) and start the
    /// motion thread.
    pub fn new(gpio_pin: u8, config: &ServoConfig, pigpio: &PigpioConfig, simulate: bool) -> Self {
        let mut shared = ServoShared {
            current_position: 0.0,
            target_position: 0.0,
            last_pulse_width: 0,
            client: None,
            simulate,
            connection_attempts: 0,
            consecutive_failures: 0,
            connection_lost_count: 0,
            command_success_count: 0,
            command_failure_count: 0,
            last_successful_command: None,
            last_health_check: Instant::now(),
            pigpio_version: None,
        };

        if !simulate {
            Self::initialize_connection(&mut shared, gpio_pin, config, pigpio);
        }

        let controller = Self {
            shared: Arc::new(Mutex::new(shared)),
            config: config.clone(),
            pigpio: pigpio.clone(),
            gpio_pin,
            running: Arc::new(AtomicBool::new(true)),
            motion_thread: Mutex::new(None),
        };

        controller.spawn_motion_thread();

        info!(
            "ServoController initialized on GPIO {} (simulate={})",
            gpio_pin,
            controller.is_simulated()
        );
        info!(
            "Servo config: min={} us, max={} us, speed={} %/s, tolerance={} %",
            config.min_pulse_width, config.max_pulse_width, config.max_speed,
            config.position_tolerance
        );

        controller
    }

    /// Connect with retry; on exhaustion switch the actuator to simulation.
    fn initialize_connection(
        shared: &mut ServoShared,
        gpio_pin: u8,
        config: &ServoConfig,
        pigpio: &PigpioConfig,
    ) {
        while shared.connection_attempts < MAX_CONNECTION_ATTEMPTS {
            shared.connection_attempts += 1;
            info!(
                "Attempting pigpio connection {}/{} to {}:{}",
                shared.connection_attempts, MAX_CONNECTION_ATTEMPTS, pigpio.host, pigpio.port
            );

            match Self::open_session(gpio_pin, config, pigpio) {
                Ok((client, version)) => {
                    info!(
                        "Connected to pigpio daemon version {} on attempt {}",
                        version, shared.connection_attempts
                    );
                    shared.client = Some(client);
                    shared.pigpio_version = Some(version);
                    shared.consecutive_failures = 0;
                    shared.last_successful_command = Some(Instant::now());
                    return;
                }
                Err(err) => {
                    warn!(
                        "pigpio connection attempt {} failed: {}",
                        shared.connection_attempts, err
                    );
                    if shared.connection_attempts < MAX_CONNECTION_ATTEMPTS {
                        thread::sleep(CONNECTION_RETRY_DELAY);
                    }
                }
            }
        }

        error!(
            "Failed to connect to pigpio after {} attempts, falling back to simulation",
            MAX_CONNECTION_ATTEMPTS
        );
        shared.simulate = true;
    }

    /// Open a daemon session and run the control self-test: set the center
    /// pulse, optionally read it back, return to 0.
    fn open_session(
        gpio_pin: u8,
        config: &ServoConfig,
        pigpio: &PigpioConfig,
    ) -> std::io::Result<(PigpioClient, u32)> {
        let mut client = PigpioClient::connect(&pigpio.host, pigpio.port)?;
        let version = client.version()?;

        client.set_servo_pulsewidth(gpio_pin, config.center_pulse_width)?;
        thread::sleep(Duration::from_millis(100));
        match client.get_servo_pulsewidth(gpio_pin) {
            Ok(read_back) => debug!(
                "Servo self-test: set {} us, read {} us",
                config.center_pulse_width, read_back
            ),
            Err(_) => debug!("Cannot read servo pulse width back (normal for some setups)"),
        }
        client.set_servo_pulsewidth(gpio_pin, 0)?;

        Ok((client, version))
    }

    fn spawn_motion_thread(&self) {
        let shared = Arc::clone(&self.shared);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();
        let pigpio = self.pigpio.clone();
        let gpio_pin = self.gpio_pin;

        let handle = thread::Builder::new()
            .name("servo-motion".to_string())
            .spawn(move || {
                Self::motion_loop(shared, running, config, pigpio, gpio_pin);
            })
            .expect("failed to spawn servo motion thread");

        *self.motion_thread.lock().unwrap() = Some(handle);
    }

    /// Background thread shaping motion toward the target position.
    fn motion_loop(
        shared: Arc<Mutex<ServoShared>>,
        running: Arc<AtomicBool>,
        config: ServoConfig,
        pigpio: PigpioConfig,
        gpio_pin: u8,
    ) {
        // Percent-points of travel per tick at the configured speed.
        let max_step = config.max_speed * MOTION_TICK.as_secs_f64();

        while running.load(Ordering::Relaxed) {
            {
                let mut guard = shared.lock().unwrap();
                let current = guard.current_position;
                let target = guard.target_position;

                if (current - target).abs() > config.position_tolerance {
                    let step = max_step.min((target - current).abs());
                    let new_position = if target > current {
                        current + step
                    } else {
                        current - step
                    };

                    let pulse_width = percent_to_pulse_width(&config, new_position);
                    if Self::write_pulse(&mut guard, gpio_pin, pulse_width, &config, &pigpio) {
                        guard.current_position = new_position;
                        debug!(
                            "Servo moved to {:.1} % (pulse: {} us)",
                            new_position, pulse_width
                        );
                    }
                }

                Self::health_check(&mut guard, gpio_pin, &config, &pigpio);
            }

            thread::sleep(MOTION_TICK);
        }
    }

    /// Write one pulse width, accounting success/failure and reconnecting
    /// after repeated failures.
    fn write_pulse(
        shared: &mut ServoShared,
        gpio_pin: u8,
        pulse_width: u32,
        config: &ServoConfig,
        pigpio: &PigpioConfig,
    ) -> bool {
        if shared.simulate {
            shared.last_pulse_width = pulse_width;
            shared.command_success_count += 1;
            shared.last_successful_command = Some(Instant::now());
            return true;
        }

        let result = match shared.client.as_mut() {
            Some(client) => client.set_servo_pulsewidth(gpio_pin, pulse_width),
            None => Err(std::io::Error::other("no pigpio session")),
        };

        match result {
            Ok(()) => {
                shared.last_pulse_width = pulse_width;
                shared.command_success_count += 1;
                shared.consecutive_failures = 0;
                shared.last_successful_command = Some(Instant::now());
                true
            }
            Err(err) => {
                error!("Failed to set servo pulse width: {}", err);
                shared.command_failure_count += 1;
                shared.consecutive_failures += 1;
                shared.connection_lost_count += 1;

                if shared.consecutive_failures > MAX_CONSECUTIVE_FAILURES {
                    warn!("Multiple servo command failures, reconnecting to pigpio");
                    shared.client = None;
                    shared.consecutive_failures = 0;
                    shared.connection_attempts = 0;
                    Self::initialize_connection(shared, gpio_pin, config, pigpio);
                }
                false
            }
        }
    }

    /// Periodic daemon ping; reconnect when it fails.
    fn health_check(
        shared: &mut ServoShared,
        gpio_pin: u8,
        config: &ServoConfig,
        pigpio: &PigpioConfig,
    ) {
        if shared.last_health_check.elapsed() < HEALTH_CHECK_INTERVAL {
            return;
        }
        shared.last_health_check = Instant::now();

        if shared.simulate {
            return;
        }

        let ping = match shared.client.as_mut() {
            Some(client) => client.version(),
            None => Err(std::io::Error::other("no pigpio session")),
        };

        match ping {
            Ok(version) => {
                debug!("Health check: pigpio version {}", version);
                shared.pigpio_version = Some(version);
                let total = shared.command_success_count + shared.command_failure_count;
                if total > 0 {
                    debug!(
                        "Health check: command success rate {:.1} % ({}/{})",
                        shared.command_success_count as f64 / total as f64 * 100.0,
                        shared.command_success_count,
                        total
                    );
                }
            }
            Err(err) => {
                warn!("Health check failed: {}, reconnecting", err);
                shared.client = None;
                shared.connection_attempts = 0;
                Self::initialize_connection(shared, gpio_pin, config, pigpio);
            }
        }
    }

    /// Set the target damper position as a percentage (clamped to 0-100).
    pub fn set_position_percent(&self, percent: f64) {
        let percent = percent.clamp(0.0, 100.0);
        let mut guard = self.shared.lock().unwrap();
        guard.target_position = percent;
        debug!("Servo target position set to {} %", percent);
    }

    /// Current (slew-limited) position as a percentage.
    pub fn position_percent(&self) -> f64 {
        self.shared.lock().unwrap().current_position
    }

    /// Target position as a percentage.
    pub fn target_position_percent(&self) -> f64 {
        self.shared.lock().unwrap().target_position
    }

    /// Whether the servo is within tolerance of its target.
    pub fn is_at_target(&self) -> bool {
        let guard = self.shared.lock().unwrap();
        (guard.current_position - guard.target_position).abs() <= self.config.position_tolerance
    }

    /// Move the damper to the center position (50 %).
    pub fn center(&self) {
        self.set_position_percent(50.0);
    }

    /// Stop the PWM signal; the servo loses holding torque.
    pub fn stop_servo(&self) {
        let mut guard = self.shared.lock().unwrap();
        if !guard.simulate {
            if let Some(client) = guard.client.as_mut() {
                if let Err(err) = client.set_servo_pulsewidth(self.gpio_pin, 0) {
                    warn!("Failed to stop servo: {}", err);
                }
            }
        }
        guard.last_pulse_width = 0;
        debug!("Servo PWM stopped");
    }

    /// Last commanded pulse width in microseconds.
    pub fn pulse_width(&self) -> u32 {
        self.shared.lock().unwrap().last_pulse_width
    }

    /// Whether the actuator is running without physical hardware.
    pub fn is_simulated(&self) -> bool {
        self.shared.lock().unwrap().simulate
    }

    /// Full diagnostics snapshot.
    pub fn diagnostics(&self) -> ServoDiagnostics {
        let guard = self.shared.lock().unwrap();
        let total = guard.command_success_count + guard.command_failure_count;
        ServoDiagnostics {
            connected: !guard.simulate && guard.client.is_some(),
            simulate_mode: guard.simulate,
            pigpio_host: self.pigpio.host.clone(),
            pigpio_port: self.pigpio.port,
            connection_attempts: guard.connection_attempts,
            connection_lost_count: guard.connection_lost_count,
            command_success_count: guard.command_success_count,
            command_failure_count: guard.command_failure_count,
            total_commands: total,
            success_rate: if total > 0 {
                guard.command_success_count as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            seconds_since_last_success: guard
                .last_successful_command
                .map(|t| t.elapsed().as_secs_f64()),
            current_position_percent: guard.current_position,
            target_position_percent: guard.target_position,
            last_pulse_width: guard.last_pulse_width,
            gpio_pin: self.gpio_pin,
            min_pulse_width: self.config.min_pulse_width,
            max_pulse_width: self.config.max_pulse_width,
            pwm_frequency: self.config.pwm_frequency,
            max_speed: self.config.max_speed,
            position_tolerance: self.config.position_tolerance,
            pigpio_version: guard.pigpio_version,
        }
    }

    /// Halt the motion thread, stop the servo, and release the daemon
    /// session. Idempotent.
    pub fn close(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.motion_thread.lock().unwrap().take() {
            let deadline = Instant::now() + Duration::from_secs(1);
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("Servo motion thread did not stop within 1 s");
            }
        }

        self.stop_servo();
        self.shared.lock().unwrap().client = None;
        info!("ServoController closed");
    }
}

impl Drop for ServoController {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servo_config() -> ServoConfig {
        ServoConfig::default()
    }

    fn simulated_servo() -> ServoController {
        ServoController::new(18, &servo_config(), &PigpioConfig::default(), true)
    }

    #[test]
    fn test_percent_to_pulse_width_endpoints() {
        let config = servo_config();
        assert_eq!(percent_to_pulse_width(&config, 0.0), 1033);
        assert_eq!(percent_to_pulse_width(&config, 100.0), 1833);
        assert_eq!(percent_to_pulse_width(&config, 50.0), 1433);
        // Clamped outside the envelope.
        assert_eq!(percent_to_pulse_width(&config, -20.0), 1033);
        assert_eq!(percent_to_pulse_width(&config, 140.0), 1833);
    }

    #[test]
    fn test_pulse_width_percent_round_trip() {
        let config = servo_config();
        for percent in [0.0, 25.0, 50.0, 75.0, 100.0] {
            let pulse = percent_to_pulse_width(&config, percent);
            let back = pulse_width_to_percent(&config, pulse);
            assert!(
                (back - percent).abs() < 0.2,
                "round trip failed for {percent} %: got {back}"
            );
        }
    }

    #[test]
    fn test_slew_limits_motion() {
        let servo = simulated_servo();
        servo.set_position_percent(100.0);

        // 30 %/s: after ~0.5 s the servo must be well short of the target
        // but clearly moving.
        thread::sleep(Duration::from_millis(500));
        let position = servo.position_percent();
        assert!(position > 5.0, "servo did not move: {position}");
        assert!(position < 30.0, "servo moved too fast: {position}");
        servo.close();
    }

    #[test]
    fn test_target_clamped_to_envelope() {
        let servo = simulated_servo();
        servo.set_position_percent(250.0);
        assert_eq!(servo.target_position_percent(), 100.0);
        servo.set_position_percent(-3.0);
        assert_eq!(servo.target_position_percent(), 0.0);
        servo.close();
    }

    #[test]
    fn test_stop_clears_pulse_cache() {
        let servo = simulated_servo();
        servo.set_position_percent(60.0);
        thread::sleep(Duration::from_millis(200));
        assert!(servo.pulse_width() > 0);
        servo.stop_servo();
        assert_eq!(servo.pulse_width(), 0);
        servo.close();
    }

    #[test]
    fn test_close_is_idempotent() {
        let servo = simulated_servo();
        servo.close();
        servo.close();
        assert!(servo.is_simulated());
    }

    #[test]
    fn test_diagnostics_reflect_simulation() {
        let servo = simulated_servo();
        servo.set_position_percent(40.0);
        thread::sleep(Duration::from_millis(200));
        let diagnostics = servo.diagnostics();
        assert!(diagnostics.simulate_mode);
        assert!(!diagnostics.connected);
        assert!(diagnostics.command_success_count > 0);
        assert_eq!(diagnostics.success_rate, 100.0);
        assert_eq!(diagnostics.gpio_pin, 18);
        servo.close();
    }
}
