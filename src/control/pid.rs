// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Discrete PID regulator for the damper position
//!
//! Single-input single-output PID with integral anti-windup, a low-pass
//! filtered derivative, enforced sample time, and bumpless manual-to-
//! automatic transfer. The regulator is internally locked so `compute` and
//! `get_state` are atomic with respect to gain and setpoint changes.

use log::{debug, info};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::control::{PidConfig, PidGains, PidLimits};
use crate::control::error::{ControlError, ControlResult};

/// A setpoint change larger than this resets the integral term.
const SETPOINT_RESET_THRESHOLD: f64 = 5.0;
/// Recent-error ring size for derivative filtering.
const MAX_ERROR_HISTORY: usize = 5;

/// Current state of the PID regulator.
#[derive(Debug, Clone, Default)]
pub struct PidState {
    pub setpoint: f64,
    pub process_variable: f64,
    pub output: f64,
    pub error: f64,
    pub integral: f64,
    pub derivative: f64,
    pub last_error: f64,
}

/// Performance counters for the regulator.
#[derive(Debug, Clone, Serialize)]
pub struct PidPerformanceStats {
    pub compute_count: u64,
    pub total_compute_time_ms: f64,
    pub avg_compute_time_ms: f64,
    pub sample_time: f64,
    pub auto_mode: bool,
    pub enabled: bool,
}

/// Information useful for manual tuning.
#[derive(Debug, Clone, Serialize)]
pub struct PidTuningInfo {
    pub current_error: f64,
    pub error_trend: String,
    pub proportional_contribution: f64,
    pub integral_contribution: f64,
    pub derivative_contribution: f64,
    pub output_percentage: f64,
    pub at_output_limit: bool,
}

struct PidInner {
    gains: PidGains,
    limits: PidLimits,
    sample_time: f64,
    auto_mode: bool,
    enabled: bool,
    state: PidState,
    last_compute_time: Option<Instant>,
    error_history: VecDeque<f64>,
    compute_count: u64,
    total_compute_time: Duration,
}

/// Thread-safe PID regulator.
pub struct PidController {
    inner: Mutex<PidInner>,
}

impl PidController {
    pub fn new(config: &PidConfig) -> Self {
        info!(
            "PID controller initialized with gains Kp={}, Ki={}, Kd={}",
            config.gains.kp, config.gains.ki, config.gains.kd
        );
        Self {
            inner: Mutex::new(PidInner {
                gains: config.gains,
                limits: config.limits,
                sample_time: config.sample_time,
                auto_mode: false,
                enabled: true,
                state: PidState::default(),
                last_compute_time: None,
                error_history: VecDeque::with_capacity(MAX_ERROR_HISTORY),
                compute_count: 0,
                total_compute_time: Duration::ZERO,
            }),
        }
    }

    /// Update the controller gains.
    pub fn set_gains(&self, kp: f64, ki: f64, kd: f64) {
        let mut inner = self.inner.lock().unwrap();
        inner.gains = PidGains { kp, ki, kd };
        info!("PID gains updated: Kp={}, Ki={}, Kd={}", kp, ki, kd);
    }

    /// Current gains as `(kp, ki, kd)`.
    pub fn gains(&self) -> (f64, f64, f64) {
        self.inner.lock().unwrap().gains.as_tuple()
    }

    /// Set the desired setpoint. A change larger than 5 degrees resets the
    /// integral term so the regulator re-seeds without windup carry.
    pub fn set_setpoint(&self, setpoint: f64) {
        let mut inner = self.inner.lock().unwrap();
        let old_setpoint = inner.state.setpoint;
        inner.state.setpoint = setpoint;

        if (setpoint - old_setpoint).abs() > SETPOINT_RESET_THRESHOLD {
            inner.state.integral = 0.0;
            info!("Integral term reset due to large setpoint change");
        }

        debug!("Setpoint changed from {:.1} to {:.1}", old_setpoint, setpoint);
    }

    pub fn setpoint(&self) -> f64 {
        self.inner.lock().unwrap().state.setpoint
    }

    /// Enable or disable automatic control. The manual-to-automatic
    /// transition is bumpless: the integral is seeded from the current
    /// output and the derivative history is cleared, so the next tick
    /// produces approximately the same actuator command.
    pub fn set_auto_mode(&self, auto: bool) {
        let mut inner = self.inner.lock().unwrap();
        if auto != inner.auto_mode {
            inner.auto_mode = auto;
            if auto {
                Self::initialize_auto_mode(&mut inner);
                info!("PID controller switched to AUTO mode");
            } else {
                info!("PID controller switched to MANUAL mode");
            }
        }
    }

    pub fn is_auto(&self) -> bool {
        self.inner.lock().unwrap().auto_mode
    }

    fn initialize_auto_mode(inner: &mut PidInner) {
        inner.state.last_error = 0.0;
        inner.state.derivative = 0.0;
        inner.state.integral = inner
            .state
            .output
            .clamp(inner.limits.integral_min, inner.limits.integral_max);
        inner.error_history.clear();
        // Re-latch timing so the first automatic tick returns the previous
        // output instead of computing against a stale interval.
        inner.last_compute_time = None;
    }

    /// Record the actuator command applied while in manual mode, so the
    /// bumpless transfer starts from the true output.
    pub fn set_manual_output(&self, output: f64) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.auto_mode {
            inner.state.output = output.clamp(inner.limits.output_min, inner.limits.output_max);
        }
    }

    /// Compute the PID output for the current process variable, deriving
    /// the timestep from the wall clock.
    pub fn compute(&self, process_variable: f64) -> f64 {
        self.compute_with_dt(process_variable, None)
    }

    /// Compute the PID output with an explicit timestep (used by tests).
    pub fn compute_with_dt(&self, process_variable: f64, dt_override: Option<f64>) -> f64 {
        let started = Instant::now();
        let mut inner = self.inner.lock().unwrap();

        if !inner.enabled || !inner.auto_mode {
            return inner.state.output;
        }

        let now = Instant::now();
        let dt = match dt_override {
            Some(dt) => dt,
            None => match inner.last_compute_time {
                None => {
                    // First call after enable: latch the clock, hold output.
                    inner.last_compute_time = Some(now);
                    return inner.state.output;
                }
                Some(last) => now.duration_since(last).as_secs_f64(),
            },
        };

        if dt < inner.sample_time {
            return inner.state.output;
        }
        inner.last_compute_time = Some(now);

        inner.state.process_variable = process_variable;
        let error = inner.state.setpoint - process_variable;
        inner.state.error = error;

        let proportional = inner.gains.kp * error;

        inner.state.integral += inner.gains.ki * error * dt;
        inner.state.integral = inner
            .state
            .integral
            .clamp(inner.limits.integral_min, inner.limits.integral_max);
        let integral = inner.state.integral;

        let derivative = if dt > 0.0 {
            let derivative_raw = (error - inner.state.last_error) / dt;
            let filtered = if inner.error_history.is_empty() {
                derivative_raw
            } else {
                inner.limits.derivative_filter * derivative_raw
                    + (1.0 - inner.limits.derivative_filter) * inner.state.derivative
            };
            inner.state.derivative = filtered;
            inner.gains.kd * filtered
        } else {
            0.0
        };

        // Bias toward mid-travel so zero error yields a mid damper.
        let feedforward = (inner.limits.output_max + inner.limits.output_min) / 2.0;
        let output = (feedforward + proportional + integral + derivative)
            .clamp(inner.limits.output_min, inner.limits.output_max);

        inner.state.output = output;
        inner.state.last_error = error;

        inner.error_history.push_back(error);
        if inner.error_history.len() > MAX_ERROR_HISTORY {
            inner.error_history.pop_front();
        }

        inner.compute_count += 1;
        inner.total_compute_time += started.elapsed();

        debug!(
            "PID: SP={:.1}, PV={:.1}, E={:.2}, P={:.2}, I={:.2}, D={:.2}, OUT={:.1}",
            inner.state.setpoint, process_variable, error, proportional, integral, derivative,
            output
        );

        output
    }

    /// Reset the regulator state: integral, derivative, errors, history,
    /// and timing.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state.integral = 0.0;
        inner.state.derivative = 0.0;
        inner.state.last_error = 0.0;
        inner.state.error = 0.0;
        inner.error_history.clear();
        inner.last_compute_time = None;
        info!("PID controller reset");
    }

    /// Set the output saturation limits.
    pub fn set_output_limits(&self, min_output: f64, max_output: f64) -> ControlResult<()> {
        if min_output >= max_output {
            return Err(ControlError::OutOfRange(format!(
                "output_min ({min_output}) must be less than output_max ({max_output})"
            )));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.limits.output_min = min_output;
        inner.limits.output_max = max_output;
        inner.state.output = inner.state.output.clamp(min_output, max_output);
        info!("Output limits set to [{}, {}]", min_output, max_output);
        Ok(())
    }

    /// Set the integral windup limits.
    pub fn set_integral_limits(&self, min_integral: f64, max_integral: f64) -> ControlResult<()> {
        if min_integral >= max_integral {
            return Err(ControlError::OutOfRange(format!(
                "integral_min ({min_integral}) must be less than integral_max ({max_integral})"
            )));
        }
        let mut inner = self.inner.lock().unwrap();
        inner.limits.integral_min = min_integral;
        inner.limits.integral_max = max_integral;
        inner.state.integral = inner.state.integral.clamp(min_integral, max_integral);
        info!("Integral limits set to [{}, {}]", min_integral, max_integral);
        Ok(())
    }

    /// Enable the regulator. Re-enabling re-initializes for bumpless
    /// operation.
    pub fn enable(&self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.enabled {
            inner.enabled = true;
            Self::initialize_auto_mode(&mut inner);
            info!("PID controller enabled");
        }
    }

    /// Disable the regulator; `compute` returns the last output unchanged.
    pub fn disable(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.enabled = false;
        info!("PID controller disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().unwrap().enabled
    }

    /// Copy of the current regulator state.
    pub fn get_state(&self) -> PidState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Performance counters.
    pub fn performance_stats(&self) -> PidPerformanceStats {
        let inner = self.inner.lock().unwrap();
        let total_ms = inner.total_compute_time.as_secs_f64() * 1000.0;
        PidPerformanceStats {
            compute_count: inner.compute_count,
            total_compute_time_ms: total_ms,
            avg_compute_time_ms: if inner.compute_count > 0 {
                total_ms / inner.compute_count as f64
            } else {
                0.0
            },
            sample_time: inner.sample_time,
            auto_mode: inner.auto_mode,
            enabled: inner.enabled,
        }
    }

    /// Term contributions and saturation state for manual tuning.
    pub fn tuning_info(&self) -> PidTuningInfo {
        let inner = self.inner.lock().unwrap();
        let span = inner.limits.output_max - inner.limits.output_min;

        let error_trend = {
            let mut recent = inner.error_history.iter().rev();
            match (recent.next(), recent.next()) {
                (Some(last), Some(previous)) => {
                    let delta = last.abs() - previous.abs();
                    if delta.abs() < 0.01 {
                        "stable"
                    } else if delta > 0.0 {
                        "increasing"
                    } else {
                        "decreasing"
                    }
                }
                _ => "stable",
            }
        };

        PidTuningInfo {
            current_error: inner.state.error,
            error_trend: error_trend.to_string(),
            proportional_contribution: inner.gains.kp * inner.state.error,
            integral_contribution: inner.state.integral,
            derivative_contribution: inner.gains.kd * inner.state.derivative,
            output_percentage: if span > 0.0 {
                (inner.state.output - inner.limits.output_min) / span * 100.0
            } else {
                0.0
            },
            at_output_limit: inner.state.output == inner.limits.output_min
                || inner.state.output == inner.limits.output_max,
        }
    }
}
