// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Control system configuration
//!
//! PID gains, limits and tuning presets, safety limits, and the control
//! loop timing parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PID controller gain values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PidGains {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
}

impl PidGains {
    pub fn as_tuple(&self) -> (f64, f64, f64) {
        (self.kp, self.ki, self.kd)
    }
}

/// PID controller limits and constraints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PidLimits {
    /// Minimum output value (0 % damper)
    #[serde(default = "default_output_min")]
    pub output_min: f64,
    /// Maximum output value (100 % damper)
    #[serde(default = "default_output_max")]
    pub output_max: f64,
    /// Integral windup limit (negative side)
    #[serde(default = "default_integral_min")]
    pub integral_min: f64,
    /// Integral windup limit (positive side)
    #[serde(default = "default_integral_max")]
    pub integral_max: f64,
    /// Low-pass filter coefficient for the derivative term, in [0, 1]
    #[serde(default = "default_derivative_filter")]
    pub derivative_filter: f64,
}

fn default_output_min() -> f64 {
    0.0
}

fn default_output_max() -> f64 {
    100.0
}

fn default_integral_min() -> f64 {
    -50.0
}

fn default_integral_max() -> f64 {
    50.0
}

fn default_derivative_filter() -> f64 {
    0.1
}

impl Default for PidLimits {
    fn default() -> Self {
        Self {
            output_min: default_output_min(),
            output_max: default_output_max(),
            integral_min: default_integral_min(),
            integral_max: default_integral_max(),
            derivative_filter: default_derivative_filter(),
        }
    }
}

/// Complete PID configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PidConfig {
    /// Controller gains
    pub gains: PidGains,
    /// Output and integral limits
    #[serde(default)]
    pub limits: PidLimits,
    /// Minimum time between PID computations in seconds
    #[serde(default = "default_sample_time")]
    pub sample_time: f64,
}

fn default_sample_time() -> f64 {
    1.0
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            gains: PidGains {
                kp: 2.0,
                ki: 0.1,
                kd: 1.0,
            },
            limits: PidLimits::default(),
            sample_time: default_sample_time(),
        }
    }
}

/// Predefined PID tuning presets for different cooking scenarios.
pub const PID_PRESET_NAMES: [&str; 5] = [
    "conservative",
    "aggressive",
    "precise",
    "slow_cook",
    "high_temp",
];

/// Look up a named PID tuning preset.
pub fn pid_preset(name: &str) -> Option<PidConfig> {
    let preset = match name {
        "conservative" => PidConfig {
            gains: PidGains {
                kp: 2.0,
                ki: 0.1,
                kd: 1.0,
            },
            limits: PidLimits {
                output_min: 0.0,
                output_max: 100.0,
                integral_min: -20.0,
                integral_max: 20.0,
                derivative_filter: 0.2,
            },
            sample_time: 2.0,
        },
        "aggressive" => PidConfig {
            gains: PidGains {
                kp: 4.0,
                ki: 0.3,
                kd: 2.0,
            },
            limits: PidLimits {
                output_min: 0.0,
                output_max: 100.0,
                integral_min: -30.0,
                integral_max: 30.0,
                derivative_filter: 0.1,
            },
            sample_time: 1.0,
        },
        "precise" => PidConfig {
            gains: PidGains {
                kp: 3.0,
                ki: 0.2,
                kd: 1.5,
            },
            limits: PidLimits {
                output_min: 0.0,
                output_max: 100.0,
                integral_min: -25.0,
                integral_max: 25.0,
                derivative_filter: 0.15,
            },
            sample_time: 1.0,
        },
        // Limited damper range for slow cooking
        "slow_cook" => PidConfig {
            gains: PidGains {
                kp: 1.5,
                ki: 0.05,
                kd: 0.8,
            },
            limits: PidLimits {
                output_min: 0.0,
                output_max: 80.0,
                integral_min: -15.0,
                integral_max: 15.0,
                derivative_filter: 0.3,
            },
            sample_time: 3.0,
        },
        "high_temp" => PidConfig {
            gains: PidGains {
                kp: 5.0,
                ki: 0.4,
                kd: 2.5,
            },
            limits: PidLimits {
                output_min: 0.0,
                output_max: 100.0,
                integral_min: -40.0,
                integral_max: 40.0,
                derivative_filter: 0.08,
            },
            sample_time: 0.5,
        },
        _ => return None,
    };
    Some(preset)
}

/// Safety limits for temperature control
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SafetyLimits {
    /// Maximum pit temperature before emergency shutdown, in degrees Celsius
    #[serde(default = "default_max_pit_temp")]
    pub max_pit_temp: f64,
    /// Minimum accepted pit setpoint, in degrees Celsius
    #[serde(default = "default_min_pit_temp")]
    pub min_pit_temp: f64,
    /// Maximum accepted meat setpoint, in degrees Celsius
    #[serde(default = "default_max_meat_temp")]
    pub max_meat_temp: f64,
    /// Minimum accepted meat setpoint, in degrees Celsius
    #[serde(default = "default_min_meat_temp")]
    pub min_meat_temp: f64,
    /// Maximum pit temperature rise in degrees Celsius per minute
    #[serde(default = "default_temp_rate_limit")]
    pub temp_rate_limit: f64,
    /// Seconds without a valid reading before a probe is considered silent
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: f64,
    /// Pit temperature warning threshold in degrees Celsius
    #[serde(default = "default_high_temp_warning")]
    pub high_temp_warning: f64,
}

fn default_max_pit_temp() -> f64 {
    400.0
}

fn default_min_pit_temp() -> f64 {
    50.0
}

fn default_max_meat_temp() -> f64 {
    100.0
}

fn default_min_meat_temp() -> f64 {
    0.0
}

fn default_temp_rate_limit() -> f64 {
    10.0
}

fn default_probe_timeout() -> f64 {
    30.0
}

fn default_high_temp_warning() -> f64 {
    350.0
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_pit_temp: default_max_pit_temp(),
            min_pit_temp: default_min_pit_temp(),
            max_meat_temp: default_max_meat_temp(),
            min_meat_temp: default_min_meat_temp(),
            temp_rate_limit: default_temp_rate_limit(),
            probe_timeout: default_probe_timeout(),
            high_temp_warning: default_high_temp_warning(),
        }
    }
}

/// Complete control system configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlConfig {
    /// PID controller configuration
    #[serde(default)]
    pub pid: PidConfig,

    /// Safety limits
    #[serde(default)]
    pub safety: SafetyLimits,

    /// Seconds between control-thread passes (snapshot refresh)
    #[serde(default = "default_main_loop_interval")]
    pub main_loop_interval: f64,

    /// Seconds between PID computations
    #[serde(default = "default_control_loop_interval")]
    pub control_loop_interval: f64,

    /// Seconds between telemetry records
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval: f64,

    /// Seconds between temperature monitor sampling passes
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval: f64,

    /// Low-pass filter coefficient applied to valid temperature samples
    #[serde(default = "default_filter_alpha")]
    pub filter_alpha: f64,

    /// Above this inter-sample rate (degrees Celsius per second) the filter
    /// coefficient drops to 0.3 for the update
    #[serde(default = "default_max_temp_change_per_second")]
    pub max_temp_change_per_second: f64,

    /// Maximum number of telemetry records retained in memory
    #[serde(default = "default_max_telemetry_points")]
    pub max_telemetry_points: usize,

    /// Directory receiving CSV telemetry files
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,

    /// Directory holding saved PID preset files
    #[serde(default = "default_presets_dir")]
    pub presets_dir: String,
}

fn default_main_loop_interval() -> f64 {
    0.25
}

fn default_control_loop_interval() -> f64 {
    1.0
}

fn default_telemetry_interval() -> f64 {
    5.0
}

fn default_monitor_interval() -> f64 {
    0.5
}

fn default_filter_alpha() -> f64 {
    0.7
}

fn default_max_temp_change_per_second() -> f64 {
    10.0
}

fn default_max_telemetry_points() -> usize {
    7200
}

fn default_logs_dir() -> String {
    "logs".to_string()
}

fn default_presets_dir() -> String {
    "pid_presets".to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            pid: PidConfig::default(),
            safety: SafetyLimits::default(),
            main_loop_interval: default_main_loop_interval(),
            control_loop_interval: default_control_loop_interval(),
            telemetry_interval: default_telemetry_interval(),
            monitor_interval: default_monitor_interval(),
            filter_alpha: default_filter_alpha(),
            max_temp_change_per_second: default_max_temp_change_per_second(),
            max_telemetry_points: default_max_telemetry_points(),
            logs_dir: default_logs_dir(),
            presets_dir: default_presets_dir(),
        }
    }
}
