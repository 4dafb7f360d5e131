// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Hardware configuration for the pit controller
//!
//! This module provides configuration structures for the hardware layer:
//! GPIO pin assignments, the ADS1115 ADC, the damper servo, the pigpio
//! daemon connection, and the four thermistor probes with their channel
//! bindings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Logical identity of a temperature probe, statically bound to an ADC channel.
///
/// The pit probe is the sole PID process variable; the remaining probes are
/// informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeId {
    /// Cooking chamber probe (ADC channel 0)
    Pit,
    /// First meat probe (ADC channel 1)
    Meat1,
    /// Second meat probe (ADC channel 2)
    Meat2,
    /// Ambient temperature probe (ADC channel 3)
    Ambient,
}

impl ProbeId {
    /// All probes in channel order.
    pub const ALL: [ProbeId; 4] = [ProbeId::Pit, ProbeId::Meat1, ProbeId::Meat2, ProbeId::Ambient];

    /// The ADC channel this probe is wired to.
    pub fn channel(self) -> u8 {
        match self {
            ProbeId::Pit => 0,
            ProbeId::Meat1 => 1,
            ProbeId::Meat2 => 2,
            ProbeId::Ambient => 3,
        }
    }

    /// Probe bound to the given ADC channel, if any.
    pub fn from_channel(channel: u8) -> Option<ProbeId> {
        match channel {
            0 => Some(ProbeId::Pit),
            1 => Some(ProbeId::Meat1),
            2 => Some(ProbeId::Meat2),
            3 => Some(ProbeId::Ambient),
            _ => None,
        }
    }

    /// Stable identifier used in the API and in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            ProbeId::Pit => "pit_probe",
            ProbeId::Meat1 => "meat_probe_1",
            ProbeId::Meat2 => "meat_probe_2",
            ProbeId::Ambient => "ambient_probe",
        }
    }

    /// Parse a probe from its stable identifier.
    pub fn from_name(name: &str) -> Option<ProbeId> {
        match name {
            "pit_probe" => Some(ProbeId::Pit),
            "meat_probe_1" => Some(ProbeId::Meat1),
            "meat_probe_2" => Some(ProbeId::Meat2),
            "ambient_probe" => Some(ProbeId::Ambient),
            _ => None,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            ProbeId::Pit => "Pit Temperature Probe",
            ProbeId::Meat1 => "Meat Probe 1",
            ProbeId::Meat2 => "Meat Probe 2",
            ProbeId::Ambient => "Ambient Temperature Probe",
        }
    }
}

/// Steinhart-Hart equation coefficients for thermistor temperature calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SteinhartHartCoefficients {
    /// First coefficient (offset term)
    pub a: f64,
    /// Second coefficient (ln R term)
    pub b: f64,
    /// Third coefficient ((ln R)^3 term)
    pub c: f64,
}

/// Configuration for a single NTC thermistor probe
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ThermistorConfig {
    /// Human-readable probe name
    pub name: String,

    /// Nominal resistance at the nominal temperature, in ohms (usually 10 kOhm)
    #[serde(default = "default_resistance_nominal")]
    pub resistance_nominal: u32,

    /// Temperature for the nominal resistance, in degrees Celsius (usually 25)
    #[serde(default = "default_temperature_nominal")]
    pub temperature_nominal: f64,

    /// Beta coefficient (usually 3950)
    #[serde(default = "default_b_coefficient")]
    pub b_coefficient: u32,

    /// Fixed divider leg resistance in ohms (usually 10 kOhm)
    #[serde(default = "default_series_resistor")]
    pub series_resistor: u32,

    /// Optional Steinhart-Hart coefficients; when present they take
    /// precedence over the Beta equation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steinhart_hart: Option<SteinhartHartCoefficients>,

    /// Signed calibration offset in degrees Celsius
    #[serde(default)]
    pub offset_c: f64,
}

fn default_resistance_nominal() -> u32 {
    10_000
}

fn default_temperature_nominal() -> f64 {
    25.0
}

fn default_b_coefficient() -> u32 {
    3950
}

fn default_series_resistor() -> u32 {
    10_000
}

impl ThermistorConfig {
    /// Default configuration for the food-probe thermistors shipped with the
    /// controller (10 kOhm divider, B = 3950, Maverick-style Steinhart-Hart
    /// coefficients).
    pub fn default_for(probe: ProbeId) -> Self {
        Self {
            name: probe.label().to_string(),
            resistance_nominal: default_resistance_nominal(),
            temperature_nominal: default_temperature_nominal(),
            b_coefficient: default_b_coefficient(),
            series_resistor: default_series_resistor(),
            steinhart_hart: Some(SteinhartHartCoefficients {
                a: 0.000_734_314_054_4,
                b: 0.000_215_743_722_9,
                c: 0.000_000_095_156_857_7,
            }),
            offset_c: 0.0,
        }
    }
}

/// Per-probe thermistor configurations, keyed by probe identity
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProbeThermistors {
    /// Pit probe (channel 0)
    #[serde(default = "default_pit_thermistor")]
    pub pit_probe: ThermistorConfig,
    /// First meat probe (channel 1)
    #[serde(default = "default_meat_1_thermistor")]
    pub meat_probe_1: ThermistorConfig,
    /// Second meat probe (channel 2)
    #[serde(default = "default_meat_2_thermistor")]
    pub meat_probe_2: ThermistorConfig,
    /// Ambient probe (channel 3)
    #[serde(default = "default_ambient_thermistor")]
    pub ambient_probe: ThermistorConfig,
}

fn default_pit_thermistor() -> ThermistorConfig {
    ThermistorConfig::default_for(ProbeId::Pit)
}

fn default_meat_1_thermistor() -> ThermistorConfig {
    ThermistorConfig::default_for(ProbeId::Meat1)
}

fn default_meat_2_thermistor() -> ThermistorConfig {
    ThermistorConfig::default_for(ProbeId::Meat2)
}

fn default_ambient_thermistor() -> ThermistorConfig {
    ThermistorConfig::default_for(ProbeId::Ambient)
}

impl Default for ProbeThermistors {
    fn default() -> Self {
        Self {
            pit_probe: default_pit_thermistor(),
            meat_probe_1: default_meat_1_thermistor(),
            meat_probe_2: default_meat_2_thermistor(),
            ambient_probe: default_ambient_thermistor(),
        }
    }
}

impl ProbeThermistors {
    /// Thermistor configuration for a probe.
    pub fn get(&self, probe: ProbeId) -> &ThermistorConfig {
        match probe {
            ProbeId::Pit => &self.pit_probe,
            ProbeId::Meat1 => &self.meat_probe_1,
            ProbeId::Meat2 => &self.meat_probe_2,
            ProbeId::Ambient => &self.ambient_probe,
        }
    }

    /// Replace the thermistor configuration for a probe.
    pub fn set(&mut self, probe: ProbeId, config: ThermistorConfig) {
        match probe {
            ProbeId::Pit => self.pit_probe = config,
            ProbeId::Meat1 => self.meat_probe_1 = config,
            ProbeId::Meat2 => self.meat_probe_2 = config,
            ProbeId::Ambient => self.ambient_probe = config,
        }
    }
}

/// GPIO pin assignments
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GpioConfig {
    /// PWM-capable pin driving the damper servo
    #[serde(default = "default_servo_pin")]
    pub servo_pin: u8,
    /// I2C SDA pin
    #[serde(default = "default_i2c_sda_pin")]
    pub i2c_sda_pin: u8,
    /// I2C SCL pin
    #[serde(default = "default_i2c_scl_pin")]
    pub i2c_scl_pin: u8,
}

fn default_servo_pin() -> u8 {
    18
}

fn default_i2c_sda_pin() -> u8 {
    2
}

fn default_i2c_scl_pin() -> u8 {
    3
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            servo_pin: default_servo_pin(),
            i2c_sda_pin: default_i2c_sda_pin(),
            i2c_scl_pin: default_i2c_scl_pin(),
        }
    }
}

/// ADS1115 ADC configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AdcConfig {
    /// Linux I2C bus number (/dev/i2c-N)
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,
    /// ADS1115 I2C address
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u16,
    /// ADC reference/supply voltage in volts
    #[serde(default = "default_supply_voltage")]
    pub supply_voltage: f64,
    /// Samples per second (one of 8, 16, 32, 64, 128, 250, 475, 860)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// PGA gain selector (2/3 maps to 1 here; one of 1, 2, 4, 8, 16)
    #[serde(default = "default_gain")]
    pub gain: u8,
}

fn default_i2c_bus() -> u8 {
    1
}

fn default_i2c_address() -> u16 {
    0x48
}

fn default_supply_voltage() -> f64 {
    3.3
}

fn default_sample_rate() -> u32 {
    860
}

fn default_gain() -> u8 {
    1
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            i2c_bus: default_i2c_bus(),
            i2c_address: default_i2c_address(),
            supply_voltage: default_supply_voltage(),
            sample_rate: default_sample_rate(),
            gain: default_gain(),
        }
    }
}

/// Servo motor configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServoConfig {
    /// Pulse width in microseconds for the closed damper (0 %)
    #[serde(default = "default_min_pulse_width")]
    pub min_pulse_width: u32,
    /// Pulse width in microseconds for the fully open damper (100 %)
    #[serde(default = "default_max_pulse_width")]
    pub max_pulse_width: u32,
    /// Pulse width in microseconds for the center position
    #[serde(default = "default_center_pulse_width")]
    pub center_pulse_width: u32,
    /// PWM carrier frequency in Hz
    #[serde(default = "default_pwm_frequency")]
    pub pwm_frequency: u16,
    /// Maximum damper travel speed in percent-of-travel degrees per second
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    /// Position tolerance in percent; within this band no command is issued
    #[serde(default = "default_position_tolerance")]
    pub position_tolerance: f64,
}

fn default_min_pulse_width() -> u32 {
    1033
}

fn default_max_pulse_width() -> u32 {
    1833
}

fn default_center_pulse_width() -> u32 {
    1433
}

fn default_pwm_frequency() -> u16 {
    50
}

fn default_max_speed() -> f64 {
    30.0
}

fn default_position_tolerance() -> f64 {
    2.0
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            min_pulse_width: default_min_pulse_width(),
            max_pulse_width: default_max_pulse_width(),
            center_pulse_width: default_center_pulse_width(),
            pwm_frequency: default_pwm_frequency(),
            max_speed: default_max_speed(),
            position_tolerance: default_position_tolerance(),
        }
    }
}

/// pigpio daemon connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PigpioConfig {
    /// Daemon host name or address
    #[serde(default = "default_pigpio_host")]
    pub host: String,
    /// Daemon TCP port
    #[serde(default = "default_pigpio_port")]
    pub port: u16,
}

fn default_pigpio_host() -> String {
    "pigpiod".to_string()
}

fn default_pigpio_port() -> u16 {
    8888
}

impl Default for PigpioConfig {
    fn default() -> Self {
        Self {
            host: default_pigpio_host(),
            port: default_pigpio_port(),
        }
    }
}

/// Complete hardware configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct HardwareConfig {
    /// Run against simulated hardware instead of the I2C bus and pigpio
    #[serde(default)]
    pub simulate: bool,

    /// GPIO pin assignments
    #[serde(default)]
    pub gpio: GpioConfig,

    /// ADS1115 configuration
    #[serde(default)]
    pub adc: AdcConfig,

    /// Damper servo configuration
    #[serde(default)]
    pub servo: ServoConfig,

    /// pigpio daemon connection
    #[serde(default)]
    pub pigpio: PigpioConfig,

    /// Per-probe thermistor configurations
    #[serde(default)]
    pub thermistors: ProbeThermistors,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_channel_mapping_round_trip() {
        for probe in ProbeId::ALL {
            assert_eq!(ProbeId::from_channel(probe.channel()), Some(probe));
            assert_eq!(ProbeId::from_name(probe.name()), Some(probe));
        }
        assert_eq!(ProbeId::from_channel(4), None);
        assert_eq!(ProbeId::from_name("lid_probe"), None);
    }

    #[test]
    fn test_default_thermistors_use_steinhart_hart() {
        let thermistors = ProbeThermistors::default();
        for probe in ProbeId::ALL {
            let config = thermistors.get(probe);
            assert_eq!(config.resistance_nominal, 10_000);
            assert_eq!(config.b_coefficient, 3950);
            assert!(config.steinhart_hart.is_some());
            assert_eq!(config.offset_c, 0.0);
        }
    }

    #[test]
    fn test_hardware_config_defaults() {
        let config = HardwareConfig::default();
        assert!(!config.simulate);
        assert_eq!(config.gpio.servo_pin, 18);
        assert_eq!(config.adc.i2c_address, 0x48);
        assert_eq!(config.adc.sample_rate, 860);
        assert_eq!(config.servo.min_pulse_width, 1033);
        assert_eq!(config.servo.max_pulse_width, 1833);
        assert_eq!(config.pigpio.port, 8888);
    }
}
