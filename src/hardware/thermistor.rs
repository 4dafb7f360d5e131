// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! NTC thermistor temperature calculations
//!
//! Pure voltage-divider and resistance-to-temperature math for the four
//! probe channels. Each channel carries its own [`ThermistorConfig`]; the
//! Steinhart-Hart equation is used when coefficients are configured,
//! otherwise the Beta equation.

use log::{info, warn};

use crate::config::hardware::{SteinhartHartCoefficients, ThermistorConfig};
use crate::config::ProbeId;
use crate::control::error::{ControlError, ControlResult};

const KELVIN_OFFSET: f64 = 273.15;

/// Minimum voltage the divider math accepts, in volts.
const MIN_DIVIDER_VOLTAGE: f64 = 0.001;

/// Fallback practical range when the range computation itself fails.
const FALLBACK_RANGE: (f64, f64) = (-40.0, 150.0);

/// Handles temperature calculations for the four NTC thermistor channels.
pub struct ThermistorCalculator {
    supply_voltage: f64,
    configs: [ThermistorConfig; 4],
}

impl ThermistorCalculator {
    /// Create a calculator with default probe configurations.
    pub fn new(supply_voltage: f64) -> Self {
        Self {
            supply_voltage,
            configs: [
                ThermistorConfig::default_for(ProbeId::Pit),
                ThermistorConfig::default_for(ProbeId::Meat1),
                ThermistorConfig::default_for(ProbeId::Meat2),
                ThermistorConfig::default_for(ProbeId::Ambient),
            ],
        }
    }

    /// Replace the thermistor configuration for a channel.
    pub fn set_probe_config(&mut self, channel: u8, config: ThermistorConfig) -> ControlResult<()> {
        let slot = self
            .configs
            .get_mut(channel as usize)
            .ok_or_else(|| ControlError::OutOfRange(format!("invalid channel {}", channel)))?;
        info!("Channel {} configured for {}", channel, config.name);
        *slot = config;
        Ok(())
    }

    /// Thermistor configuration for a channel.
    pub fn probe_config(&self, channel: u8) -> ControlResult<&ThermistorConfig> {
        self.configs
            .get(channel as usize)
            .ok_or_else(|| ControlError::OutOfRange(format!("invalid channel {}", channel)))
    }

    /// Convert a measured voltage to thermistor resistance using the
    /// voltage divider: `R = R_series * Vcc / V - R_series`.
    pub fn voltage_to_resistance(&self, voltage: f64, series_resistor: f64) -> ControlResult<f64> {
        if voltage <= MIN_DIVIDER_VOLTAGE || voltage >= self.supply_voltage {
            return Err(ControlError::OutOfRange(format!(
                "invalid voltage {voltage} V (supply: {} V)",
                self.supply_voltage
            )));
        }
        Ok(series_resistor * self.supply_voltage / voltage - series_resistor)
    }

    /// Inverse of [`Self::voltage_to_resistance`]: the divider voltage a
    /// given thermistor resistance produces.
    pub fn resistance_to_voltage(&self, resistance: f64, series_resistor: f64) -> f64 {
        series_resistor * self.supply_voltage / (resistance + series_resistor)
    }

    /// Convert resistance to temperature using the Beta equation.
    pub fn resistance_to_temperature_beta(
        &self,
        resistance: f64,
        config: &ThermistorConfig,
    ) -> f64 {
        let t0_kelvin = config.temperature_nominal + KELVIN_OFFSET;
        let ln_ratio = (resistance / config.resistance_nominal as f64).ln();
        let temp_kelvin = 1.0 / (1.0 / t0_kelvin + ln_ratio / config.b_coefficient as f64);
        temp_kelvin - KELVIN_OFFSET + config.offset_c
    }

    /// Convert resistance to temperature using the Steinhart-Hart equation:
    /// `1/T = A + B*ln(R) + C*(ln(R))^3`.
    ///
    /// Falls back to the Beta equation when no coefficients are configured.
    pub fn resistance_to_temperature_steinhart_hart(
        &self,
        resistance: f64,
        config: &ThermistorConfig,
    ) -> f64 {
        let Some(coeff) = config.steinhart_hart else {
            return self.resistance_to_temperature_beta(resistance, config);
        };

        let ln_r = resistance.ln();
        let temp_kelvin_inv = coeff.a + coeff.b * ln_r + coeff.c * ln_r.powi(3);
        let temp_kelvin = 1.0 / temp_kelvin_inv;
        temp_kelvin - KELVIN_OFFSET + config.offset_c
    }

    /// Resistance a thermistor presents at a given temperature.
    ///
    /// Inverts the Steinhart-Hart equation via Cardano's formula when
    /// coefficients are configured, otherwise inverts the Beta equation.
    /// The offset is removed before inversion so the round trip through
    /// the forward conversion reproduces the input.
    pub fn resistance_for_temperature(&self, temperature_c: f64, config: &ThermistorConfig) -> f64 {
        let temp_kelvin = temperature_c - config.offset_c + KELVIN_OFFSET;
        match config.steinhart_hart {
            Some(coeff) => steinhart_hart_inverse(temp_kelvin, coeff),
            None => {
                let t0_kelvin = config.temperature_nominal + KELVIN_OFFSET;
                let exponent =
                    config.b_coefficient as f64 * (1.0 / temp_kelvin - 1.0 / t0_kelvin);
                config.resistance_nominal as f64 * exponent.exp()
            }
        }
    }

    /// Convert ADC voltage directly to temperature for a channel.
    ///
    /// Returns `None` on any math fault; the caller marks the sample
    /// invalid.
    pub fn voltage_to_temperature(&self, voltage: f64, channel: u8) -> Option<f64> {
        let config = self.probe_config(channel).ok()?;

        let resistance = match self.voltage_to_resistance(voltage, config.series_resistor as f64) {
            Ok(resistance) => resistance,
            Err(err) => {
                warn!(
                    "Temperature calculation error for channel {}: {}",
                    channel, err
                );
                return None;
            }
        };

        let temperature = self.resistance_to_temperature_steinhart_hart(resistance, config);
        if !temperature.is_finite() || temperature + KELVIN_OFFSET <= 0.0 {
            warn!(
                "Temperature calculation error for channel {}: non-physical result {temperature}",
                channel
            );
            return None;
        }

        Some(temperature)
    }

    /// Practical temperature range for a thermistor configuration,
    /// recomputed from the divider at its voltage margins.
    pub fn temperature_range(&self, config: &ThermistorConfig) -> (f64, f64) {
        let min_voltage = MIN_DIVIDER_VOLTAGE * 1.001;
        let max_voltage = self.supply_voltage - MIN_DIVIDER_VOLTAGE;

        let series = config.series_resistor as f64;
        let range = (|| -> ControlResult<(f64, f64)> {
            // High resistance (low voltage) is the cold end for an NTC.
            let max_resistance = self.voltage_to_resistance(min_voltage, series)?;
            let min_resistance = self.voltage_to_resistance(max_voltage, series)?;

            let min_temp = self.resistance_to_temperature_steinhart_hart(max_resistance, config);
            let max_temp = self.resistance_to_temperature_steinhart_hart(min_resistance, config);
            Ok((min_temp, max_temp))
        })();

        match range {
            Ok((min_temp, max_temp)) if min_temp.is_finite() && max_temp.is_finite() => {
                (min_temp, max_temp)
            }
            _ => FALLBACK_RANGE,
        }
    }

    /// Whether a temperature reading is inside the channel's practical range.
    pub fn validate_reading(&self, temperature_c: f64, channel: u8) -> bool {
        let Ok(config) = self.probe_config(channel) else {
            return false;
        };
        let (min_temp, max_temp) = self.temperature_range(config);
        (min_temp..=max_temp).contains(&temperature_c)
    }

    /// Calibrate a channel by setting `offset_c = actual - measured`.
    ///
    /// Returns the new offset.
    pub fn calibrate_probe(
        &mut self,
        channel: u8,
        measured_temp: f64,
        actual_temp: f64,
    ) -> ControlResult<f64> {
        let slot = self
            .configs
            .get_mut(channel as usize)
            .ok_or_else(|| ControlError::OutOfRange(format!("invalid channel {}", channel)))?;
        // The measured value already includes the previous offset.
        let offset = slot.offset_c + (actual_temp - measured_temp);
        slot.offset_c = offset;
        info!(
            "Channel {} calibrated with offset {:.2} degC",
            channel, offset
        );
        Ok(offset)
    }
}

/// Solve `A + B*x + C*x^3 = 1/T` for `x = ln(R)` via Cardano's formula and
/// return `R`. `C > 0` and `B > 0` yield a single real root.
fn steinhart_hart_inverse(temp_kelvin: f64, coeff: SteinhartHartCoefficients) -> f64 {
    let p = coeff.b / coeff.c;
    let q = (coeff.a - 1.0 / temp_kelvin) / coeff.c;
    let discriminant = (q / 2.0).powi(2) + (p / 3.0).powi(3);
    let root = discriminant.sqrt();
    let ln_r = (-q / 2.0 + root).cbrt() + (-q / 2.0 - root).cbrt();
    ln_r.exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> ThermistorCalculator {
        ThermistorCalculator::new(3.3)
    }

    #[test]
    fn test_voltage_to_resistance_divider_math() {
        let calc = calculator();
        // Midpoint of the divider: thermistor equals the series resistor.
        let resistance = calc.voltage_to_resistance(1.65, 10_000.0).unwrap();
        assert!((resistance - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_voltage_to_resistance_rejects_rail_voltages() {
        let calc = calculator();
        assert!(matches!(
            calc.voltage_to_resistance(0.0005, 10_000.0),
            Err(ControlError::OutOfRange(_))
        ));
        assert!(matches!(
            calc.voltage_to_resistance(3.3, 10_000.0),
            Err(ControlError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_resistance_voltage_round_trip() {
        let calc = calculator();
        for resistance in [500.0, 5_000.0, 10_000.0, 150_000.0] {
            let voltage = calc.resistance_to_voltage(resistance, 10_000.0);
            let back = calc.voltage_to_resistance(voltage, 10_000.0).unwrap();
            assert!(
                (back - resistance).abs() / resistance < 1e-9,
                "round trip failed for {resistance} ohm: got {back}"
            );
        }
    }

    #[test]
    fn test_beta_equation_at_nominal_point() {
        let calc = calculator();
        let config = ThermistorConfig::default_for(ProbeId::Pit);
        // At the nominal resistance the Beta equation returns the nominal
        // temperature exactly.
        let temp = calc.resistance_to_temperature_beta(10_000.0, &config);
        assert!((temp - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_steinhart_hart_inverse_round_trip() {
        let calc = calculator();
        let config = ThermistorConfig::default_for(ProbeId::Pit);
        for temp in [20.0, 110.0, 250.0, 405.0] {
            let resistance = calc.resistance_for_temperature(temp, &config);
            let back = calc.resistance_to_temperature_steinhart_hart(resistance, &config);
            assert!(
                (back - temp).abs() < 1e-6,
                "inverse round trip failed for {temp} degC: got {back}"
            );
        }
    }

    #[test]
    fn test_offset_applied_after_conversion() {
        let calc = calculator();
        let mut config = ThermistorConfig::default_for(ProbeId::Pit);
        let base = calc.resistance_to_temperature_steinhart_hart(10_000.0, &config);
        config.offset_c = 2.5;
        let offset = calc.resistance_to_temperature_steinhart_hart(10_000.0, &config);
        assert!((offset - base - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_calibration_accumulates_offsets() {
        let mut calc = calculator();
        let offset = calc.calibrate_probe(0, 95.0, 100.0).unwrap();
        assert!((offset - 5.0).abs() < 1e-9);
        // A second calibration based on already-offset readings converges
        // instead of double-counting.
        let offset = calc.calibrate_probe(0, 100.0, 100.0).unwrap();
        assert!((offset - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_reading_accepts_safety_envelope() {
        let calc = calculator();
        // The practical range must cover everything the safety supervisor
        // needs to observe, including an over-limit pit reading.
        assert!(calc.validate_reading(110.0, 0));
        assert!(calc.validate_reading(405.0, 0));
        assert!(!calc.validate_reading(-300.0, 0));
        assert!(!calc.validate_reading(5_000.0, 0));
        assert!(!calc.validate_reading(25.0, 9));
    }

    #[test]
    fn test_voltage_to_temperature_invalid_voltage_is_none() {
        let calc = calculator();
        assert!(calc.voltage_to_temperature(0.0, 0).is_none());
        assert!(calc.voltage_to_temperature(3.31, 0).is_none());
        assert!(calc.voltage_to_temperature(1.5, 0).is_some());
    }
}
