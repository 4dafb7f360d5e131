// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! ADS1115 ADC driver for the temperature probes
//!
//! Single-shot, single-ended reads of the four probe channels. Three
//! backends are tried in order at initialization:
//!
//! 1. `HalAds1115` — Raspberry Pi I2C through `rppal`
//! 2. `SmbusAds1115` — raw register-level access through `/dev/i2c-*`
//! 3. `SimulatedAdc` — first-order thermal model for development and tests
//!
//! All access is serialized through [`Ads1115Manager`]; a failed read
//! surfaces as a [`ControlError::TransientI2cFault`] and the caller owns the
//! retry policy.

use chrono::{DateTime, Utc};
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use log::{debug, info, warn};
use rand::Rng;
use rppal::i2c::I2c;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::hardware::HardwareConfig;
use crate::config::ProbeId;
use crate::control::error::{ControlError, ControlResult};
use crate::hardware::thermistor::ThermistorCalculator;

/// Conversion result register (read-only, 16-bit signed).
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
const REG_CONFIG: u8 = 0x01;

/// Bit 15 of the config register: write 1 to start a conversion, reads back
/// 1 when the conversion is complete.
const OS_BIT: u16 = 1 << 15;
/// Single-shot mode bit.
const MODE_SINGLE_SHOT: u16 = 1 << 8;
/// Comparator disabled.
const COMP_QUE_DISABLE: u16 = 0b11;

/// Voltage below which a channel is considered to have no probe attached.
const MIN_CONNECTED_VOLTAGE: f64 = 0.1;

/// Number of conversion-ready polls after the nominal conversion time.
const OS_POLL_ATTEMPTS: u32 = 10;
const OS_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One ADC capture: raw count, scaled voltage, and timestamp.
#[derive(Debug, Clone)]
pub struct ProbeSample {
    /// ADC channel (0-3)
    pub channel: u8,
    /// Input voltage in volts, scaled from the PGA full-scale range
    pub voltage: f64,
    /// Signed 16-bit conversion result
    pub raw_count: i16,
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
}

/// Which backend the manager ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcBackendKind {
    /// Raspberry Pi I2C HAL (`rppal`)
    Hal,
    /// Raw register-level SMBus (`/dev/i2c-*`)
    Smbus,
    /// Simulated hardware
    Simulation,
}

impl AdcBackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdcBackendKind::Hal => "hal",
            AdcBackendKind::Smbus => "smbus",
            AdcBackendKind::Simulation => "simulation",
        }
    }
}

/// Low-level single-channel read interface implemented by each backend.
trait AdcBackend: Send {
    fn read_channel(&mut self, channel: u8) -> ControlResult<ProbeSample>;
    fn kind(&self) -> AdcBackendKind;
}

/// Full-scale range in volts for a PGA gain selector.
fn gain_full_scale(gain: u8) -> f64 {
    match gain {
        1 => 4.096,
        2 => 2.048,
        4 => 1.024,
        8 => 0.512,
        16 => 0.256,
        _ => 4.096,
    }
}

/// PGA field bits for a gain selector.
fn gain_pga_bits(gain: u8) -> u16 {
    match gain {
        1 => 0b001,
        2 => 0b010,
        4 => 0b011,
        8 => 0b100,
        16 => 0b101,
        _ => 0b001,
    }
}

/// Data-rate field bits for a samples-per-second setting.
fn data_rate_bits(sample_rate: u32) -> u16 {
    match sample_rate {
        8 => 0b000,
        16 => 0b001,
        32 => 0b010,
        64 => 0b011,
        128 => 0b100,
        250 => 0b101,
        475 => 0b110,
        860 => 0b111,
        other => {
            warn!("Unsupported ADS1115 sample rate {}, using 128 SPS", other);
            0b100
        }
    }
}

/// Compose the 16-bit config word for a single-shot single-ended read.
fn config_word(channel: u8, gain: u8, sample_rate: u32) -> u16 {
    OS_BIT
        | ((4 + channel as u16) << 12)
        | (gain_pga_bits(gain) << 9)
        | MODE_SINGLE_SHOT
        | (data_rate_bits(sample_rate) << 5)
        | COMP_QUE_DISABLE
}

/// Nominal conversion time plus a 1 ms safety margin.
fn conversion_wait(sample_rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / sample_rate.max(8) as f64) + Duration::from_millis(1)
}

/// Scale a signed conversion count to volts, clamping negative noise to 0.
fn volts_from_raw(raw: i16, gain: u8) -> f64 {
    let volts = raw as f64 * gain_full_scale(gain) / 32768.0;
    volts.max(0.0)
}

fn transient(channel: u8, err: impl std::fmt::Display) -> ControlError {
    ControlError::TransientI2cFault {
        channel,
        message: err.to_string(),
    }
}

/// Vendor-HAL backend: Raspberry Pi I2C through `rppal`.
struct HalAds1115 {
    i2c: I2c,
    gain: u8,
    sample_rate: u32,
}

impl HalAds1115 {
    fn new(config: &HardwareConfig) -> ControlResult<Self> {
        let adc = &config.adc;
        let mut i2c = I2c::with_bus(adc.i2c_bus)
            .map_err(|e| ControlError::HardwareUnavailable(format!("rppal I2C open: {e}")))?;
        i2c.set_slave_address(adc.i2c_address)
            .map_err(|e| ControlError::HardwareUnavailable(format!("rppal I2C address: {e}")))?;

        // Probe the device: the config register must be readable.
        let mut buf = [0u8; 2];
        i2c.write_read(&[REG_CONFIG], &mut buf).map_err(|e| {
            ControlError::HardwareUnavailable(format!(
                "ADS1115 not responding at 0x{:02x}: {e}",
                adc.i2c_address
            ))
        })?;

        Ok(Self {
            i2c,
            gain: adc.gain,
            sample_rate: adc.sample_rate,
        })
    }
}

impl AdcBackend for HalAds1115 {
    fn read_channel(&mut self, channel: u8) -> ControlResult<ProbeSample> {
        let word = config_word(channel, self.gain, self.sample_rate);
        self.i2c
            .write(&[REG_CONFIG, (word >> 8) as u8, (word & 0xff) as u8])
            .map_err(|e| transient(channel, e))?;

        thread::sleep(conversion_wait(self.sample_rate));

        let mut buf = [0u8; 2];
        for _ in 0..OS_POLL_ATTEMPTS {
            self.i2c
                .write_read(&[REG_CONFIG], &mut buf)
                .map_err(|e| transient(channel, e))?;
            if u16::from_be_bytes(buf) & OS_BIT != 0 {
                break;
            }
            thread::sleep(OS_POLL_INTERVAL);
        }

        self.i2c
            .write_read(&[REG_CONVERSION], &mut buf)
            .map_err(|e| transient(channel, e))?;
        let raw = i16::from_be_bytes(buf);

        Ok(ProbeSample {
            channel,
            voltage: volts_from_raw(raw, self.gain),
            raw_count: raw,
            timestamp: Utc::now(),
        })
    }

    fn kind(&self) -> AdcBackendKind {
        AdcBackendKind::Hal
    }
}

/// Raw SMBus backend: register-level access through `/dev/i2c-*`.
struct SmbusAds1115 {
    dev: LinuxI2CDevice,
    gain: u8,
    sample_rate: u32,
}

impl SmbusAds1115 {
    fn new(config: &HardwareConfig) -> ControlResult<Self> {
        let adc = &config.adc;
        let path = format!("/dev/i2c-{}", adc.i2c_bus);
        let mut dev = LinuxI2CDevice::new(&path, adc.i2c_address)
            .map_err(|e| ControlError::HardwareUnavailable(format!("open {path}: {e}")))?;

        let mut buf = [0u8; 2];
        dev.write(&[REG_CONFIG])
            .and_then(|_| dev.read(&mut buf))
            .map_err(|e| {
                ControlError::HardwareUnavailable(format!(
                    "ADS1115 not responding at 0x{:02x}: {e}",
                    adc.i2c_address
                ))
            })?;

        Ok(Self {
            dev,
            gain: adc.gain,
            sample_rate: adc.sample_rate,
        })
    }
}

impl AdcBackend for SmbusAds1115 {
    fn read_channel(&mut self, channel: u8) -> ControlResult<ProbeSample> {
        // Start the conversion: config word, high byte first.
        let word = config_word(channel, self.gain, self.sample_rate);
        self.dev
            .write(&[REG_CONFIG, (word >> 8) as u8, (word & 0xff) as u8])
            .map_err(|e| transient(channel, e))?;

        thread::sleep(conversion_wait(self.sample_rate));

        // Poll OS until the conversion completes.
        let mut buf = [0u8; 2];
        for _ in 0..OS_POLL_ATTEMPTS {
            self.dev
                .write(&[REG_CONFIG])
                .and_then(|_| self.dev.read(&mut buf))
                .map_err(|e| transient(channel, e))?;
            if u16::from_be_bytes(buf) & OS_BIT != 0 {
                break;
            }
            thread::sleep(OS_POLL_INTERVAL);
        }

        self.dev
            .write(&[REG_CONVERSION])
            .and_then(|_| self.dev.read(&mut buf))
            .map_err(|e| transient(channel, e))?;
        let raw = i16::from_be_bytes(buf);

        Ok(ProbeSample {
            channel,
            voltage: volts_from_raw(raw, self.gain),
            raw_count: raw,
            timestamp: Utc::now(),
        })
    }

    fn kind(&self) -> AdcBackendKind {
        AdcBackendKind::Smbus
    }
}

/// One simulated channel: a first-order lag toward a target temperature.
#[derive(Debug, Clone)]
struct SimChannel {
    current_temp_c: f64,
    target_temp_c: f64,
    tau_seconds: f64,
}

#[derive(Debug)]
struct SimulationState {
    channels: [SimChannel; 4],
    last_step: Instant,
}

impl SimulationState {
    fn new() -> Self {
        Self {
            channels: [
                // Pit warms toward a lit-charcoal temperature.
                SimChannel {
                    current_temp_c: 25.0,
                    target_temp_c: 110.0,
                    tau_seconds: 180.0,
                },
                SimChannel {
                    current_temp_c: 25.0,
                    target_temp_c: 65.0,
                    tau_seconds: 600.0,
                },
                SimChannel {
                    current_temp_c: 25.0,
                    target_temp_c: 58.0,
                    tau_seconds: 600.0,
                },
                SimChannel {
                    current_temp_c: 22.0,
                    target_temp_c: 22.0,
                    tau_seconds: 60.0,
                },
            ],
            last_step: Instant::now(),
        }
    }

    fn step(&mut self) {
        let dt = self.last_step.elapsed().as_secs_f64();
        self.last_step = Instant::now();
        let blend = |tau: f64| 1.0 - (-dt / tau).exp();
        for channel in &mut self.channels {
            let delta = channel.target_temp_c - channel.current_temp_c;
            channel.current_temp_c += delta * blend(channel.tau_seconds);
        }
    }
}

/// Shared handle into the simulated thermal model.
///
/// Tests and the demo steer channel temperatures through this handle; the
/// production code path never touches it.
#[derive(Clone)]
pub struct SimulationHandle {
    state: Arc<Mutex<SimulationState>>,
}

impl SimulationHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimulationState::new())),
        }
    }

    /// Pin a channel to a temperature (current and target).
    pub fn set_channel_temperature(&self, channel: u8, temperature_c: f64) {
        let mut state = self.state.lock().unwrap();
        if let Some(ch) = state.channels.get_mut(channel as usize) {
            ch.current_temp_c = temperature_c;
            ch.target_temp_c = temperature_c;
        }
    }

    /// Let a channel drift toward a new target with its time constant.
    pub fn set_channel_target(&self, channel: u8, temperature_c: f64) {
        let mut state = self.state.lock().unwrap();
        if let Some(ch) = state.channels.get_mut(channel as usize) {
            ch.target_temp_c = temperature_c;
        }
    }

    /// Current simulated temperature of a channel.
    pub fn channel_temperature(&self, channel: u8) -> Option<f64> {
        let state = self.state.lock().unwrap();
        state.channels.get(channel as usize).map(|c| c.current_temp_c)
    }
}

/// Simulated backend: renders the thermal model back through the inverse
/// divider so the thermistor math reproduces the modeled temperatures.
struct SimulatedAdc {
    handle: SimulationHandle,
    calculator: ThermistorCalculator,
    gain: u8,
    supply_voltage: f64,
}

impl SimulatedAdc {
    fn new(config: &HardwareConfig, handle: SimulationHandle) -> Self {
        let mut calculator = ThermistorCalculator::new(config.adc.supply_voltage);
        for probe in ProbeId::ALL {
            // set_probe_config only fails for channels above 3
            let _ = calculator.set_probe_config(probe.channel(), config.thermistors.get(probe).clone());
        }
        Self {
            handle,
            calculator,
            gain: config.adc.gain,
            supply_voltage: config.adc.supply_voltage,
        }
    }
}

impl AdcBackend for SimulatedAdc {
    fn read_channel(&mut self, channel: u8) -> ControlResult<ProbeSample> {
        let temperature = {
            let mut state = self.handle.state.lock().unwrap();
            state.step();
            state
                .channels
                .get(channel as usize)
                .map(|c| c.current_temp_c)
                .ok_or_else(|| ControlError::OutOfRange(format!("invalid channel {}", channel)))?
        };

        let noise = rand::rng().random_range(-0.02..0.02);
        let config = self.calculator.probe_config(channel)?.clone();
        let resistance = self
            .calculator
            .resistance_for_temperature(temperature + noise, &config);
        let voltage = self
            .calculator
            .resistance_to_voltage(resistance, config.series_resistor as f64)
            .clamp(0.0, self.supply_voltage - 0.002);

        let raw = ((voltage / gain_full_scale(self.gain)) * 32768.0)
            .clamp(i16::MIN as f64, i16::MAX as f64) as i16;

        Ok(ProbeSample {
            channel,
            voltage,
            raw_count: raw,
            timestamp: Utc::now(),
        })
    }

    fn kind(&self) -> AdcBackendKind {
        AdcBackendKind::Simulation
    }
}

/// Thread-safe manager for the ADS1115, owning one backend chosen at
/// initialization.
pub struct Ads1115Manager {
    backend: Mutex<Box<dyn AdcBackend>>,
    kind: AdcBackendKind,
    last_readings: Mutex<[Option<ProbeSample>; 4]>,
    simulation: Option<SimulationHandle>,
}

impl Ads1115Manager {
    /// Create a manager, trying the vendor HAL, then raw SMBus, then the
    /// simulation.
    pub fn new(config: &HardwareConfig) -> Self {
        let (backend, simulation): (Box<dyn AdcBackend>, Option<SimulationHandle>) =
            if config.simulate {
                let handle = SimulationHandle::new();
                info!("ADS1115 running in simulation mode (requested)");
                (
                    Box::new(SimulatedAdc::new(config, handle.clone())),
                    Some(handle),
                )
            } else {
                match HalAds1115::new(config) {
                    Ok(backend) => {
                        info!(
                            "ADS1115 initialized through rppal on I2C bus {} address 0x{:02x}",
                            config.adc.i2c_bus, config.adc.i2c_address
                        );
                        (Box::new(backend), None)
                    }
                    Err(hal_err) => {
                        warn!("rppal backend unavailable ({}), trying raw SMBus", hal_err);
                        match SmbusAds1115::new(config) {
                            Ok(backend) => {
                                info!(
                                    "ADS1115 initialized through /dev/i2c-{} address 0x{:02x}",
                                    config.adc.i2c_bus, config.adc.i2c_address
                                );
                                (Box::new(backend), None)
                            }
                            Err(smbus_err) => {
                                warn!(
                                    "SMBus backend unavailable ({}), falling back to simulation",
                                    smbus_err
                                );
                                let handle = SimulationHandle::new();
                                (
                                    Box::new(SimulatedAdc::new(config, handle.clone())),
                                    Some(handle),
                                )
                            }
                        }
                    }
                }
            };

        let kind = backend.kind();
        Self {
            backend: Mutex::new(backend),
            kind,
            last_readings: Mutex::new([None, None, None, None]),
            simulation,
        }
    }

    /// Read one channel. Thread-safe; concurrent calls are serialized.
    pub fn read_channel(&self, channel: u8) -> ControlResult<ProbeSample> {
        if channel > 3 {
            return Err(ControlError::OutOfRange(format!(
                "invalid channel {}. Must be 0-3",
                channel
            )));
        }

        let sample = {
            let mut backend = self.backend.lock().unwrap();
            backend.read_channel(channel)
        };

        if let Ok(sample) = &sample {
            debug!(
                "ADC channel {}: {:.4} V (raw {})",
                channel, sample.voltage, sample.raw_count
            );
            let mut last = self.last_readings.lock().unwrap();
            last[channel as usize] = Some(sample.clone());
        }

        sample
    }

    /// Read all four channels, returning per-channel results.
    pub fn read_all(&self) -> Vec<(u8, ControlResult<ProbeSample>)> {
        (0..4u8).map(|ch| (ch, self.read_channel(ch))).collect()
    }

    /// Last captured sample for a channel without triggering a new read.
    pub fn last_reading(&self, channel: u8) -> Option<ProbeSample> {
        let last = self.last_readings.lock().unwrap();
        last.get(channel as usize).and_then(|s| s.clone())
    }

    /// Whether a probe appears attached to the channel (voltage above the
    /// connection floor).
    pub fn is_channel_connected(&self, channel: u8) -> bool {
        match self.read_channel(channel) {
            Ok(sample) => sample.voltage > MIN_CONNECTED_VOLTAGE,
            Err(_) => false,
        }
    }

    /// Channels that appear to have probes attached.
    pub fn connected_channels(&self) -> Vec<u8> {
        (0..4u8).filter(|&ch| self.is_channel_connected(ch)).collect()
    }

    /// Which backend the manager ended up on.
    pub fn backend_kind(&self) -> AdcBackendKind {
        self.kind
    }

    /// Handle into the simulated thermal model, when simulating.
    pub fn simulation(&self) -> Option<SimulationHandle> {
        self.simulation.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::hardware::HardwareConfig;

    fn simulated_manager() -> Ads1115Manager {
        let mut config = HardwareConfig::default();
        config.simulate = true;
        Ads1115Manager::new(&config)
    }

    #[test]
    fn test_config_word_layout() {
        // Channel 0, gain 1 (+-4.096 V), 860 SPS, single-shot, comparator off.
        let word = config_word(0, 1, 860);
        assert_eq!(word & OS_BIT, OS_BIT);
        assert_eq!((word >> 12) & 0b111, 0b100);
        assert_eq!((word >> 9) & 0b111, 0b001);
        assert_eq!(word & MODE_SINGLE_SHOT, MODE_SINGLE_SHOT);
        assert_eq!((word >> 5) & 0b111, 0b111);
        assert_eq!(word & 0b11, COMP_QUE_DISABLE);

        // Channel selection is single-ended: MUX = 4 + channel.
        assert_eq!((config_word(3, 1, 860) >> 12) & 0b111, 0b111);
    }

    #[test]
    fn test_volts_from_raw_scaling_and_clamp() {
        assert_eq!(volts_from_raw(0, 1), 0.0);
        let full = volts_from_raw(i16::MAX, 1);
        assert!((full - 4.096).abs() < 0.001);
        // Negative noise clamps to zero.
        assert_eq!(volts_from_raw(-120, 1), 0.0);
    }

    #[test]
    fn test_conversion_wait_includes_margin() {
        let wait = conversion_wait(860);
        assert!(wait >= Duration::from_micros(1162 + 1000));
        assert!(wait < Duration::from_millis(5));
    }

    #[test]
    fn test_simulated_backend_produces_plausible_samples() {
        let manager = simulated_manager();
        assert_eq!(manager.backend_kind(), AdcBackendKind::Simulation);
        for channel in 0..4u8 {
            let sample = manager.read_channel(channel).unwrap();
            assert_eq!(sample.channel, channel);
            assert!(sample.voltage > MIN_CONNECTED_VOLTAGE);
            assert!(sample.voltage < 3.3);
            assert!(sample.raw_count > 0);
        }
        assert_eq!(manager.connected_channels(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_simulation_handle_pins_temperature() {
        let manager = simulated_manager();
        let handle = manager.simulation().expect("simulation handle");
        handle.set_channel_temperature(0, 150.0);

        let sample = manager.read_channel(0).unwrap();
        // The modeled temperature stays pinned (within the noise band).
        let temp = handle.channel_temperature(0).unwrap();
        assert!((temp - 150.0).abs() < 0.5);
        assert!(sample.voltage > 1.0);
    }

    #[test]
    fn test_read_channel_rejects_bad_channel() {
        let manager = simulated_manager();
        assert!(matches!(
            manager.read_channel(4),
            Err(ControlError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_last_reading_caches_without_new_read() {
        let manager = simulated_manager();
        assert!(manager.last_reading(2).is_none());
        let sample = manager.read_channel(2).unwrap();
        let cached = manager.last_reading(2).unwrap();
        assert_eq!(cached.raw_count, sample.raw_count);
    }
}
