use crate::config::SensorPaths;
use anyhow::{Context, Result};
use greenhouse_control::relay::{Actuator, RelayState};
use greenhouse_control::sensor::{SensorError, SensorGateway};
use std::fs;
use std::path::{Path, PathBuf};

// 12-bit ADC behind the light-dependent resistor.
const LIGHT_MAX_RAW: i64 = 4095;

/// DHT11 + LDR through the kernel IIO drivers.
pub struct IioSensors {
    paths: SensorPaths,
}

impl IioSensors {
    pub fn new(paths: SensorPaths) -> Self {
        IioSensors { paths }
    }
}

fn read_raw(path: &Path) -> Result<i64, SensorError> {
    let text = fs::read_to_string(path)?;
    // A bad dht11 transfer fails the read itself (EIO/ETIMEDOUT).
    text.trim().parse::<i64>().map_err(|_| SensorError::Unavailable)
}

fn read_milli(path: &Path) -> Result<f32, SensorError> {
    Ok(read_raw(path)? as f32 / 1000.0)
}

impl SensorGateway for IioSensors {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        let t = read_milli(&self.paths.temperature)?;
        if !(-40.0..=80.0).contains(&t) {
            return Err(SensorError::OutOfRange(t as f64));
        }
        Ok(t)
    }

    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        let h = read_milli(&self.paths.humidity)?;
        if !(0.0..=100.0).contains(&h) {
            return Err(SensorError::OutOfRange(h as f64));
        }
        Ok(h)
    }

    fn read_light(&mut self) -> Result<u16, SensorError> {
        let raw = read_raw(&self.paths.light)?;
        if !(0..=LIGHT_MAX_RAW).contains(&raw) {
            return Err(SensorError::OutOfRange(raw as f64));
        }
        Ok(raw as u16)
    }
}

/// Relay on a sysfs GPIO line that was exported as an output at boot.
pub struct GpioRelay {
    value_path: PathBuf,
    active_low: bool,
}

impl GpioRelay {
    pub fn new(value_path: PathBuf, active_low: bool) -> Result<GpioRelay> {
        fs::metadata(&value_path)
            .with_context(|| format!("gpio line {} not exported", value_path.display()))?;
        Ok(GpioRelay {
            value_path,
            active_low,
        })
    }
}

impl Actuator for GpioRelay {
    fn set_relay(&mut self, state: RelayState) -> Result<()> {
        let high = (state == RelayState::On) != self.active_low;
        fs::write(&self.value_path, if high { "1" } else { "0" })
            .with_context(|| format!("writing {}", self.value_path.display()))
    }
}
