use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor unavailable")]
    Unavailable,
    #[error("reading out of range: {0}")]
    OutOfRange(f64),
    #[error("sensor io: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of the three greenhouse readings. Each call is one fresh sample.
pub trait SensorGateway {
    fn read_temperature(&mut self) -> Result<f32, SensorError>;
    fn read_humidity(&mut self) -> Result<f32, SensorError>;
    fn read_light(&mut self) -> Result<u16, SensorError>;
}

/// One pass over the gateway. `None` means that metric failed this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSample {
    pub temperature_celsius: Option<f32>,
    pub humidity_percent: Option<f32>,
    pub light_level: Option<u16>,
}

impl SensorSample {
    pub fn read(gateway: &mut dyn SensorGateway) -> SensorSample {
        SensorSample {
            temperature_celsius: checked("temperature", gateway.read_temperature()),
            humidity_percent: checked("humidity", gateway.read_humidity()),
            light_level: gateway
                .read_light()
                .map_err(|e| warn!("failed to read light sensor: {}", e))
                .ok(),
        }
    }
}

/// Keeps finite readings only; a NaN or infinity coming back as Ok is
/// still a failed read.
pub(crate) fn checked(metric: &str, reading: Result<f32, SensorError>) -> Option<f32> {
    match reading {
        Ok(v) if v.is_finite() => Some(v),
        Ok(v) => {
            warn!("failed to read {}: got {}", metric, v);
            None
        }
        Err(e) => {
            warn!("failed to read {}: {}", metric, e);
            None
        }
    }
}
