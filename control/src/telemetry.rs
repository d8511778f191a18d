use crate::clock::{ClockSource, Timestamp};
use crate::sensor::{SensorGateway, SensorSample};
use crate::uplink::{Fields, UplinkError, UplinkSink};
use tracing::{info, warn};

/// Marker stored for a temperature or humidity that could not be read.
pub const NAN_MARKER: &str = "nan";
/// Stored for a failed light read; raw ADC values are never negative.
pub const LIGHT_UNAVAILABLE: i32 = -1;

pub const DEFAULT_RECORDS_PREFIX: &str = "/UsersData";

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub path: String,
    pub fields: Fields,
}

impl TelemetryRecord {
    /// Keyed by `<base>/<timestamp>`. The key has minute resolution, so two
    /// records inside the same minute land on the same path.
    pub fn new(base: &str, time: &Timestamp, sample: &SensorSample) -> TelemetryRecord {
        let time = time.to_string();
        let mut fields = Fields::new();
        fields.insert("temperature".into(), render_metric(sample.temperature_celsius));
        fields.insert("humidity".into(), render_metric(sample.humidity_percent));
        fields.insert(
            "lightLevel".into(),
            sample
                .light_level
                .map_or(LIGHT_UNAVAILABLE, i32::from)
                .to_string(),
        );
        fields.insert("time".into(), time.clone());
        TelemetryRecord {
            path: format!("{}/{}", base, time),
            fields,
        }
    }
}

fn render_metric(value: Option<f32>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => NAN_MARKER.to_string(),
    }
}

/// Result of one telemetry tick. The record is gone after this; a failed
/// upload is not retried.
#[derive(Debug)]
pub struct Upload {
    pub record: TelemetryRecord,
    pub result: Result<(), UplinkError>,
}

pub struct TelemetryRecorder<C, U> {
    clock: C,
    sink: U,
    base: String,
}

impl<C: ClockSource, U: UplinkSink> TelemetryRecorder<C, U> {
    pub fn new(clock: C, sink: U, prefix: &str, device_id: &str) -> Self {
        TelemetryRecorder {
            clock,
            sink,
            base: format!("{}/{}/readings", prefix.trim_end_matches('/'), device_id),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base
    }

    pub fn on_telemetry_tick(&mut self, sensors: &mut dyn SensorGateway) -> Upload {
        if !self.clock.update() {
            warn!("clock update failed, using last known time");
        }
        let time = self.clock.timestamp();
        info!("telemetry at {}", time);

        let sample = SensorSample::read(sensors);
        let record = TelemetryRecord::new(&self.base, &time, &sample);

        let result = self.sink.set_record(&record.path, &record.fields);
        match &result {
            Ok(()) => info!("uploaded {}", record.path),
            Err(e) => warn!("failed to upload {}: {}", record.path, e),
        }
        Upload { record, result }
    }

    #[cfg(test)]
    pub(crate) fn sink(&self) -> &U {
        &self.sink
    }

    #[cfg(test)]
    pub(crate) fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}
