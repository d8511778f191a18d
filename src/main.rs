mod config;
mod hw;

use anyhow::{Context, Result};
use config::{Config, RelayConfig, UplinkConfig};
use greenhouse_control::clock::SystemClock;
use greenhouse_control::relay::{Actuator, RelayController, ThresholdPolicy, UdpRelay};
use greenhouse_control::schedule::Scheduler;
use greenhouse_control::telemetry::TelemetryRecorder;
use greenhouse_control::uplink::{FileUplink, UdpUplink, UplinkSink};
use hw::{GpioRelay, IioSensors};
use std::time::{Duration, Instant};
use tracing::info;

type Device = Scheduler<IioSensors, Box<dyn Actuator>, SystemClock, Box<dyn UplinkSink>>;

fn build_actuator(relay: &RelayConfig) -> Result<Box<dyn Actuator>> {
    Ok(match relay {
        RelayConfig::Gpio {
            value_path,
            active_low,
        } => Box::new(GpioRelay::new(value_path.clone(), *active_low)?),
        RelayConfig::Udp { host } => Box::new(UdpRelay::new(host)?),
    })
}

fn build_uplink(uplink: &UplinkConfig) -> Result<Box<dyn UplinkSink>> {
    Ok(match uplink {
        UplinkConfig::File { root } => Box::new(FileUplink::new(root.clone())),
        UplinkConfig::Udp { addr, timeout_ms } => Box::new(
            UdpUplink::new(addr, Duration::from_millis(*timeout_ms))
                .with_context(|| format!("opening uplink to {}", addr))?,
        ),
    })
}

fn build_device(config: &Config) -> Result<Device> {
    let relay = RelayController::new(
        build_actuator(&config.relay).context("relay bring-up")?,
        ThresholdPolicy {
            threshold: config.threshold_celsius,
            hysteresis: config.hysteresis_celsius,
        },
    );
    let recorder = TelemetryRecorder::new(
        SystemClock::new(config.utc_offset_secs),
        build_uplink(&config.uplink).context("uplink bring-up")?,
        &config.records_prefix,
        &config.device_id,
    );
    info!("records go to {}", recorder.base_path());
    Ok(Scheduler::new(
        IioSensors::new(config.sensors.clone()),
        relay,
        recorder,
        config.control_interval_ms,
        config.telemetry_interval_ms,
    ))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::load()?;
    let mut device = build_device(&config)?;

    device.start();
    info!(
        "system initialized: control every {}ms, telemetry every {}ms",
        config.control_interval_ms, config.telemetry_interval_ms
    );

    let start = Instant::now();
    let loop_delay = Duration::from_millis(config.loop_delay_ms);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        // Wraps after ~49.7 days; the scheduler compares with wrapping_sub.
        let now = start.elapsed().as_millis() as u32;
        device.tick(now);

        tokio::select! {
            _ = &mut shutdown => break,
            _ = tokio::time::sleep(loop_delay) => {}
        }
    }

    info!("shutting down, water supply OFF");
    device.shutdown();
    Ok(())
}
