use crate::clock::ClockSource;
use crate::relay::{Actuator, RelayController, RelayState};
use crate::sensor::SensorGateway;
use crate::telemetry::{TelemetryRecorder, Upload};
use crate::uplink::UplinkSink;

pub const CONTROL_INTERVAL_MS: u32 = 1000;
pub const TELEMETRY_INTERVAL_MS: u32 = 1_800_000;

/// Fires once `interval` ms have elapsed since the last fire. Missed periods
/// are skipped, never queued. `now` is a wrapping millisecond counter.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    interval: u32,
    last_fire: Option<u32>,
}

impl Timer {
    /// A new timer fires on its first poll.
    pub fn new(interval: u32) -> Self {
        Timer {
            interval,
            last_fire: None,
        }
    }

    pub fn poll(&mut self, now: u32) -> bool {
        let due = match self.last_fire {
            None => true,
            Some(last) => now.wrapping_sub(last) >= self.interval,
        };
        if due {
            self.last_fire = Some(now);
        }
        due
    }
}

/// What a single tick did. `None` means the task was not due.
#[derive(Debug, Default)]
pub struct Tick {
    pub relay: Option<RelayState>,
    pub upload: Option<Upload>,
}

/// Cooperative two-rate loop: a fast control task and a slow telemetry task
/// sharing one sensor gateway. `tick` never blocks on its own; it is only as
/// slow as the collaborators it calls.
pub struct Scheduler<S, A, C, U> {
    sensors: S,
    relay: RelayController<A>,
    recorder: TelemetryRecorder<C, U>,
    control_timer: Timer,
    telemetry_timer: Timer,
}

impl<S, A, C, U> Scheduler<S, A, C, U>
where
    S: SensorGateway,
    A: Actuator,
    C: ClockSource,
    U: UplinkSink,
{
    pub fn new(
        sensors: S,
        relay: RelayController<A>,
        recorder: TelemetryRecorder<C, U>,
        control_interval: u32,
        telemetry_interval: u32,
    ) -> Self {
        Scheduler {
            sensors,
            relay,
            recorder,
            control_timer: Timer::new(control_interval),
            telemetry_timer: Timer::new(telemetry_interval),
        }
    }

    /// Closes the valve before the first tick decides anything.
    pub fn start(&mut self) {
        self.relay.force(RelayState::Off);
    }

    /// Leaves the valve closed once the loop stops.
    pub fn shutdown(&mut self) {
        self.relay.force(RelayState::Off);
    }

    /// Control runs before telemetry when both are due.
    pub fn tick(&mut self, now: u32) -> Tick {
        let mut tick = Tick::default();
        if self.control_timer.poll(now) {
            tick.relay = Some(self.relay.on_control_tick(&mut self.sensors));
        }
        if self.telemetry_timer.poll(now) {
            tick.upload = Some(self.recorder.on_telemetry_tick(&mut self.sensors));
        }
        tick
    }

    pub fn relay(&self) -> &RelayController<A> {
        &self.relay
    }

    #[cfg(test)]
    pub(crate) fn sensors_mut(&mut self) -> &mut S {
        &mut self.sensors
    }

    #[cfg(test)]
    pub(crate) fn recorder(&self) -> &TelemetryRecorder<C, U> {
        &self.recorder
    }
}
