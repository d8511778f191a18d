use crate::sensor::{checked, SensorGateway};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::UdpSocket;
use tracing::{info, warn};

pub const DEFAULT_THRESHOLD_CELSIUS: f32 = 28.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayState {
    On,
    Off,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelayState::On => "ON",
            RelayState::Off => "OFF",
        })
    }
}

/// Binary output driving the valve. There is no read-back.
pub trait Actuator {
    fn set_relay(&mut self, state: RelayState) -> Result<()>;
}

impl<T: Actuator + ?Sized> Actuator for Box<T> {
    fn set_relay(&mut self, state: RelayState) -> Result<()> {
        (**self).set_relay(state)
    }
}

#[derive(Serialize)]
struct RelayCommand {
    state: RelayState,
}

/// Relay board reachable over UDP, one JSON datagram per command.
pub struct UdpRelay {
    socket: UdpSocket,
    addr: String,
}

impl UdpRelay {
    pub fn new(host: &str) -> Result<UdpRelay> {
        Ok(UdpRelay {
            socket: UdpSocket::bind("0.0.0.0:0")?,
            addr: host.to_owned() + ":4210",
        })
    }
}

impl Actuator for UdpRelay {
    fn set_relay(&mut self, state: RelayState) -> Result<()> {
        let out_bytes = serde_json::to_vec(&RelayCommand { state })?;
        self.socket.send_to(&out_bytes, &self.addr)?;
        Ok(())
    }
}

/// Threshold policy with an optional hysteresis band below the threshold.
///
/// Turns ON strictly above `threshold` and OFF at or below
/// `threshold - hysteresis`; inside the band the current state is kept.
/// A zero band is a plain threshold and will chatter at the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdPolicy {
    pub threshold: f32,
    pub hysteresis: f32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy {
            threshold: DEFAULT_THRESHOLD_CELSIUS,
            hysteresis: 0.0,
        }
    }
}

impl ThresholdPolicy {
    pub fn decide(&self, temp: f32, current: RelayState) -> RelayState {
        if temp > self.threshold {
            RelayState::On
        } else if temp <= self.threshold - self.hysteresis {
            RelayState::Off
        } else {
            current
        }
    }
}

pub struct RelayController<A> {
    actuator: A,
    policy: ThresholdPolicy,
    state: RelayState,
}

impl<A: Actuator> RelayController<A> {
    pub fn new(actuator: A, policy: ThresholdPolicy) -> Self {
        RelayController {
            actuator,
            policy,
            state: RelayState::Off,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Drives the relay to `state` regardless of the temperature.
    pub fn force(&mut self, state: RelayState) {
        self.actuate(state);
    }

    pub fn on_control_tick(&mut self, sensors: &mut dyn SensorGateway) -> RelayState {
        let Some(temp) = checked("temperature for water control", sensors.read_temperature())
        else {
            return self.state;
        };

        let next = self.policy.decide(temp, self.state);
        info!("{:.2} water supply {}", temp, next);
        self.actuate(next);
        self.state
    }

    fn actuate(&mut self, state: RelayState) {
        // Actuated every time, even when unchanged; the output is level-driven.
        if let Err(e) = self.actuator.set_relay(state) {
            warn!("relay {} command failed: {:#}", state, e);
        }
        self.state = state;
    }

    #[cfg(test)]
    pub(crate) fn actuator(&self) -> &A {
        &self.actuator
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sensor::tests::FakeSensors;

    #[derive(Default)]
    pub struct RecordingActuator {
        pub commands: Vec<RelayState>,
    }

    impl Actuator for RecordingActuator {
        fn set_relay(&mut self, state: RelayState) -> Result<()> {
            self.commands.push(state);
            Ok(())
        }
    }

    fn controller(hysteresis: f32) -> RelayController<RecordingActuator> {
        RelayController::new(
            RecordingActuator::default(),
            ThresholdPolicy {
                threshold: 28.0,
                hysteresis,
            },
        )
    }

    fn tick_with(c: &mut RelayController<RecordingActuator>, t: Option<f32>) -> RelayState {
        let mut sensors = FakeSensors::default();
        sensors.push(t, None, None);
        c.on_control_tick(&mut sensors)
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let mut c = controller(0.0);
        assert_eq!(tick_with(&mut c, Some(28.01)), RelayState::On);
        assert_eq!(tick_with(&mut c, Some(28.0)), RelayState::Off);
        assert_eq!(tick_with(&mut c, Some(-5.0)), RelayState::Off);
        assert_eq!(tick_with(&mut c, Some(40.0)), RelayState::On);
    }

    #[test]
    fn unavailable_reading_keeps_state() {
        let mut c = controller(0.0);
        tick_with(&mut c, Some(30.0));
        assert_eq!(tick_with(&mut c, None), RelayState::On);
        assert_eq!(tick_with(&mut c, Some(f32::NAN)), RelayState::On);
        // No actuation happens on a failed read.
        assert_eq!(c.actuator().commands, vec![RelayState::On]);
    }

    #[test]
    fn infinite_reading_keeps_state() {
        let mut c = controller(0.0);
        assert_eq!(tick_with(&mut c, Some(f32::INFINITY)), RelayState::Off);
        tick_with(&mut c, Some(30.0));
        assert_eq!(tick_with(&mut c, Some(f32::INFINITY)), RelayState::On);
        assert_eq!(tick_with(&mut c, Some(f32::NEG_INFINITY)), RelayState::On);
        assert_eq!(c.actuator().commands, vec![RelayState::On]);
    }

    #[test]
    fn force_overrides_decided_state() {
        let mut c = controller(0.0);
        tick_with(&mut c, Some(35.0));
        assert_eq!(c.state(), RelayState::On);

        c.force(RelayState::Off);
        assert_eq!(c.state(), RelayState::Off);
        assert_eq!(c.actuator().commands, vec![RelayState::On, RelayState::Off]);
    }

    #[test]
    fn same_reading_is_idempotent() {
        let mut c = controller(0.0);
        for _ in 0..5 {
            assert_eq!(tick_with(&mut c, Some(31.5)), RelayState::On);
        }
        assert_eq!(c.actuator().commands, vec![RelayState::On; 5]);
    }

    #[test]
    fn boundary_chatter_without_hysteresis() {
        let mut c = controller(0.0);
        let states: Vec<_> = [28.1, 28.0, 28.1, 28.0]
            .iter()
            .map(|t| tick_with(&mut c, Some(*t)))
            .collect();
        assert_eq!(
            states,
            vec![RelayState::On, RelayState::Off, RelayState::On, RelayState::Off]
        );
    }

    #[test]
    fn hysteresis_band_holds_state() {
        let mut c = controller(1.0);
        assert_eq!(tick_with(&mut c, Some(28.5)), RelayState::On);
        assert_eq!(tick_with(&mut c, Some(27.5)), RelayState::On);
        assert_eq!(tick_with(&mut c, Some(27.0)), RelayState::Off);
        assert_eq!(tick_with(&mut c, Some(27.9)), RelayState::Off);
        assert_eq!(tick_with(&mut c, Some(28.2)), RelayState::On);
    }

    #[test]
    fn relay_command_wire_format() {
        let json = serde_json::to_string(&RelayCommand {
            state: RelayState::On,
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"ON"}"#);
    }
}
