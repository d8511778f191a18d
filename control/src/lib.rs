//! Control core of the greenhouse monitor.
//!
//! A [`schedule::Scheduler`] interleaves a one-second relay decision with a
//! half-hour telemetry upload. Clock, sensors, relay output and the upload
//! store are traits so the core runs the same against hardware and fakes.

pub mod clock;
pub mod relay;
pub mod schedule;
pub mod sensor;
pub mod telemetry;
pub mod uplink;
