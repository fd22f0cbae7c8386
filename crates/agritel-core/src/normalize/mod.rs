//! Normalisers: map a typed payload onto a [`WriteSet`](crate::write::WriteSet).
//!
//! Both normalisers are pure functions of the envelope; they never touch the
//! database.

pub mod iot;
pub mod weather;

pub use iot::{ActuatorState, derive_actuator_state, normalize_iot};
pub use weather::normalize_weather;
