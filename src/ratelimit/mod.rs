//! Per-task quantum tracking and the actor that owns it.

mod actor;
mod backend;
mod clock;
mod delay;
mod ledger;
mod limiter;

pub use backend::{allow, allow_slice, Limiter, UNIT_SLICE};
pub use delay::Delay;
pub use limiter::QuantumLimiter;
