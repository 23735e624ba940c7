//! quantum-rate - per-key time quantum limiter
//!
//! Callers ask whether a named task may consume a slice of a shared time
//! budget now. A single actor task owns the per-key ledger, answers each
//! request with either a grant or the delay until a grant is possible, and
//! incrementally sweeps keys whose budget has fully decayed.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use error::{LimiterError, Result};
pub use ratelimit::{allow, allow_slice, Delay, Limiter, QuantumLimiter};
