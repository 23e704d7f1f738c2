//! Monotonic clock reads
//!
//! Both heartbeat emission and echo accounting read the same monotonic
//! clock, so a round trip is the plain difference of two readings.

/// Current monotonic time in microseconds
#[must_use]
pub fn monotonic_micros() -> u64 {
    use nix::time::{clock_gettime, ClockId};
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as u64 * 1_000_000 + ts.tv_nsec() as u64 / 1000,
        Err(_) => 0,
    }
}
