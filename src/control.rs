//! Process-wide control flags (spec §4.9): pause/resume and uptime.
//!
//! While paused, mutating operations return [`crate::CortexError::Paused`]
//! without touching the store; reads are unaffected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

pub struct ControlState {
    paused: AtomicBool,
    started_at: Instant,
}

impl ControlState {
    pub fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
            started_at: Instant::now(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Human-formatted uptime, e.g. "2d 3h 14m 02s".
    pub fn uptime_human(&self) -> String {
        let secs = self.uptime().as_secs();
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;
        if days > 0 {
            format!("{days}d {hours}h {mins:02}m {secs:02}s")
        } else if hours > 0 {
            format!("{hours}h {mins:02}m {secs:02}s")
        } else {
            format!("{mins}m {secs:02}s")
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unpaused() {
        let state = ControlState::new();
        assert!(!state.is_paused());
    }

    #[test]
    fn pause_resume_roundtrip() {
        let state = ControlState::new();
        state.pause();
        assert!(state.is_paused());
        state.resume();
        assert!(!state.is_paused());
    }
}
