//! Shared program state, published to the admin endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::store;

/// Health is written by the observer loop and read by the admin
/// endpoint, so it is published atomically.
pub struct ProgramState {
    pub command: &'static str,
    pub started: i64,
    healthy: AtomicBool,
}

impl ProgramState {
    pub fn new(command: &'static str) -> Arc<Self> {
        Arc::new(Self {
            command,
            started: store::now_ms(),
            healthy: AtomicBool::new(true),
        })
    }

    pub fn started_iso(&self) -> String {
        store::iso(self.started)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    pub fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_flag_round_trips() {
        let state = ProgramState::new("observer");
        assert!(state.healthy());
        state.set_healthy(false);
        assert!(!state.healthy());
    }
}
