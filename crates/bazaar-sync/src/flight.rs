//! Single-flight flag for background passes (drain, refresh).
//!
//! A second pass that starts while one is running is skipped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub(crate) struct SingleFlight {
    running: AtomicBool,
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Claims the flag, or returns `None` if a pass is already running.
    pub(crate) fn try_begin(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightGuard {
                running: &self.running,
            })
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Releases the flag on drop, including on early return and panic.
#[derive(Debug)]
pub(crate) struct FlightGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_one_holder() {
        let flight = SingleFlight::new();
        let guard = flight.try_begin();
        assert!(guard.is_some());
        assert!(flight.is_running());
        assert!(flight.try_begin().is_none());

        drop(guard);
        assert!(!flight.is_running());
        assert!(flight.try_begin().is_some());
    }
}
