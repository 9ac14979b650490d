//! Ctrl+C latch shared between the signal listener and the installer loop.

use std::sync::atomic::{AtomicBool, Ordering};

/// What a delivered interrupt amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptRequest {
    /// First interrupt: finish the attempt in flight, then stop.
    Latched,
    /// Any later interrupt: abort immediately.
    Forced,
}

/// Two acquire-once flags. The first request latches, every later one
/// escalates to a forced abort.
#[derive(Debug, Default)]
pub struct InterruptLatch {
    requested: AtomicBool,
    forced: AtomicBool,
}

impl InterruptLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an interrupt. Safe to call from any thread.
    pub fn request(&self) -> InterruptRequest {
        if self
            .requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            InterruptRequest::Latched
        } else {
            self.forced.store(true, Ordering::Release);
            InterruptRequest::Forced
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn is_forced(&self) -> bool {
        self.forced.load(Ordering::Acquire)
    }
}
