//! One-shot first-activation flag.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ActivationGuard {
    activated: AtomicBool,
}

impl ActivationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// True for the first caller only.
    pub fn try_activate(&self) -> bool {
        !self.activated.swap(true, Ordering::AcqRel)
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }
}
