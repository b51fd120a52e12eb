use std::time::{Duration, Instant};

use agelens_core::{DisplaySpace, Size};

/// Collapses a burst of resize events into one layout update.
///
/// The latest size is released once `delay` has passed without another
/// resize. Time is passed in by the caller.
#[derive(Debug, Clone)]
pub struct ResizeDebouncer {
    delay: Duration,
    pending: Option<(Size<DisplaySpace>, Instant)>,
}

impl ResizeDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    /// Record a resize at `now`, restarting the quiet period.
    pub fn resize(&mut self, size: Size<DisplaySpace>, now: Instant) {
        self.pending = Some((size, now));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Release the pending size if the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Size<DisplaySpace>> {
        let (size, at) = self.pending?;
        if now.saturating_duration_since(at) >= self.delay {
            self.pending = None;
            Some(size)
        } else {
            None
        }
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}
