//! Atomic flow control window.

use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// A signed byte-credit counter.
///
/// The only mutator is [`Window::update`], an atomic fetch-and-add returning
/// the value observed *before* the addition. Negative values are legal: a
/// peer shrinking INITIAL_WINDOW_SIZE can leave a window in debt. Addition
/// wraps rather than panicking; range checks belong to the frame decoder.
#[derive(Default)]
pub struct Window(AtomicI32);

impl Window {
    pub fn new(initial: i32) -> Self {
        Self(AtomicI32::new(initial))
    }

    /// Add `delta` and return the previous value.
    pub fn update(&self, delta: i32) -> i32 {
        self.0.fetch_add(delta, Ordering::AcqRel)
    }

    /// Current value.
    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Window({})", self.get())
    }
}

/// Clamp a byte length into the signed window domain.
pub(crate) fn length_delta(length: usize) -> i32 {
    i32::try_from(length).unwrap_or(i32::MAX)
}
