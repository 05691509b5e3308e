//! Process-wide debug flag.
//!
//! Read on every dispatch by debug layers such as
//! [`toolkit::Debugger`](crate::toolkit::Debugger). Off by default.

use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG: AtomicBool = AtomicBool::new(false);

/// Turns debug mode on or off for the whole process.
pub fn set(on: bool) {
    DEBUG.store(on, Ordering::Relaxed);
    tracing::debug!(debug = on, "debug mode changed");
}

/// Whether debug mode is currently on.
pub fn enabled() -> bool {
    DEBUG.load(Ordering::Relaxed)
}
