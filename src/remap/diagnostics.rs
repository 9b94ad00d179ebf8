//! Injected diagnostics sink for remap calls.
//!
//! Remappers never log through a global handle: every message goes through
//! the [`Diagnostics`] value carried by the call's options. The default sink
//! forwards to the `log` facade.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use meshpair::remap::Diagnostics;
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let diagnostics = Diagnostics::new(move |level, message| {
//!     sink.lock().unwrap().push((level, message.to_string()));
//! });
//!
//! diagnostics.warn("something odd");
//! assert_eq!(seen.lock().unwrap().len(), 1);
//! ```

use std::sync::Arc;

pub use log::Level;

/// A cloneable, thread-safe message sink.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn Fn(Level, &str) + Send + Sync>,
}

impl Diagnostics {
    /// Create a sink from a callback.
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(Level, &str) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// A sink that forwards to the `log` crate under the `meshpair::remap` target.
    pub fn log() -> Self {
        Self::new(|level, message| log::log!(target: "meshpair::remap", level, "{message}"))
    }

    /// A sink that discards every message.
    pub fn none() -> Self {
        Self::new(|_, _| {})
    }

    /// Emit a message at `level`.
    #[inline]
    pub fn emit(&self, level: Level, message: &str) {
        (self.sink)(level, message);
    }

    /// Emit a warning.
    #[inline]
    pub fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    /// Emit a debug message.
    #[inline]
    pub fn debug(&self, message: &str) {
        self.emit(Level::Debug, message);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::log()
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

/// Test helper collecting every message.
#[cfg(test)]
pub(crate) fn capture() -> (Diagnostics, Arc<std::sync::Mutex<Vec<(Level, String)>>>) {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let diagnostics = Diagnostics::new(move |level, message| {
        sink.lock().unwrap().push((level, message.to_string()));
    });
    (diagnostics, seen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_reach_sink() {
        let (diagnostics, seen) = capture();
        diagnostics.warn("w");
        diagnostics.debug("d");
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], (Level::Warn, "w".to_string()));
        assert_eq!(seen[1], (Level::Debug, "d".to_string()));
    }

    #[test]
    fn test_none_discards() {
        Diagnostics::none().warn("dropped");
        Diagnostics::default().debug("forwarded to log");
    }
}
