// NOTE: Exporting macros in Rust is a bit weird. `#[macro_export]` causes them to be exported to
//       the crate root, but that makes it difficult to include just the macros without using
//       `#[macro_use] extern crate modhost;`. That's why the macros are also re-exported from this
//       module.

/// Log an informational line. Thin wrapper so every call site goes through one place, matching
/// the rest of the crate's logging conventions.
#[macro_export]
macro_rules! host_log {
    ($($args:tt)*) => (
        $crate::log::info!($($args)*)
    );
}
pub use host_log;

/// Log an error. Used for conditions that abort a control-surface operation or a startup step.
#[macro_export]
macro_rules! host_error {
    ($($args:tt)*) => (
        $crate::log::error!($($args)*)
    );
}
pub use host_error;

/// Log a debug-level diagnostic. Never called from an RT thread; see the process callback and
/// RT pool modules for how RT-side diagnostics are instead recorded as atomic counters.
#[macro_export]
macro_rules! host_debug {
    ($($args:tt)*) => (
        $crate::log::debug!($($args)*)
    );
}
pub use host_debug;

/// A `debug_assert!()` analogue that logs instead of panicking, mirroring the original
/// implementation's preference for staying up under malformed but non-fatal host input.
#[macro_export]
macro_rules! host_debug_assert {
    ($cond:expr $(,)?) => (
        if cfg!(debug_assertions) && !$cond {
            $crate::log::debug!(concat!("Debug assertion failed: ", stringify!($cond)));
        }
    );
    ($cond:expr, $format:expr $(, $($args:tt)*)?) => (
        if cfg!(debug_assertions) && !$cond {
            $crate::log::debug!(concat!("Debug assertion failed: ", stringify!($cond), ", ", $format), $($($args)*)?);
        }
    );
}
pub use host_debug_assert;
