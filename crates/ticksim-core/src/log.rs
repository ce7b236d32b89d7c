//! Logging facilities.

use atty::Stream;
use colored::{Color, ColoredString, Colorize};
use log::error;
use serde_json::json;

/// Applies the color to the string if stderr (log) goes to console.
pub fn get_colored(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_at {
    ($level:ident, $label:literal, $pad:literal, $color:ident, $ctx:expr, $msg:expr) => (
        log::$level!(
            target: $ctx.name(),
            concat!("[{} {}", $pad, "{}] {}"),
            $ctx.time(), $crate::log::get_colored($label, $crate::colored::Color::$color), $ctx.name(), $msg
        )
    );
    ($level:ident, $label:literal, $pad:literal, $color:ident, $ctx:expr, $format:expr, $($arg:tt)+) => (
        log::$level!(
            target: $ctx.name(),
            concat!("[{} {}", $pad, "{}] ", $format),
            $ctx.time(), $crate::log::get_colored($label, $crate::colored::Color::$color), $ctx.name(), $($arg)+
        )
    );
}

/// Logs a message at the info level as `[<tick> INFO  <component>] <message>`.
///
/// The first argument is anything with `name()` and `time()` methods, usually a
/// [`SimulationContext`](crate::SimulationContext). The other log macros take the same arguments.
///
/// ```rust
/// use ticksim_core::{log_info, Simulation};
///
/// let mut sim = Simulation::new(123);
/// let ctx = sim.create_context("comp");
/// log_info!(ctx, "started with {} workers", 4);
/// ```
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => ($crate::__log_at!(info, "INFO", "  ", Green, $($arg)+));
}

/// Logs a message at the debug level.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => ($crate::__log_at!(debug, "DEBUG", " ", Blue, $($arg)+));
}

/// Logs a message at the trace level.
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)+) => ($crate::__log_at!(trace, "TRACE", " ", Cyan, $($arg)+));
}

/// Logs a message at the warn level.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => ($crate::__log_at!(warn, "WARN", "  ", Yellow, $($arg)+));
}

/// Logs a message at the error level.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => ($crate::__log_at!(error, "ERROR", " ", Red, $($arg)+));
}

/// Logs a tick which could not be delivered because the subscriber handler is gone.
pub(crate) fn log_undelivered_tick(tick: u64, name: &str, id: u32) {
    error!(
        target: "simulation",
        "[{} {} simulation] Undelivered tick: {}",
        tick,
        get_colored("ERROR", Color::Red),
        json!({"subscriber": name, "id": id})
    );
}

/// Logs an attempt to re-arm a subscription with invalid frequency.
pub(crate) fn log_invalid_frequency(tick: u64, name: &str, frequency: u64) {
    error!(
        target: "simulation",
        "[{} {} simulation] Invalid frequency: {}",
        tick,
        get_colored("ERROR", Color::Red),
        json!({"subscriber": name, "frequency": frequency})
    );
}
