#![deny(missing_docs)]
//! Shared logging utilities for the harvester workspace.
//!
//! This crate provides the `engine_*` logging macros used across the codebase,
//! a per-thread group context that prefixes every line logged while a group
//! is being harvested, and a minimal test initializer for the global logger.

use std::cell::RefCell;

thread_local! {
    /// Group key currently harvested by this thread, if any.
    static GROUP_CONTEXT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Guard returned by [`enter_group`]; restores the previous context on drop.
pub struct GroupScope {
    previous: Option<String>,
}

impl Drop for GroupScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        GROUP_CONTEXT.with(|ctx| *ctx.borrow_mut() = previous);
    }
}

/// Tags log lines emitted on this thread with `group_key` until the returned
/// guard is dropped.
///
/// The harvest loop runs on the thread that drives its runtime, so the
/// context follows the loop for the whole group.
pub fn enter_group(group_key: &str) -> GroupScope {
    let previous = GROUP_CONTEXT.with(|ctx| ctx.borrow_mut().replace(group_key.to_string()));
    GroupScope { previous }
}

/// Returns the group key set for the current thread, if any.
pub fn current_group() -> Option<String> {
    GROUP_CONTEXT.with(|ctx| ctx.borrow().clone())
}

/// Prefix prepended by the `engine_*` macros: `"[group] "` or empty.
#[doc(hidden)]
pub fn context_prefix() -> String {
    GROUP_CONTEXT.with(|ctx| match ctx.borrow().as_deref() {
        Some(group) => format!("[{group}] "),
        None => String::new(),
    })
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        log::trace!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        log::info!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        log::debug!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        log::warn!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        log::error!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
