// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Logger
//!
//! A minimal logging abstraction for the window before the tracing
//! subscriber is installed: configuration parsing, database bootstrap and
//! early failures. Once the application is up, everything logs through
//! `tracing`; this trait exists so bootstrap code stays testable and never
//! depends on a live subscriber.

use std::fmt;

/// Minimal logger for pre-runtime bootstrap code.
pub trait BootstrapLogger: Send + Sync {
    /// Logs an error message
    fn error(&self, message: &str);

    /// Logs a warning message
    fn warn(&self, message: &str);

    /// Logs an informational message
    fn info(&self, message: &str);
}

/// Logger that writes to stderr with an optional prefix.
pub struct ConsoleLogger {
    prefix: String,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self::with_prefix("granary")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn write(&self, level: &str, message: &str) {
        eprintln!("[{}] {}: {}", self.prefix, level, message);
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl BootstrapLogger for ConsoleLogger {
    fn error(&self, message: &str) {
        self.write("ERROR", message);
    }

    fn warn(&self, message: &str) {
        self.write("WARN", message);
    }

    fn info(&self, message: &str) {
        self.write("INFO", message);
    }
}

/// Logger that discards everything. Used in tests.
#[derive(Default)]
pub struct NoOpLogger;

impl NoOpLogger {
    pub fn new() -> Self {
        Self
    }
}

impl BootstrapLogger for NoOpLogger {
    fn error(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
}

impl fmt::Debug for ConsoleLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleLogger")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_logger_is_silent() {
        let logger = NoOpLogger::new();
        logger.error("ignored");
        logger.warn("ignored");
        logger.info("ignored");
    }

    #[test]
    fn test_console_logger_constructs_with_prefix() {
        let logger = ConsoleLogger::with_prefix("bootstrap-test");
        logger.info("starting");
    }
}
