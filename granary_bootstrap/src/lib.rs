// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Granary Bootstrap
//!
//! Pre-runtime plumbing for the granary server binary: a minimal logger
//! for the window before the tracing subscriber exists, and the shutdown
//! coordinator / cancellation token shared by the worker pool and the HTTP
//! server.
//!
//! The bootstrap layer deliberately knows nothing about the ingestion
//! domain; it is reusable process scaffolding.

// Re-export modules
pub mod logger;
pub mod shutdown;

// Re-export commonly used types
pub use logger::{BootstrapLogger, ConsoleLogger, NoOpLogger};
pub use shutdown::{shutdown_signal, CancellationToken, ShutdownCoordinator};
