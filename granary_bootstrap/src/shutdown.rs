// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Graceful Shutdown Coordination
//!
//! This module provides the cancellation plumbing shared by the worker pool
//! and the HTTP server. A [`ShutdownCoordinator`] owns one
//! [`CancellationToken`]; clones of the token are handed to every
//! long-lived task. On SIGINT/SIGTERM the coordinator cancels the token,
//! workers finish their current chunk (never stopping mid-transaction) and
//! exit, and the coordinator waits for completion up to a grace period.
//!
//! No work is lost on cancellation: durable state lives in the database,
//! and on the next startup the lifecycle manager re-enqueues every chunk
//! still marked `queued`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Default grace period for graceful shutdown (in seconds)
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 5;

/// Clone-able cancellation signal for async tasks.
///
/// Tasks either poll [`CancellationToken::is_cancelled`] between work items
/// or race [`CancellationToken::cancelled`] against their work in a
/// `tokio::select!`.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    /// Creates a fresh, un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels this token and wakes every waiter
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Checks cancellation without blocking
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Waits until the token is cancelled.
    ///
    /// The notified future is registered before the flag is re-checked, so
    /// a cancel racing with this call can never be missed.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Coordinates graceful shutdown across the worker pool and server.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    grace_period: Duration,
    initiated: Arc<AtomicBool>,
    complete: Arc<Notify>,
}

impl ShutdownCoordinator {
    /// Creates a new coordinator with the given grace period
    pub fn new(grace_period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            grace_period,
            initiated: Arc::new(AtomicBool::new(false)),
            complete: Arc::new(Notify::new()),
        }
    }

    /// Gets a cancellation token to hand to a long-lived task
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Initiates graceful shutdown (idempotent)
    pub fn initiate_shutdown(&self) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::info!(grace_period = ?self.grace_period, "initiating graceful shutdown");
            self.token.cancel();
        }
    }

    /// Waits for shutdown to complete or the grace period to expire.
    ///
    /// Returns `true` if every task reported completion in time.
    pub async fn wait_for_shutdown(&self) -> bool {
        if !self.is_shutting_down() {
            return true;
        }
        tokio::select! {
            _ = self.complete.notified() => {
                tracing::info!("shutdown completed gracefully");
                true
            }
            _ = tokio::time::sleep(self.grace_period) => {
                tracing::warn!("shutdown grace period expired, forcing exit");
                false
            }
        }
    }

    /// Signals that all cleanup is done
    pub fn complete_shutdown(&self) {
        self.complete.notify_waiters();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS))
    }
}

/// Resolves when the process receives SIGINT (Ctrl-C) or, on unix, SIGTERM.
///
/// Installation failures are logged and the future then never resolves;
/// the caller keeps running without signal-driven shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::task::yield_now().await;
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_coordinator_completes_within_grace() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.initiate_shutdown();
        let waiter = coordinator.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_shutdown().await });
        tokio::task::yield_now().await;
        coordinator.complete_shutdown();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_coordinator_times_out() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        coordinator.initiate_shutdown();
        assert!(!coordinator.wait_for_shutdown().await);
    }

    #[test]
    fn test_initiate_is_idempotent() {
        let coordinator = ShutdownCoordinator::default();
        coordinator.initiate_shutdown();
        coordinator.initiate_shutdown();
        assert!(coordinator.is_shutting_down());
    }
}
