// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session lifecycle: connect, disconnect, keep-alive and reconnection.
//!
//! # State machine
//!
//! ```text
//!                 connect()
//!  Disconnected ─────────────► Connecting ──── ok ────► Connected
//!       ▲                          │                      │   ▲
//!       │◄──────── failure ────────┘         bad keep-alive   │ reconnect ok
//!       │                                                 ▼   │
//!       │◄──────────────── reconnect failed ──────── Reconnecting
//!       │
//!       └──────── Disconnecting ◄──── disconnect() (from any live state)
//! ```
//!
//! # Shared state
//!
//! - The live session sits in a `parking_lot::RwLock<Option<Arc<Handle>>>`.
//!   Callers clone the `Arc` out and never hold the lock across an await, so
//!   they always observe either the old session or its replacement.
//! - A `tokio::sync::Mutex<Lifecycle>` serializes connect, disconnect and the
//!   reconnect swap. It owns the reconnect slot, which holds at most one
//!   reconnect handler, and the ids of the subscriptions disconnect must
//!   delete.
//! - Health reports arrive through a [`KeepAliveSender`] handed to the
//!   provider at connect time. A monitor task drains the channel, so the
//!   provider's health check never waits on this crate.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::ClientConfig;
use crate::error::{ConnectionError, ProviderError, ServerError, TimeoutError, UaError, UaResult};
use crate::provider::{
    KeepAliveEvent, KeepAliveSender, SessionHandle, SessionProvider, SessionRequest,
};
use crate::status::StatusCode;
use crate::subscription::SubscriptionId;

// =============================================================================
// ConnectionState
// =============================================================================

/// State of the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// Session creation in progress.
    Connecting,
    /// Session live.
    Connected,
    /// Keep-alive failed; the provider is re-establishing the session.
    Reconnecting,
    /// Session teardown in progress.
    Disconnecting,
}

impl ConnectionState {
    /// Returns `true` while a session handle is installed.
    pub fn has_session(&self) -> bool {
        matches!(self, Self::Connected | Self::Reconnecting)
    }

    /// Returns the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer notified of every state transition as `(from, to)`.
pub type StateObserver = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

// =============================================================================
// ConnectionStats
// =============================================================================

/// Connection lifecycle counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    connects: AtomicU64,
    connect_failures: AtomicU64,
    disconnects: AtomicU64,
    keep_alive_failures: AtomicU64,
    reconnects_started: AtomicU64,
    reconnects_succeeded: AtomicU64,
    reconnects_failed: AtomicU64,
}

impl ConnectionStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn record_keep_alive_failure(&self) {
        self.keep_alive_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect_started(&self) {
        self.reconnects_started.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect_succeeded(&self) {
        self.reconnects_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_reconnect_failed(&self) {
        self.reconnects_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Successful connects.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Failed connects.
    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
    }

    /// Sessions torn down by disconnect or reconnect.
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Bad keep-alive reports received.
    pub fn keep_alive_failures(&self) -> u64 {
        self.keep_alive_failures.load(Ordering::Relaxed)
    }

    /// Reconnect attempts started.
    pub fn reconnects_started(&self) -> u64 {
        self.reconnects_started.load(Ordering::Relaxed)
    }

    /// Reconnect attempts that installed a new session.
    pub fn reconnects_succeeded(&self) -> u64 {
        self.reconnects_succeeded.load(Ordering::Relaxed)
    }

    /// Reconnect attempts the provider gave up on.
    pub fn reconnects_failed(&self) -> u64 {
        self.reconnects_failed.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// In-flight reconnection.
///
/// Exists only between keep-alive failure detection and the end of the
/// provider's reconnect.
#[derive(Debug)]
struct ReconnectHandler {
    generation: u64,
    trigger: StatusCode,
    started_at: Instant,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Lifecycle {
    /// Bumped by every connect and teardown; stale reconnects compare against it.
    generation: u64,
    reconnect: Option<ReconnectHandler>,
    keep_alive_task: Option<JoinHandle<()>>,
    subscriptions: Vec<SubscriptionId>,
}

impl Lifecycle {
    fn stop_background_tasks(&mut self) {
        if let Some(handler) = self.reconnect.take() {
            debug!(
                trigger = %handler.trigger,
                elapsed_ms = handler.started_at.elapsed().as_millis() as u64,
                "Abandoning reconnect"
            );
            handler.task.abort();
        }
        if let Some(task) = self.keep_alive_task.take() {
            task.abort();
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.stop_background_tasks();
    }
}

// =============================================================================
// ConnectionManager
// =============================================================================

struct Inner<P: SessionProvider> {
    provider: Arc<P>,
    request: SessionRequest,
    session: RwLock<Option<Arc<P::Handle>>>,
    state: RwLock<ConnectionState>,
    /// Set when reconnection gave up; cleared by connect and disconnect.
    lost: AtomicBool,
    observer: RwLock<Option<StateObserver>>,
    lifecycle: Mutex<Lifecycle>,
    stats: ConnectionStats,
}

/// Owns the one live session of a client.
///
/// Cloning is cheap; clones share the session.
pub struct ConnectionManager<P: SessionProvider> {
    inner: Arc<Inner<P>>,
}

impl<P: SessionProvider> Clone for ConnectionManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: SessionProvider> fmt::Debug for ConnectionManager<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("provider", &self.inner.provider.name())
            .field("endpoint", &self.inner.request.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl<P: SessionProvider> ConnectionManager<P> {
    /// Creates a manager that opens sessions described by `request`.
    pub fn new(provider: Arc<P>, request: SessionRequest) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                request,
                session: RwLock::new(None),
                state: RwLock::new(ConnectionState::Disconnected),
                lost: AtomicBool::new(false),
                observer: RwLock::new(None),
                lifecycle: Mutex::new(Lifecycle::default()),
                stats: ConnectionStats::new(),
            }),
        }
    }

    /// Creates a manager from a client configuration.
    pub fn from_config(provider: Arc<P>, config: &ClientConfig) -> Self {
        Self::new(provider, config.session_request())
    }

    /// Installs an observer for state transitions.
    pub fn set_state_observer<F>(&self, observer: F)
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        *self.inner.observer.write() = Some(Arc::new(observer));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the provider.
    pub fn provider(&self) -> &Arc<P> {
        &self.inner.provider
    }

    /// Returns the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.inner.request.endpoint
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Returns the lifecycle counters.
    pub fn stats(&self) -> &ConnectionStats {
        &self.inner.stats
    }

    /// Returns `true` iff a session exists and reports itself connected.
    pub fn is_connected(&self) -> bool {
        self.inner
            .session
            .read()
            .as_ref()
            .is_some_and(|session| session.is_connected())
    }

    /// Returns `true` while a reconnect is in flight.
    pub async fn is_reconnecting(&self) -> bool {
        self.inner.lifecycle.lock().await.reconnect.is_some()
    }

    /// Returns the live session.
    ///
    /// The returned handle stays valid for the caller even if a reconnect
    /// replaces it in the meantime.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Lost`] after reconnection gave up, otherwise
    /// [`ConnectionError::NotConnected`] when there is no session.
    pub fn session(&self) -> UaResult<Arc<P::Handle>> {
        self.inner
            .session
            .read()
            .clone()
            .ok_or_else(|| self.missing_session())
    }

    /// Fails like [`session`](Self::session) unless connected.
    pub fn ensure_connected(&self) -> UaResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(self.missing_session())
        }
    }

    fn missing_session(&self) -> UaError {
        if self.inner.lost.load(Ordering::SeqCst) {
            ConnectionError::lost(&self.inner.request.endpoint).into()
        } else {
            UaError::not_connected()
        }
    }

    /// Returns the live session with the lifecycle generation it belongs to.
    ///
    /// Pass the generation to
    /// [`register_subscription`](Self::register_subscription) so that work
    /// started on a session that has since been replaced is not registered.
    pub(crate) async fn session_with_generation(&self) -> UaResult<(Arc<P::Handle>, u64)> {
        let lifecycle = self.inner.lifecycle.lock().await;
        let session = self.session()?;
        Ok((session, lifecycle.generation))
    }

    // =========================================================================
    // Connect / Disconnect
    // =========================================================================

    /// Replaces any existing session with a new one.
    ///
    /// The previous session, if any, is torn down first exactly as
    /// [`disconnect`](Self::disconnect) would. With `keep_alive` set, the
    /// provider's health reports drive automatic reconnection.
    ///
    /// # Errors
    ///
    /// - [`TimeoutError`] if the provider does not answer within `timeout`
    /// - [`ServerError`] if the provider fails, yields no session, or
    ///   yields a session that is not connected
    #[instrument(skip(self), fields(endpoint = %self.inner.request.endpoint))]
    pub async fn connect(&self, timeout: Duration, keep_alive: bool) -> UaResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;

        if let Some(e) = self.teardown(&mut lifecycle).await {
            warn!(error = %e, "Previous session did not close cleanly");
        }
        lifecycle.generation += 1;
        self.set_state(ConnectionState::Connecting);

        let (sender, receiver) = if keep_alive {
            let (sender, receiver) = KeepAliveSender::channel();
            (Some(sender), Some(receiver))
        } else {
            (None, None)
        };

        let endpoint = self.inner.request.endpoint.clone();
        let created = tokio::time::timeout(
            timeout,
            self.inner
                .provider
                .create_session(&self.inner.request, timeout, sender),
        )
        .await;

        let handle = match created {
            Err(_) => Err(UaError::from(TimeoutError::new("connect", timeout))),
            Ok(Err(source)) => Err(ServerError::CreationFailed { endpoint, source }.into()),
            Ok(Ok(None)) => Err(ServerError::NoSession { endpoint }.into()),
            Ok(Ok(Some(handle))) if !handle.is_connected() => {
                let session_id = handle.session_id();
                self.inner.provider.dispose_session(&handle).await;
                Err(ServerError::SessionNotConnected {
                    endpoint,
                    session_id,
                }
                .into())
            }
            Ok(Ok(Some(handle))) => Ok(handle),
        };

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.stats.record_connect_failure();
                self.set_state(ConnectionState::Disconnected);
                e.log("connect");
                return Err(e);
            }
        };

        let session_id = handle.session_id();
        *self.inner.session.write() = Some(Arc::new(handle));

        if let Some(receiver) = receiver {
            let weak = Arc::downgrade(&self.inner);
            lifecycle.keep_alive_task = Some(tokio::spawn(run_keep_alive(weak, receiver)));
        }

        self.inner.stats.record_connect();
        self.set_state(ConnectionState::Connected);
        info!(session_id = %session_id, keep_alive, "Session established");
        Ok(())
    }

    /// Like [`connect`](Self::connect), but gives up when `cancel` fires.
    ///
    /// Cancellation abandons the wait. A session the provider completes
    /// afterwards is dropped.
    pub async fn connect_with_cancel(
        &self,
        timeout: Duration,
        keep_alive: bool,
        cancel: &CancellationToken,
    ) -> UaResult<()> {
        if cancel.is_cancelled() {
            return Err(UaError::cancelled("connect"));
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UaError::cancelled("connect")),
            result = self.connect(timeout, keep_alive) => result,
        };

        if matches!(result, Err(UaError::Cancelled { .. }))
            && self.state() == ConnectionState::Connecting
        {
            self.set_state(ConnectionState::Disconnected);
        }
        result
    }

    /// Tears down the session.
    ///
    /// Deletes every registered subscription, then closes and releases the
    /// session. A subscription that fails to delete is logged and skipped.
    /// Calling this without a session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the provider's failure to close the session. The session is
    /// released regardless.
    #[instrument(skip(self), fields(endpoint = %self.inner.request.endpoint))]
    pub async fn disconnect(&self) -> UaResult<()> {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        match self.teardown(&mut lifecycle).await {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Releases the current session. Returns the close failure, if any.
    ///
    /// Must be called with the lifecycle lock held.
    async fn teardown(&self, lifecycle: &mut Lifecycle) -> Option<ProviderError> {
        lifecycle.stop_background_tasks();
        self.inner.lost.store(false, Ordering::SeqCst);

        let session = self.inner.session.write().take();
        let Some(session) = session else {
            lifecycle.subscriptions.clear();
            return None;
        };

        lifecycle.generation += 1;
        self.set_state(ConnectionState::Disconnecting);
        let provider = &self.inner.provider;

        for subscription_id in lifecycle.subscriptions.drain(..) {
            if let Err(e) = provider.delete_subscription(&session, subscription_id).await {
                warn!(
                    subscription_id = %subscription_id,
                    error = %e,
                    "Failed to delete subscription"
                );
            }
        }

        let close_error = provider.close_session(&session).await.err();
        if let Some(e) = &close_error {
            warn!(session_id = %session.session_id(), error = %e, "Failed to close session");
        }
        provider.dispose_session(&session).await;

        self.inner.stats.record_disconnect();
        self.set_state(ConnectionState::Disconnected);
        info!(session_id = %session.session_id(), "Session closed");
        close_error
    }

    // =========================================================================
    // Subscription registry
    // =========================================================================

    /// Registers a subscription for deletion at disconnect.
    ///
    /// Returns `false`, registering nothing, if the session of `generation`
    /// has been torn down or replaced since.
    pub(crate) async fn register_subscription(
        &self,
        subscription_id: SubscriptionId,
        generation: u64,
    ) -> bool {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.generation != generation {
            debug!(
                subscription_id = %subscription_id,
                generation,
                current = lifecycle.generation,
                "Refusing subscription from a stale session"
            );
            return false;
        }
        lifecycle.subscriptions.push(subscription_id);
        true
    }

    /// Forgets a subscription. Returns `false` if it was not registered.
    pub(crate) async fn unregister_subscription(&self, subscription_id: SubscriptionId) -> bool {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let before = lifecycle.subscriptions.len();
        lifecycle.subscriptions.retain(|id| *id != subscription_id);
        lifecycle.subscriptions.len() != before
    }

    /// Returns the registered subscriptions.
    pub async fn active_subscriptions(&self) -> Vec<SubscriptionId> {
        self.inner.lifecycle.lock().await.subscriptions.clone()
    }

    // =========================================================================
    // Reconnection
    // =========================================================================

    /// Handles a bad keep-alive report.
    ///
    /// Starts a reconnect unless one is already in flight. Reports that find
    /// the slot occupied are dropped.
    async fn on_keep_alive_failure(&self, status: StatusCode) {
        self.inner.stats.record_keep_alive_failure();

        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.reconnect.is_some() {
            trace!(status = %status, "Reconnect already in flight");
            return;
        }

        let Some(session) = self.inner.session.read().clone() else {
            return;
        };

        warn!(
            status = %status,
            session_id = %session.session_id(),
            "Keep-alive failed, reconnecting"
        );

        let generation = lifecycle.generation;
        self.inner.stats.record_reconnect_started();
        self.set_state(ConnectionState::Reconnecting);

        let manager = self.clone();
        let task = tokio::spawn(async move { manager.run_reconnect(session, generation).await });
        lifecycle.reconnect = Some(ReconnectHandler {
            generation,
            trigger: status,
            started_at: Instant::now(),
            task,
        });
    }

    async fn run_reconnect(&self, session: Arc<P::Handle>, generation: u64) {
        let provider = &self.inner.provider;
        let result = provider.reconnect(&session).await;

        let mut lifecycle = self.inner.lifecycle.lock().await;
        let current = lifecycle.generation == generation
            && lifecycle
                .reconnect
                .as_ref()
                .is_some_and(|handler| handler.generation == generation);

        if !current {
            debug!(generation, "Discarding superseded reconnect");
            if let Ok(handle) = result {
                provider.dispose_session(&handle).await;
            }
            return;
        }

        // The handler is this task; dropping its JoinHandle only detaches it.
        let handler = lifecycle.reconnect.take();
        let elapsed_ms = handler
            .map(|h| h.started_at.elapsed().as_millis() as u64)
            .unwrap_or_default();

        match result {
            Ok(handle) => {
                let session_id = handle.session_id();
                *self.inner.session.write() = Some(Arc::new(handle));
                self.inner.stats.record_reconnect_succeeded();
                self.set_state(ConnectionState::Connected);
                info!(session_id = %session_id, elapsed_ms, "Session reconnected");
            }
            Err(e) => {
                warn!(error = %e, elapsed_ms, "Reconnect failed, releasing session");
                self.inner.session.write().take();
                lifecycle.subscriptions.clear();
                if let Some(task) = lifecycle.keep_alive_task.take() {
                    task.abort();
                }
                lifecycle.generation += 1;
                self.inner.lost.store(true, Ordering::SeqCst);
                provider.dispose_session(&session).await;
                self.inner.stats.record_reconnect_failed();
                self.inner.stats.record_disconnect();
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut *self.inner.state.write(), new_state);
        if old_state == new_state {
            return;
        }
        debug!(from = %old_state, to = %new_state, "Connection state changed");
        let observer = self.inner.observer.read().clone();
        if let Some(observer) = observer {
            observer(old_state, new_state);
        }
    }
}

/// Drains health reports until the channel closes or the manager is gone.
async fn run_keep_alive<P: SessionProvider>(
    inner: Weak<Inner<P>>,
    mut receiver: mpsc::Receiver<KeepAliveEvent>,
) {
    while let Some(event) = receiver.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        if event.status.is_good() {
            trace!(timestamp = %event.timestamp, "Keep-alive ok");
            continue;
        }
        ConnectionManager { inner }
            .on_keep_alive_failure(event.status)
            .await;
    }
    trace!("Keep-alive monitor stopped");
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_has_session() {
        assert!(ConnectionState::Connected.has_session());
        assert!(ConnectionState::Reconnecting.has_session());
        assert!(!ConnectionState::Disconnected.has_session());
        assert!(!ConnectionState::Connecting.has_session());
        assert!(!ConnectionState::Disconnecting.has_session());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }

    #[test]
    fn test_stats_start_at_zero() {
        let stats = ConnectionStats::new();
        stats.record_connect();
        stats.record_reconnect_started();
        stats.record_reconnect_started();
        assert_eq!(stats.connects(), 1);
        assert_eq!(stats.reconnects_started(), 2);
        assert_eq!(stats.reconnects_failed(), 0);
    }

    #[tokio::test]
    async fn test_lifecycle_aborts_tasks() {
        let mut lifecycle = Lifecycle::default();
        let task = tokio::spawn(std::future::pending::<()>());
        lifecycle.keep_alive_task = Some(task);
        lifecycle.stop_background_tasks();
        assert!(lifecycle.keep_alive_task.is_none());
    }
}
