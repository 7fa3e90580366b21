// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Async client facade.
//!
//! [`UaClient`] bundles the components that share one session:
//!
//! ```text
//!                 ┌──────────── UaClient ─────────────┐
//!                 │                                   │
//!   connect ────► │  ConnectionManager ◄──┬──┬──┐     │
//!   devices ────► │  Browser ─────────────┘  │  │     │
//!   read/write ─► │  BatchIo ────────────────┘  │     │
//!   monitor ────► │  Subscriptions ─────────────┘     │
//!                 └───────────────────────────────────┘
//! ```
//!
//! Every component fails with a not-connected error until
//! [`UaClient::connect`] succeeds.
//!
//! # Example
//!
//! ```rust,ignore
//! use ua_access::{ClientConfig, UaClient};
//!
//! let config = ClientConfig::builder()
//!     .application_name("line-monitor")
//!     .endpoint("opc.tcp://localhost:4840")
//!     .build()?;
//! let client = UaClient::new(config, provider)?;
//!
//! client.connect_default().await?;
//! client.write_value("Device.Group.Flag", true).await?;
//! let flag: bool = client.read_typed("Device.Group.Flag").await?;
//! client.disconnect().await?;
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::address::{Address, Device, Group, Tag};
use crate::browser::Browser;
use crate::codec::{FromValue, ValueType};
use crate::config::{load_config, ClientConfig};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::UaResult;
use crate::io::BatchIo;
use crate::provider::SessionProvider;
use crate::subscription::{
    DataChangeCallback, DataChangeNotification, FnCallback, SubscriptionId, Subscriptions,
};
use crate::value::Value;

/// Client for one server endpoint.
///
/// Cloning is cheap; clones share the session.
pub struct UaClient<P: SessionProvider> {
    config: Arc<ClientConfig>,
    connection: ConnectionManager<P>,
    browser: Browser<P>,
    io: BatchIo<P>,
    subscriptions: Subscriptions<P>,
}

impl<P: SessionProvider> Clone for UaClient<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            connection: self.connection.clone(),
            browser: self.browser.clone(),
            io: self.io.clone(),
            subscriptions: self.subscriptions.clone(),
        }
    }
}

impl<P: SessionProvider> std::fmt::Debug for UaClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UaClient")
            .field("application_name", &self.config.application_name)
            .field("connection", &self.connection)
            .finish()
    }
}

impl<P: SessionProvider> UaClient<P> {
    /// Creates a client. The configuration is validated.
    pub fn new(config: ClientConfig, provider: P) -> UaResult<Self> {
        Self::with_shared_provider(config, Arc::new(provider))
    }

    /// Creates a client over a provider shared with other clients.
    pub fn with_shared_provider(config: ClientConfig, provider: Arc<P>) -> UaResult<Self> {
        config.validate()?;

        let connection = ConnectionManager::from_config(provider, &config);
        let browser = Browser::from_config(connection.clone(), &config);
        let io = BatchIo::new(connection.clone(), config.namespace_index);
        let subscriptions = Subscriptions::new(connection.clone(), config.namespace_index);

        Ok(Self {
            config: Arc::new(config),
            connection,
            browser,
            io,
            subscriptions,
        })
    }

    /// Creates a client from a configuration file.
    pub fn from_config_file(path: impl AsRef<Path>, provider: P) -> UaResult<Self> {
        Self::new(load_config(path)?, provider)
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the connection manager.
    pub fn connection(&self) -> &ConnectionManager<P> {
        &self.connection
    }

    /// Returns the browser.
    pub fn browser(&self) -> &Browser<P> {
        &self.browser
    }

    /// Returns the batch I/O engine.
    pub fn io(&self) -> &BatchIo<P> {
        &self.io
    }

    /// Returns the subscription component.
    pub fn subscriptions(&self) -> &Subscriptions<P> {
        &self.subscriptions
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Connects, replacing any existing session.
    pub async fn connect(&self, timeout: Duration, keep_alive: bool) -> UaResult<()> {
        self.connection.connect(timeout, keep_alive).await
    }

    /// Connects with the configured timeout and keep-alive enabled.
    pub async fn connect_default(&self) -> UaResult<()> {
        self.connect(self.config.connect_timeout, true).await
    }

    /// [`connect`](Self::connect) with cancellation.
    pub async fn connect_with_cancel(
        &self,
        timeout: Duration,
        keep_alive: bool,
        cancel: &CancellationToken,
    ) -> UaResult<()> {
        self.connection
            .connect_with_cancel(timeout, keep_alive, cancel)
            .await
    }

    /// Deletes subscriptions and releases the session. No-op when
    /// disconnected.
    pub async fn disconnect(&self) -> UaResult<()> {
        self.connection.disconnect().await
    }

    /// Returns `true` iff a session exists and reports itself connected.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    // =========================================================================
    // Browse
    // =========================================================================

    /// Lists every device under the root.
    pub async fn devices(&self, recursive: bool) -> UaResult<Vec<Device>> {
        self.browser.list_devices(recursive).await
    }

    /// [`devices`](Self::devices) with cancellation.
    pub async fn devices_with_cancel(
        &self,
        recursive: bool,
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Device>> {
        self.browser.list_devices_with_cancel(recursive, cancel).await
    }

    /// Lists the groups under `address`.
    pub async fn groups(
        &self,
        address: impl Into<Address>,
        recursive: bool,
    ) -> UaResult<Vec<Group>> {
        self.browser.list_groups(address, recursive).await
    }

    /// [`groups`](Self::groups) with cancellation.
    pub async fn groups_with_cancel(
        &self,
        address: impl Into<Address>,
        recursive: bool,
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Group>> {
        self.browser
            .list_groups_with_cancel(address, recursive, cancel)
            .await
    }

    /// Lists the tags under `address`.
    pub async fn tags(&self, address: impl Into<Address>) -> UaResult<Vec<Tag>> {
        self.browser.list_tags(address).await
    }

    /// [`tags`](Self::tags) with cancellation.
    pub async fn tags_with_cancel(
        &self,
        address: impl Into<Address>,
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Tag>> {
        self.browser.list_tags_with_cancel(address, cancel).await
    }

    // =========================================================================
    // Read / Write
    // =========================================================================

    /// Reads every address in one round trip.
    pub async fn read(&self, addresses: &[Address]) -> UaResult<Vec<Tag>> {
        self.io.read(addresses).await
    }

    /// [`read`](Self::read) with cancellation.
    pub async fn read_with_cancel(
        &self,
        addresses: &[Address],
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Tag>> {
        self.io.read_with_cancel(addresses, cancel).await
    }

    /// Reads one address.
    pub async fn read_one(&self, address: impl Into<Address>) -> UaResult<Tag> {
        self.io.read_one(address).await
    }

    /// Reads one address as `T`.
    pub async fn read_typed<T: FromValue>(&self, address: impl Into<Address>) -> UaResult<T> {
        self.io.read_typed(address).await
    }

    /// [`read_typed`](Self::read_typed) with cancellation.
    pub async fn read_typed_with_cancel<T: FromValue>(
        &self,
        address: impl Into<Address>,
        cancel: &CancellationToken,
    ) -> UaResult<T> {
        self.io.read_typed_with_cancel(address, cancel).await
    }

    /// Reads one address and coerces it to `target`.
    pub async fn read_as(&self, address: impl Into<Address>, target: ValueType) -> UaResult<Value> {
        self.io.read_as(address, target).await
    }

    /// Writes every tag, failing on the first bad status.
    pub async fn write(&self, tags: &[Tag]) -> UaResult<()> {
        self.io.write(tags).await
    }

    /// [`write`](Self::write) with cancellation.
    pub async fn write_with_cancel(
        &self,
        tags: &[Tag],
        cancel: &CancellationToken,
    ) -> UaResult<()> {
        self.io.write_with_cancel(tags, cancel).await
    }

    /// Writes every tag and returns each outcome.
    pub async fn write_tags(&self, tags: &[Tag]) -> UaResult<Vec<Tag>> {
        self.io.write_tags(tags).await
    }

    /// [`write_tags`](Self::write_tags) with cancellation.
    pub async fn write_tags_with_cancel(
        &self,
        tags: &[Tag],
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Tag>> {
        self.io.write_tags_with_cancel(tags, cancel).await
    }

    /// Writes one tag.
    pub async fn write_one(&self, tag: &Tag) -> UaResult<()> {
        self.io.write_one(tag).await
    }

    /// Writes `value` to `address`.
    pub async fn write_value(
        &self,
        address: impl Into<Address>,
        value: impl Into<Value>,
    ) -> UaResult<()> {
        self.io.write_value(address, value).await
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Monitors `address`, delivering every change to `callback`.
    pub async fn monitor(
        &self,
        address: impl Into<Address>,
        interval_ms: u64,
        callback: Arc<dyn DataChangeCallback>,
    ) -> UaResult<SubscriptionId> {
        self.subscriptions.monitor(address, interval_ms, callback).await
    }

    /// Monitors `address` with a closure.
    pub async fn monitor_fn<F>(
        &self,
        address: impl Into<Address>,
        interval_ms: u64,
        f: F,
    ) -> UaResult<SubscriptionId>
    where
        F: Fn(DataChangeNotification) + Send + Sync + 'static,
    {
        self.monitor(address, interval_ms, Arc::new(FnCallback::new(f)))
            .await
    }

    /// Stops a monitor.
    pub async fn unmonitor(&self, subscription_id: SubscriptionId) -> UaResult<()> {
        self.subscriptions.unmonitor(subscription_id).await
    }
}
