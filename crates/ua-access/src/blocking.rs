// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Synchronous client.
//!
//! [`BlockingClient`] owns a small multi-threaded tokio runtime and runs each
//! call to completion on it. The runtime keeps running between calls, so
//! keep-alive monitoring, reconnection and notification delivery continue
//! while the caller's thread does other work.
//!
//! Must not be used from inside an async context: blocking on the runtime
//! from a runtime thread panics.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::address::{Address, Device, Group, Tag};
use crate::client::UaClient;
use crate::codec::{FromValue, ValueType};
use crate::config::ClientConfig;
use crate::connection::ConnectionState;
use crate::error::{ProviderError, UaResult};
use crate::provider::SessionProvider;
use crate::subscription::{DataChangeCallback, DataChangeNotification, SubscriptionId};
use crate::value::Value;

/// Worker threads of the owned runtime.
const WORKER_THREADS: usize = 2;

/// Blocking wrapper around [`UaClient`].
pub struct BlockingClient<P: SessionProvider> {
    runtime: Runtime,
    client: UaClient<P>,
}

impl<P: SessionProvider> std::fmt::Debug for BlockingClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl<P: SessionProvider> BlockingClient<P> {
    /// Creates a client and its runtime.
    pub fn new(config: ClientConfig, provider: P) -> UaResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .thread_name("ua-access")
            .enable_all()
            .build()
            .map_err(|e| ProviderError::new("failed to start client runtime").with_source(e))?;
        let client = UaClient::new(config, provider)?;
        Ok(Self { runtime, client })
    }

    /// Returns the async client sharing this session.
    pub fn client(&self) -> &UaClient<P> {
        &self.client
    }

    /// Connects, replacing any existing session.
    pub fn connect(&self, timeout: Duration, keep_alive: bool) -> UaResult<()> {
        self.runtime.block_on(self.client.connect(timeout, keep_alive))
    }

    /// Deletes subscriptions and releases the session.
    pub fn disconnect(&self) -> UaResult<()> {
        self.runtime.block_on(self.client.disconnect())
    }

    /// Returns `true` iff a session exists and reports itself connected.
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Lists every device under the root.
    pub fn devices(&self, recursive: bool) -> UaResult<Vec<Device>> {
        self.runtime.block_on(self.client.devices(recursive))
    }

    /// Lists the groups under `address`.
    pub fn groups(&self, address: impl Into<Address>, recursive: bool) -> UaResult<Vec<Group>> {
        self.runtime.block_on(self.client.groups(address, recursive))
    }

    /// Lists the tags under `address`.
    pub fn tags(&self, address: impl Into<Address>) -> UaResult<Vec<Tag>> {
        self.runtime.block_on(self.client.tags(address))
    }

    /// Reads every address in one round trip.
    pub fn read(&self, addresses: &[Address]) -> UaResult<Vec<Tag>> {
        self.runtime.block_on(self.client.read(addresses))
    }

    /// Reads one address.
    pub fn read_one(&self, address: impl Into<Address>) -> UaResult<Tag> {
        self.runtime.block_on(self.client.read_one(address))
    }

    /// Reads one address as `T`.
    pub fn read_typed<T: FromValue>(&self, address: impl Into<Address>) -> UaResult<T> {
        self.runtime.block_on(self.client.read_typed(address))
    }

    /// Reads one address and coerces it to `target`.
    pub fn read_as(&self, address: impl Into<Address>, target: ValueType) -> UaResult<Value> {
        self.runtime.block_on(self.client.read_as(address, target))
    }

    /// Writes every tag, failing on the first bad status.
    pub fn write(&self, tags: &[Tag]) -> UaResult<()> {
        self.runtime.block_on(self.client.write(tags))
    }

    /// Writes every tag and returns each outcome.
    pub fn write_tags(&self, tags: &[Tag]) -> UaResult<Vec<Tag>> {
        self.runtime.block_on(self.client.write_tags(tags))
    }

    /// Writes `value` to `address`.
    pub fn write_value(
        &self,
        address: impl Into<Address>,
        value: impl Into<Value>,
    ) -> UaResult<()> {
        self.runtime.block_on(self.client.write_value(address, value))
    }

    /// Monitors `address`. The callback runs on a runtime worker.
    pub fn monitor(
        &self,
        address: impl Into<Address>,
        interval_ms: u64,
        callback: Arc<dyn DataChangeCallback>,
    ) -> UaResult<SubscriptionId> {
        self.runtime
            .block_on(self.client.monitor(address, interval_ms, callback))
    }

    /// Monitors `address` with a closure.
    pub fn monitor_fn<F>(
        &self,
        address: impl Into<Address>,
        interval_ms: u64,
        f: F,
    ) -> UaResult<SubscriptionId>
    where
        F: Fn(DataChangeNotification) + Send + Sync + 'static,
    {
        self.runtime
            .block_on(self.client.monitor_fn(address, interval_ms, f))
    }

    /// Stops a monitor.
    pub fn unmonitor(&self, subscription_id: SubscriptionId) -> UaResult<()> {
        self.runtime.block_on(self.client.unmonitor(subscription_id))
    }
}
