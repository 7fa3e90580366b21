// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Change subscriptions.
//!
//! Every [`Subscriptions::monitor`] call creates its own server-side
//! subscription with a single monitored item on the value attribute of the
//! address. Nothing is merged or reused across calls.
//!
//! ```text
//!  provider publish loop ──► DataChangeCallback::on_data_change
//!                                ├── FnCallback        (closure)
//!                                ├── ChannelCallback   (mpsc)
//!                                └── BroadcastCallback (broadcast)
//! ```
//!
//! Notifications for one monitored item arrive in the order the server
//! assigned. Nothing is promised across subscriptions.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::address::{Address, Tag};
use crate::connection::ConnectionManager;
use crate::error::{SubscriptionError, UaResult};
use crate::provider::{MonitoredItemRequest, SessionProvider};
use crate::status::StatusCode;
use crate::value::Value;

// =============================================================================
// SubscriptionId / SubscriptionSettings
// =============================================================================

/// Server-assigned subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u32);

impl SubscriptionId {
    /// Returns the raw identifier.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SubscriptionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Parameters of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Publishing interval requested from the server.
    #[serde(with = "crate::types::humantime_serde")]
    pub publishing_interval: Duration,
    /// Publishing intervals without data before a keep-alive is sent.
    pub keep_alive_count: u32,
    /// Publishing intervals without a publish request before the
    /// subscription expires.
    pub lifetime_count: u32,
    /// Notifications per publish response. Zero means unlimited.
    pub max_notifications_per_publish: u32,
    /// Relative priority among subscriptions of the session.
    pub priority: u8,
    /// Whether publishing starts enabled.
    pub publishing_enabled: bool,
}

impl SubscriptionSettings {
    /// Keep-alive count used by [`Subscriptions::monitor`].
    pub const MONITOR_KEEP_ALIVE_COUNT: u32 = 10;
    /// Lifetime count used by [`Subscriptions::monitor`].
    pub const MONITOR_LIFETIME_COUNT: u32 = 20;
    /// Notification cap used by [`Subscriptions::monitor`].
    pub const MONITOR_MAX_NOTIFICATIONS: u32 = 1000;
    /// Priority used by [`Subscriptions::monitor`].
    pub const MONITOR_PRIORITY: u8 = 1;

    /// Settings used for a single-item monitor at the given interval.
    pub fn for_monitor(interval: Duration) -> Self {
        Self {
            publishing_interval: interval,
            keep_alive_count: Self::MONITOR_KEEP_ALIVE_COUNT,
            lifetime_count: Self::MONITOR_LIFETIME_COUNT,
            max_notifications_per_publish: Self::MONITOR_MAX_NOTIFICATIONS,
            priority: Self::MONITOR_PRIORITY,
            publishing_enabled: true,
        }
    }
}

// =============================================================================
// DataChangeNotification
// =============================================================================

/// A value change pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChangeNotification {
    /// Monitored address.
    pub address: Address,
    /// New value. `None` when the server sent only a status.
    pub value: Option<Value>,
    /// Status of the value.
    pub status: StatusCode,
    /// When the value changed at the source.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// When the server processed the change.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataChangeNotification {
    /// Creates a notification with a good status.
    pub fn new(address: impl Into<Address>, value: impl Into<Value>) -> Self {
        Self {
            address: address.into(),
            value: Some(value.into()),
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets the source timestamp.
    pub fn with_source_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.source_timestamp = Some(timestamp);
        self
    }

    /// Builds a tag carrying the notified value and status.
    pub fn to_tag(&self) -> Tag {
        let mut tag = Tag::new(self.address.clone()).with_status(self.status);
        tag.value = self.value.clone();
        tag
    }
}

// =============================================================================
// Callbacks
// =============================================================================

/// Receiver of data change notifications.
///
/// Called from the provider's delivery context. Implementations should hand
/// work off rather than block.
#[async_trait]
pub trait DataChangeCallback: Send + Sync {
    /// Called for every notification of the monitored item.
    async fn on_data_change(&self, notification: DataChangeNotification);
}

type BoxedHandler =
    dyn Fn(DataChangeNotification) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync;

/// Callback backed by a closure.
pub struct FnCallback {
    handler: Box<BoxedHandler>,
}

impl FnCallback {
    /// Wraps a synchronous closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(DataChangeNotification) + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(move |notification| {
                f(notification);
                Box::pin(async {})
            }),
        }
    }

    /// Wraps a closure returning a future.
    pub fn new_async<F, Fut>(f: F) -> Self
    where
        F: Fn(DataChangeNotification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            handler: Box::new(move |notification| Box::pin(f(notification))),
        }
    }
}

impl fmt::Debug for FnCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCallback").finish_non_exhaustive()
    }
}

#[async_trait]
impl DataChangeCallback for FnCallback {
    async fn on_data_change(&self, notification: DataChangeNotification) {
        (self.handler)(notification).await;
    }
}

/// Callback forwarding into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    sender: mpsc::Sender<DataChangeNotification>,
}

impl ChannelCallback {
    /// Creates a callback over an existing sender.
    pub fn new(sender: mpsc::Sender<DataChangeNotification>) -> Self {
        Self { sender }
    }

    /// Creates a callback together with its receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<DataChangeNotification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl DataChangeCallback for ChannelCallback {
    async fn on_data_change(&self, notification: DataChangeNotification) {
        if self.sender.send(notification).await.is_err() {
            debug!("Notification receiver dropped");
        }
    }
}

/// Callback fanning out to any number of receivers.
#[derive(Debug, Clone)]
pub struct BroadcastCallback {
    sender: broadcast::Sender<DataChangeNotification>,
}

impl BroadcastCallback {
    /// Creates a broadcast callback.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes a new receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<DataChangeNotification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl DataChangeCallback for BroadcastCallback {
    async fn on_data_change(&self, notification: DataChangeNotification) {
        // No receivers is fine.
        let _ = self.sender.send(notification);
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Creates and deletes single-item subscriptions on the live session.
pub struct Subscriptions<P: SessionProvider> {
    connection: ConnectionManager<P>,
    namespace_index: u16,
}

impl<P: SessionProvider> Clone for Subscriptions<P> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            namespace_index: self.namespace_index,
        }
    }
}

impl<P: SessionProvider> Subscriptions<P> {
    /// Creates the component over a connection manager.
    pub fn new(connection: ConnectionManager<P>, namespace_index: u16) -> Self {
        Self {
            connection,
            namespace_index,
        }
    }

    /// Monitors the value of `address`, sampling every `interval_ms`.
    ///
    /// Creates one subscription with the fixed monitor settings, attaches
    /// one monitored item and registers the subscription so that disconnect
    /// deletes it. If the session is torn down or replaced before the
    /// registration, the subscription is deleted again and
    /// [`SubscriptionError::SessionChanged`] is returned.
    pub async fn monitor(
        &self,
        address: impl Into<Address>,
        interval_ms: u64,
        callback: Arc<dyn DataChangeCallback>,
    ) -> UaResult<SubscriptionId> {
        let address = address.into();
        let interval = Duration::from_millis(interval_ms);
        let (session, generation) = self.connection.session_with_generation().await?;
        let provider = self.connection.provider();

        let settings = SubscriptionSettings::for_monitor(interval);
        let subscription_id = provider.create_subscription(&session, &settings).await?;

        let item = MonitoredItemRequest {
            node_id: address.to_node_id(self.namespace_index),
            address: address.clone(),
            sampling_interval: interval,
        };

        let status = match provider
            .add_monitored_item(&session, subscription_id, &item, callback)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                self.discard(&session, subscription_id).await;
                return Err(e.into());
            }
        };

        if !status.is_good() {
            self.discard(&session, subscription_id).await;
            return Err(SubscriptionError::MonitoredItemRejected {
                address: address.to_string(),
                status,
            }
            .into());
        }

        if !self
            .connection
            .register_subscription(subscription_id, generation)
            .await
        {
            self.discard(&session, subscription_id).await;
            return Err(SubscriptionError::SessionChanged {
                subscription_id: subscription_id.value(),
            }
            .into());
        }

        info!(
            address = %address,
            subscription_id = %subscription_id,
            interval_ms,
            "Monitoring started"
        );

        Ok(subscription_id)
    }

    /// Deletes a subscription created by [`monitor`](Self::monitor).
    pub async fn unmonitor(&self, subscription_id: SubscriptionId) -> UaResult<()> {
        if !self.connection.unregister_subscription(subscription_id).await {
            return Err(SubscriptionError::NotFound {
                subscription_id: subscription_id.value(),
            }
            .into());
        }

        let session = self.connection.session()?;
        self.connection
            .provider()
            .delete_subscription(&session, subscription_id)
            .await?;

        info!(subscription_id = %subscription_id, "Monitoring stopped");
        Ok(())
    }

    /// Returns the subscriptions currently registered.
    pub async fn active(&self) -> Vec<SubscriptionId> {
        self.connection.active_subscriptions().await
    }

    async fn discard(&self, session: &P::Handle, subscription_id: SubscriptionId) {
        if let Err(e) = self
            .connection
            .provider()
            .delete_subscription(session, subscription_id)
            .await
        {
            warn!(
                subscription_id = %subscription_id,
                error = %e,
                "Failed to discard subscription"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
