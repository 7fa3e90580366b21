// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session provider abstraction.
//!
//! The provider owns the secure channel and everything below it: endpoint
//! discovery, the security handshake, certificate stores and the wire
//! encoding. This crate drives it through [`SessionProvider`] and never
//! touches a session except through a handle the provider gave out.
//!
//! ```text
//! ┌─────────────────────┐
//! │  ConnectionManager  │── create / close / dispose / reconnect
//! ├─────────────────────┤
//! │  Browser, BatchIo,  │── browse / read / write /
//! │  Subscriptions      │   create_subscription / add_monitored_item
//! └─────────┬───────────┘
//!           │ &Handle
//! ┌─────────▼───────────┐
//! │   SessionProvider   │──► KeepAliveSender (health signal)
//! └─────────────────────┘
//! ```
//!
//! The `real-transport` feature enables [`opcua::OpcUaSessionProvider`],
//! backed by the `opcua` crate.

#[cfg(feature = "real-transport")]
pub mod opcua;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::address::Address;
use crate::config::CertificateTrust;
use crate::error::ProviderResult;
use crate::status::StatusCode;
use crate::subscription::{DataChangeCallback, SubscriptionId, SubscriptionSettings};
use crate::types::{EndpointSecurity, NodeClass, NodeClassMask, NodeId, UserIdentity};
use crate::value::Value;

// =============================================================================
// SessionProvider
// =============================================================================

/// External collaborator that owns sessions and the channel beneath them.
///
/// Methods returning [`ProviderResult`] report transport or protocol
/// failures; per-item outcomes travel in the returned status codes. Result
/// vectors must match their request slices position for position.
#[async_trait]
pub trait SessionProvider: Send + Sync + 'static {
    /// Session handle type.
    type Handle: SessionHandle;

    /// Creates and activates a session.
    ///
    /// Returns `Ok(None)` when the server refused to hand out a session.
    /// When `keep_alive` is given, the provider reports channel health
    /// through it for the lifetime of the session and of any session that
    /// [`reconnect`](Self::reconnect) derives from it.
    async fn create_session(
        &self,
        request: &SessionRequest,
        timeout: Duration,
        keep_alive: Option<KeepAliveSender>,
    ) -> ProviderResult<Option<Self::Handle>>;

    /// Closes the session on the server.
    async fn close_session(&self, handle: &Self::Handle) -> ProviderResult<()>;

    /// Releases local resources held for the session.
    async fn dispose_session(&self, handle: &Self::Handle);

    /// Re-establishes a session after a channel failure.
    ///
    /// Retries are the provider's concern. An error means it gave up.
    async fn reconnect(&self, handle: &Self::Handle) -> ProviderResult<Self::Handle>;

    /// Reads the value attribute of each node.
    async fn read(&self, handle: &Self::Handle, nodes: &[NodeId]) -> ProviderResult<Vec<DataValue>>;

    /// Writes the value attribute of each node.
    async fn write(
        &self,
        handle: &Self::Handle,
        items: &[(NodeId, Value)],
    ) -> ProviderResult<Vec<StatusCode>>;

    /// Lists the hierarchical children of a node.
    async fn browse(
        &self,
        handle: &Self::Handle,
        target: &BrowseTarget,
        forward: bool,
        mask: NodeClassMask,
    ) -> ProviderResult<Vec<BrowseEntry>>;

    /// Creates a subscription.
    async fn create_subscription(
        &self,
        handle: &Self::Handle,
        settings: &SubscriptionSettings,
    ) -> ProviderResult<SubscriptionId>;

    /// Attaches a monitored item to a subscription and activates it.
    ///
    /// Returns the status the server assigned to the item.
    async fn add_monitored_item(
        &self,
        handle: &Self::Handle,
        subscription: SubscriptionId,
        item: &MonitoredItemRequest,
        callback: Arc<dyn DataChangeCallback>,
    ) -> ProviderResult<StatusCode>;

    /// Deletes a subscription and its monitored items.
    async fn delete_subscription(
        &self,
        handle: &Self::Handle,
        subscription: SubscriptionId,
    ) -> ProviderResult<()>;

    /// Returns a short name for logs.
    fn name(&self) -> &str {
        "session-provider"
    }
}

/// A live session owned by a provider.
pub trait SessionHandle: Send + Sync + 'static {
    /// Returns `true` while the session's channel is connected.
    fn is_connected(&self) -> bool;

    /// Returns the session identifier for logs.
    fn session_id(&self) -> String;
}

// =============================================================================
// Requests and results
// =============================================================================

/// Everything the provider needs to establish a session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Application name presented to the server.
    pub application_name: String,
    /// Application URI presented to the server.
    pub application_uri: String,
    /// Server endpoint URL.
    pub endpoint: String,
    /// Endpoint security selection.
    pub security: EndpointSecurity,
    /// User identity.
    pub identity: UserIdentity,
    /// Certificate trust policy.
    pub trust: CertificateTrust,
    /// Requested session timeout.
    pub session_timeout: Duration,
    /// Per-request operation timeout.
    pub operation_timeout: Duration,
    /// Keep-alive interval.
    pub keep_alive_interval: Duration,
    /// Root of the certificate store.
    pub pki_dir: PathBuf,
}

/// Value and status returned for one read item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    /// The value, if the server returned one.
    pub value: Option<Value>,
    /// Item status.
    pub status: StatusCode,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good data value.
    pub fn good(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            status: StatusCode::GOOD,
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        }
    }

    /// Creates a data value carrying only a status.
    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
            source_timestamp: None,
            server_timestamp: Some(Utc::now()),
        }
    }
}

/// Starting point of a browse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BrowseTarget {
    /// The Objects folder, parent of every device.
    Root,
    /// A specific node.
    Node(NodeId),
}

impl BrowseTarget {
    /// Resolves the target to a node ID.
    pub fn node_id(&self) -> NodeId {
        match self {
            Self::Root => NodeId::objects_folder(),
            Self::Node(node_id) => node_id.clone(),
        }
    }
}

/// One child returned by browse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseEntry {
    /// Browse name of the child.
    pub browse_name: String,
    /// Node class of the child.
    pub node_class: NodeClass,
}

impl BrowseEntry {
    /// Creates a browse entry.
    pub fn new(browse_name: impl Into<String>, node_class: NodeClass) -> Self {
        Self {
            browse_name: browse_name.into(),
            node_class,
        }
    }
}

/// Monitored item to attach to a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredItemRequest {
    /// Address being monitored.
    pub address: Address,
    /// Node carrying the value attribute.
    pub node_id: NodeId,
    /// Sampling interval.
    pub sampling_interval: Duration,
}

// =============================================================================
// Keep-alive channel
// =============================================================================

/// Health report pushed by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveEvent {
    /// Channel health; anything but good drives reconnection.
    pub status: StatusCode,
    /// When the check completed.
    pub timestamp: DateTime<Utc>,
}

/// Sending half of the keep-alive channel handed to providers.
///
/// Sending never blocks. Reports that find the channel full or closed are
/// dropped.
#[derive(Debug, Clone)]
pub struct KeepAliveSender {
    tx: mpsc::Sender<KeepAliveEvent>,
}

impl KeepAliveSender {
    /// Queue depth of the keep-alive channel.
    pub const CAPACITY: usize = 64;

    /// Creates a keep-alive channel.
    pub fn channel() -> (Self, mpsc::Receiver<KeepAliveEvent>) {
        let (tx, rx) = mpsc::channel(Self::CAPACITY);
        (Self { tx }, rx)
    }

    /// Reports channel health.
    pub fn notify(&self, status: StatusCode) {
        let event = KeepAliveEvent {
            status,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.tx.try_send(event) {
            tracing::trace!(status = %status, error = %e, "Keep-alive report dropped");
        }
    }

    /// Returns `true` once the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// Tests
// =============================================================================
