// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client access layer for OPC UA servers.
//!
//! This crate sits on top of a [`SessionProvider`], which owns the secure
//! channel and the wire protocol, and adds what applications need on top:
//!
//! - a session that survives transient network loss without the caller
//!   seeing it come and go ([`ConnectionManager`])
//! - discovery of the Device/Group/Tag hierarchy ([`Browser`])
//! - batched reads and writes with per-item outcomes and typed reads
//!   ([`BatchIo`])
//! - value-change subscriptions ([`Subscriptions`])
//!
//! [`UaClient`] bundles all of them; [`BlockingClient`] offers the same
//! surface synchronously.
//!
//! # Addressing
//!
//! Nodes are named by dot-delimited [`Address`]es such as
//! `Device.Group.Tag`. The name of a node is the last segment. Addresses map
//! to string node IDs in the configured namespace (`ns=2;s=Device.Group.Tag`
//! by default).
//!
//! # Error Handling
//!
//! ```text
//! UaError
//! ├── Connection      - no session, endpoint issues
//! ├── Server          - session creation failed or unusable
//! ├── Read            - typed read saw a non-good status
//! ├── Write           - fail-fast write saw a non-good status
//! ├── UnsupportedType - typed read outside the conversion table
//! ├── Conversion      - value does not fit the requested type
//! ├── Browse          - depth limit, unknown node
//! ├── Operation       - response did not match the request
//! ├── Subscription    - monitored item rejected, unknown subscription
//! ├── Configuration   - invalid settings
//! ├── Provider        - opaque transport or protocol failure
//! ├── Cancelled       - caller cancelled
//! └── Timeout         - deadline elapsed
//! ```
//!
//! Batch `read` and `write_tags` never fail per item: inspect each tag's
//! status. `write` and `read_typed` fail on the first bad status.
//!
//! # Features
//!
//! - `real-transport`: [`provider::opcua::OpcUaSessionProvider`], backed by
//!   the `opcua` crate.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod address;
pub mod blocking;
pub mod browser;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod io;
pub mod logging;
pub mod provider;
pub mod status;
pub mod subscription;
pub mod types;
pub mod value;

pub use address::{Address, Device, Group, Tag};
pub use blocking::BlockingClient;
pub use browser::{BrowseDepth, BrowseStatistics, Browser};
pub use client::UaClient;
pub use codec::{coerce, FromValue, ValueType};
pub use config::{
    load_config, load_config_str, CertificateStoreLayout, CertificateTrust, ClientConfig,
    ClientConfigBuilder, ConfigFormat, ConfigLoader,
};
pub use connection::{ConnectionManager, ConnectionState, ConnectionStats};
pub use error::{
    BrowseError, ConfigurationError, ConnectionError, ConversionError, ErrorCode, ErrorSeverity,
    OperationError, ProviderError, ProviderResult, ReadError, ServerError, SubscriptionError,
    TimeoutError, UaError, UaResult, UnsupportedTypeError, WriteError,
};
pub use io::{BatchIo, IoStats};
pub use provider::{
    BrowseEntry, BrowseTarget, DataValue, KeepAliveEvent, KeepAliveSender, MonitoredItemRequest,
    SessionHandle, SessionProvider, SessionRequest,
};
pub use status::StatusCode;
pub use subscription::{
    BroadcastCallback, ChannelCallback, DataChangeCallback, DataChangeNotification, FnCallback,
    SubscriptionId, SubscriptionSettings, Subscriptions,
};
pub use types::{
    EndpointSecurity, NodeClass, NodeClassMask, NodeId, NodeIdentifier, SecurityMode,
    SecurityPolicy, UserIdentity,
};
pub use value::Value;
