// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address-space discovery.
//!
//! The browser walks the server hierarchy and builds the
//! [`Device`]/[`Group`]/[`Tag`] tree bottom-up: a group is constructed only
//! once all of its children are resolved, so no partially built node is ever
//! visible.
//!
//! ```text
//! Objects (root)
//! ├── Server            excluded
//! ├── Plant   ─► Device "Plant"
//! │   ├── Line1 ─► Group "Plant.Line1"   (object)
//! │   │   └── Speed ─► Tag "Plant.Line1.Speed" (variable)
//! │   └── Alarm ─► Tag "Plant.Alarm"
//! └── Yard    ─► Device "Yard"
//! ```
//!
//! # Cost
//!
//! Building a node costs one browse round trip, which returns its objects
//! and variables together. A full scan therefore issues one round trip per
//! interior node plus one for the root. Children keep the order the provider
//! returned them in. That order is not guaranteed to be stable across scans.
//!
//! A child reached through several hierarchical references is returned once
//! per reference. Repeated browse names under one parent are dropped, keeping
//! the first, so every address appears once and is expanded once.
//!
//! # Depth
//!
//! The address space is treated as a tree. Cycles are not detected;
//! `max_depth` bounds the recursion instead and fails with
//! [`BrowseError::DepthExceeded`] when a path goes deeper.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::address::{Address, Device, Group, Tag};
use crate::config::ClientConfig;
use crate::connection::ConnectionManager;
use crate::error::{BrowseError, ProviderError, UaError, UaResult};
use crate::io::cancellable;
use crate::provider::{BrowseEntry, BrowseTarget, SessionProvider};
use crate::status::StatusCode;
use crate::types::{NodeClass, NodeClassMask};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// =============================================================================
// BrowseDepth
// =============================================================================

/// How far group expansion goes below the starting node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowseDepth {
    /// Every nested group is expanded.
    #[default]
    Full,
    /// Direct groups are returned with their tags but no nested groups.
    Shallow,
}

impl From<bool> for BrowseDepth {
    /// `true` selects [`BrowseDepth::Full`].
    fn from(recursive: bool) -> Self {
        if recursive {
            Self::Full
        } else {
            Self::Shallow
        }
    }
}

impl fmt::Display for BrowseDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Shallow => write!(f, "shallow"),
        }
    }
}

// =============================================================================
// BrowseStatistics
// =============================================================================

/// Browse counters.
#[derive(Debug, Default)]
pub struct BrowseStatistics {
    round_trips: AtomicU64,
    groups: AtomicU64,
    tags: AtomicU64,
    errors: AtomicU64,
}

impl BrowseStatistics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_round_trip(&self) {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
    }

    fn record_nodes(&self, groups: usize, tags: usize) {
        self.groups.fetch_add(groups as u64, Ordering::Relaxed);
        self.tags.fetch_add(tags as u64, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Browse requests sent to the provider.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    /// Groups discovered.
    pub fn groups(&self) -> u64 {
        self.groups.load(Ordering::Relaxed)
    }

    /// Tags discovered.
    pub fn tags(&self) -> u64 {
        self.tags.load(Ordering::Relaxed)
    }

    /// Failed browse requests.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Browser
// =============================================================================

/// Builds the Device/Group/Tag hierarchy from the live session.
pub struct Browser<P: SessionProvider> {
    connection: ConnectionManager<P>,
    namespace_index: u16,
    excluded_root_nodes: Arc<[String]>,
    max_depth: usize,
    stats: Arc<BrowseStatistics>,
}

impl<P: SessionProvider> Clone for Browser<P> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            namespace_index: self.namespace_index,
            excluded_root_nodes: self.excluded_root_nodes.clone(),
            max_depth: self.max_depth,
            stats: self.stats.clone(),
        }
    }
}

impl<P: SessionProvider> Browser<P> {
    /// Creates a browser with the default settings.
    pub fn new(connection: ConnectionManager<P>) -> Self {
        Self {
            connection,
            namespace_index: ClientConfig::DEFAULT_NAMESPACE_INDEX,
            excluded_root_nodes: Arc::from(vec!["Server".to_string()]),
            max_depth: ClientConfig::DEFAULT_BROWSE_MAX_DEPTH,
            stats: Arc::new(BrowseStatistics::new()),
        }
    }

    /// Creates a browser configured from a client configuration.
    pub fn from_config(connection: ConnectionManager<P>, config: &ClientConfig) -> Self {
        Self::new(connection)
            .with_namespace_index(config.namespace_index)
            .with_excluded_root_nodes(config.excluded_root_nodes.clone())
            .with_max_depth(config.browse_max_depth)
    }

    /// Sets the namespace of address node IDs.
    pub fn with_namespace_index(mut self, namespace_index: u16) -> Self {
        self.namespace_index = namespace_index;
        self
    }

    /// Sets the root children that are never reported as devices.
    pub fn with_excluded_root_nodes(mut self, names: Vec<String>) -> Self {
        self.excluded_root_nodes = Arc::from(names);
        self
    }

    /// Sets the recursion limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the browse counters.
    pub fn stats(&self) -> &BrowseStatistics {
        &self.stats
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Lists every device under the root, with groups and tags resolved.
    ///
    /// With `recursive` false, device groups carry their tags but no nested
    /// groups.
    pub async fn list_devices(&self, recursive: bool) -> UaResult<Vec<Device>> {
        self.devices(BrowseDepth::from(recursive), None).await
    }

    /// [`list_devices`](Self::list_devices) with cancellation.
    pub async fn list_devices_with_cancel(
        &self,
        recursive: bool,
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Device>> {
        self.devices(BrowseDepth::from(recursive), Some(cancel)).await
    }

    /// Lists the groups directly under `address`, each fully resolved.
    ///
    /// With `recursive` false, the groups carry their tags but no nested
    /// groups.
    pub async fn list_groups(
        &self,
        address: impl Into<Address>,
        recursive: bool,
    ) -> UaResult<Vec<Group>> {
        self.groups(address.into(), BrowseDepth::from(recursive), None)
            .await
    }

    /// [`list_groups`](Self::list_groups) with cancellation.
    pub async fn list_groups_with_cancel(
        &self,
        address: impl Into<Address>,
        recursive: bool,
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Group>> {
        self.groups(address.into(), BrowseDepth::from(recursive), Some(cancel))
            .await
    }

    /// Lists the tags directly under `address`. Values are not read.
    pub async fn list_tags(&self, address: impl Into<Address>) -> UaResult<Vec<Tag>> {
        self.tags(address.into(), None).await
    }

    /// [`list_tags`](Self::list_tags) with cancellation.
    pub async fn list_tags_with_cancel(
        &self,
        address: impl Into<Address>,
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Tag>> {
        self.tags(address.into(), Some(cancel)).await
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    #[instrument(skip(self, cancel))]
    async fn devices(
        &self,
        depth: BrowseDepth,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Vec<Device>> {
        let session = self.connection.session()?;
        let entries = self
            .browse(&session, BrowseTarget::Root, None, NodeClassMask::OBJECT, cancel)
            .await?;

        let mut devices = Vec::new();
        for entry in entries {
            if entry.node_class != NodeClass::Object {
                continue;
            }
            if self.excluded_root_nodes.iter().any(|n| *n == entry.browse_name) {
                debug!(name = %entry.browse_name, "Skipping excluded root node");
                continue;
            }

            let address = Address::new(entry.browse_name);
            let (groups, tags) = self
                .build_children(&session, &address, 1, depth, cancel)
                .await?;
            devices.push(Device::new(address, groups, tags));
        }

        debug!(count = devices.len(), "Devices listed");
        Ok(devices)
    }

    async fn groups(
        &self,
        address: Address,
        depth: BrowseDepth,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Vec<Group>> {
        let session = self.connection.session()?;
        let (groups, _) = self
            .build_children(&session, &address, 1, depth, cancel)
            .await?;
        debug!(address = %address, count = groups.len(), "Groups listed");
        Ok(groups)
    }

    async fn tags(
        &self,
        address: Address,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Vec<Tag>> {
        let session = self.connection.session()?;
        let entries = self
            .browse(
                &session,
                BrowseTarget::Node(address.to_node_id(self.namespace_index)),
                Some(&address),
                NodeClassMask::VARIABLE,
                cancel,
            )
            .await?;

        let tags: Vec<Tag> = entries
            .into_iter()
            .filter(|e| e.node_class.is_leaf())
            .map(|e| Tag::new(address.child(&e.browse_name)))
            .collect();
        self.stats.record_nodes(0, tags.len());
        debug!(address = %address, count = tags.len(), "Tags listed");
        Ok(tags)
    }

    /// Resolves the groups and tags under `address`.
    ///
    /// `level` is the depth of the children being built, counted from the
    /// node the public call started at.
    fn build_children<'a>(
        &'a self,
        session: &'a P::Handle,
        address: &'a Address,
        level: usize,
        depth: BrowseDepth,
        cancel: Option<&'a CancellationToken>,
    ) -> BoxFuture<'a, UaResult<(Vec<Group>, Vec<Tag>)>> {
        Box::pin(async move {
            if level > self.max_depth {
                return Err(BrowseError::DepthExceeded {
                    address: address.to_string(),
                    max_depth: self.max_depth,
                }
                .into());
            }

            let entries = self
                .browse(
                    session,
                    BrowseTarget::Node(address.to_node_id(self.namespace_index)),
                    Some(address),
                    NodeClassMask::OBJECT_AND_VARIABLE,
                    cancel,
                )
                .await?;

            let mut groups = Vec::new();
            let mut tags = Vec::new();
            for entry in entries {
                let child = address.child(&entry.browse_name);
                match entry.node_class {
                    NodeClass::Variable => tags.push(Tag::new(child)),
                    NodeClass::Object => {
                        let group = match depth {
                            BrowseDepth::Full => {
                                let (nested, nested_tags) = self
                                    .build_children(session, &child, level + 1, depth, cancel)
                                    .await?;
                                Group::new(child, nested, nested_tags)
                            }
                            BrowseDepth::Shallow => {
                                let nested_tags =
                                    self.leaf_tags(session, &child, level + 1, cancel).await?;
                                Group::new(child, Vec::new(), nested_tags)
                            }
                        };
                        groups.push(group);
                    }
                    _ => {}
                }
            }

            self.stats.record_nodes(groups.len(), tags.len());
            Ok((groups, tags))
        })
    }

    async fn leaf_tags(
        &self,
        session: &P::Handle,
        address: &Address,
        level: usize,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Vec<Tag>> {
        if level > self.max_depth {
            return Err(BrowseError::DepthExceeded {
                address: address.to_string(),
                max_depth: self.max_depth,
            }
            .into());
        }
        let entries = self
            .browse(
                session,
                BrowseTarget::Node(address.to_node_id(self.namespace_index)),
                Some(address),
                NodeClassMask::VARIABLE,
                cancel,
            )
            .await?;
        let tags: Vec<Tag> = entries
            .into_iter()
            .filter(|e| e.node_class.is_leaf())
            .map(|e| Tag::new(address.child(&e.browse_name)))
            .collect();
        self.stats.record_nodes(0, tags.len());
        Ok(tags)
    }

    /// One forward browse round trip.
    async fn browse(
        &self,
        session: &P::Handle,
        target: BrowseTarget,
        address: Option<&Address>,
        mask: NodeClassMask,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Vec<BrowseEntry>> {
        self.stats.record_round_trip();
        let provider = self.connection.provider();
        let result = cancellable(
            "browse",
            cancel,
            provider.browse(session, &target, true, mask),
        )
        .await;

        match result {
            Ok(Ok(entries)) => Ok(dedupe_entries(entries)),
            Ok(Err(e)) => {
                self.stats.record_error();
                Err(translate_browse_error(e, address))
            }
            Err(e) => Err(e),
        }
    }
}

/// Drops repeated browse names, keeping first-seen order.
fn dedupe_entries(entries: Vec<BrowseEntry>) -> Vec<BrowseEntry> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.browse_name.clone()))
        .collect()
}

/// Maps node-level statuses to [`BrowseError::BadStatus`]; everything else
/// stays an opaque provider failure.
fn translate_browse_error(error: ProviderError, address: Option<&Address>) -> UaError {
    match (error.status, address) {
        (
            Some(status @ (StatusCode::BAD_NODE_ID_UNKNOWN | StatusCode::BAD_NODE_ID_INVALID)),
            Some(address),
        ) => BrowseError::BadStatus {
            address: address.to_string(),
            status,
        }
        .into(),
        _ => error.into(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browse_depth_from_flag() {
        assert_eq!(BrowseDepth::from(true), BrowseDepth::Full);
        assert_eq!(BrowseDepth::from(false), BrowseDepth::Shallow);
        assert_eq!(BrowseDepth::default(), BrowseDepth::Full);
    }

    #[test]
    fn test_translate_unknown_node() {
        let address = Address::new("Plant.Missing");
        let err = translate_browse_error(
            ProviderError::status("unknown", StatusCode::BAD_NODE_ID_UNKNOWN),
            Some(&address),
        );
        assert!(matches!(
            err,
            UaError::Browse(BrowseError::BadStatus { ref address, status })
                if address == "Plant.Missing" && status == StatusCode::BAD_NODE_ID_UNKNOWN
        ));
    }

    #[test]
    fn test_translate_transport_failure_stays_opaque() {
        let address = Address::new("Plant");
        let err = translate_browse_error(
            ProviderError::status("channel closed", StatusCode::BAD_CONNECTION_CLOSED),
            Some(&address),
        );
        assert!(matches!(err, UaError::Provider(_)));

        let err = translate_browse_error(
            ProviderError::status("unknown", StatusCode::BAD_NODE_ID_UNKNOWN),
            None,
        );
        assert!(matches!(err, UaError::Provider(_)));
    }

    #[test]
    fn test_dedupe_entries_keeps_first_seen_order() {
        let entries = vec![
            BrowseEntry::new("Line1", NodeClass::Object),
            BrowseEntry::new("Speed", NodeClass::Variable),
            BrowseEntry::new("Line1", NodeClass::Object),
            BrowseEntry::new("Alarm", NodeClass::Variable),
            BrowseEntry::new("Speed", NodeClass::Variable),
        ];

        let names: Vec<_> = dedupe_entries(entries)
            .into_iter()
            .map(|e| e.browse_name)
            .collect();

        assert_eq!(names, ["Line1", "Speed", "Alarm"]);
    }

    #[test]
    fn test_statistics() {
        let stats = BrowseStatistics::new();
        stats.record_round_trip();
        stats.record_nodes(3, 1022);
        stats.record_error();
        assert_eq!(stats.round_trips(), 1);
        assert_eq!(stats.groups(), 3);
        assert_eq!(stats.tags(), 1022);
        assert_eq!(stats.errors(), 1);
    }
}
