// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Session Provider
//!
//! In-memory [`SessionProvider`] for exercising the client without a server.
//!
//! ## Design Principles
//!
//! - The address space is a plain tree of objects and variables keyed by
//!   address, in insertion order
//! - Every failure mode is a switch the test flips
//! - Every call is counted for verification
//! - The last keep-alive sender and every monitored callback are kept so
//!   tests can drive health reports and notifications

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ua_access::{
    Address, BrowseEntry, BrowseTarget, DataChangeCallback, DataChangeNotification, DataValue,
    KeepAliveSender, MonitoredItemRequest, NodeClass, NodeClassMask, NodeId, ProviderError,
    ProviderResult, SessionHandle, SessionProvider, SessionRequest, StatusCode, SubscriptionId,
    SubscriptionSettings, Value,
};

// =============================================================================
// Mock Session
// =============================================================================

/// Session handle handed out by [`MockSessionProvider`].
#[derive(Debug, Clone)]
pub struct MockSession {
    id: String,
    generation: u64,
    connected: Arc<AtomicBool>,
}

impl MockSession {
    fn new(generation: u64, connected: bool) -> Self {
        Self {
            id: format!("mock-session-{}", uuid::Uuid::new_v4()),
            generation,
            connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    /// How many reconnects produced this handle.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Marks the channel as lost.
    pub fn drop_channel(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl SessionHandle for MockSession {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn session_id(&self) -> String {
        self.id.clone()
    }
}

// =============================================================================
// Address Space
// =============================================================================

#[derive(Debug, Clone)]
struct MockNode {
    class: NodeClass,
    children: Vec<String>,
    value: Value,
    writable: bool,
}

#[derive(Debug, Default)]
struct AddressSpace {
    roots: Vec<String>,
    nodes: BTreeMap<String, MockNode>,
}

impl AddressSpace {
    fn insert(&mut self, address: &str, node: MockNode) {
        let address = Address::new(address);
        let name = address.name().to_string();
        let parent = address
            .as_str()
            .strip_suffix(&name)
            .and_then(|p| p.strip_suffix(Address::DELIMITER));

        match parent {
            Some(parent) => {
                let parent_node = self
                    .nodes
                    .get_mut(parent)
                    .unwrap_or_else(|| panic!("parent '{parent}' of '{address}' does not exist"));
                assert_eq!(
                    parent_node.class,
                    NodeClass::Object,
                    "parent '{parent}' is not an object"
                );
                parent_node.children.push(name);
            }
            None => self.roots.push(name),
        }
        self.nodes.insert(address.as_str().to_string(), node);
    }

    fn children_of(&self, parent: Option<&str>) -> Option<Vec<BrowseEntry>> {
        let (prefix, names) = match parent {
            None => (None, &self.roots),
            Some(p) => (Some(p), &self.nodes.get(p)?.children),
        };
        Some(
            names
                .iter()
                .filter_map(|name| {
                    let key = match prefix {
                        Some(p) => format!("{p}.{name}"),
                        None => name.clone(),
                    };
                    self.nodes
                        .get(&key)
                        .map(|node| BrowseEntry::new(name.clone(), node.class))
                })
                .collect(),
        )
    }
}

// =============================================================================
// Failure modes
// =============================================================================

/// What `create_session` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateBehavior {
    /// Hands out a connected session.
    #[default]
    Connected,
    /// Returns no session.
    NoSession,
    /// Hands out a session that is already disconnected.
    Disconnected,
    /// Fails with a provider error.
    Fail,
    /// Never answers.
    Hang,
}

// =============================================================================
// Mock Session Provider
// =============================================================================

/// Configurable in-memory session provider.
pub struct MockSessionProvider {
    namespace_index: u16,
    space: Mutex<AddressSpace>,

    create_behavior: Mutex<CreateBehavior>,
    read_overrides: Mutex<HashMap<String, StatusCode>>,
    write_overrides: Mutex<HashMap<String, StatusCode>>,
    browse_overrides: Mutex<HashMap<String, StatusCode>>,
    monitor_overrides: Mutex<HashMap<String, StatusCode>>,
    latency: Mutex<Duration>,
    monitor_latency: Mutex<Duration>,
    reconnect_delay: Mutex<Duration>,
    fail_transport: AtomicBool,
    fail_close: AtomicBool,
    fail_reconnect: AtomicBool,
    fail_delete_subscription: AtomicBool,
    truncate_results: AtomicBool,
    duplicate_references: AtomicBool,

    keep_alive: Mutex<Option<KeepAliveSender>>,
    last_session: Mutex<Option<MockSession>>,
    last_request: Mutex<Option<SessionRequest>>,
    monitors: Mutex<HashMap<u32, Vec<(Address, Arc<dyn DataChangeCallback>)>>>,
    subscription_settings: Mutex<Vec<SubscriptionSettings>>,
    deleted_subscriptions: Mutex<Vec<SubscriptionId>>,
    next_subscription_id: AtomicU32,

    create_count: AtomicU64,
    close_count: AtomicU64,
    dispose_count: AtomicU64,
    read_count: AtomicU64,
    write_count: AtomicU64,
    browse_count: AtomicU64,
    reconnect_count: AtomicU64,
    reconnects_in_flight: AtomicU64,
    max_reconnects_in_flight: AtomicU64,
    write_history: Mutex<Vec<(NodeId, Value)>>,
    served_generations: Mutex<Vec<u64>>,
}

impl std::fmt::Debug for MockSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSessionProvider")
            .field("namespace_index", &self.namespace_index)
            .field("nodes", &self.space.lock().nodes.len())
            .field("create_behavior", &*self.create_behavior.lock())
            .finish_non_exhaustive()
    }
}

impl Default for MockSessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSessionProvider {
    /// Creates an empty provider serving namespace 2.
    pub fn new() -> Self {
        Self::with_namespace(2)
    }

    /// Creates an empty provider serving the given namespace.
    pub fn with_namespace(namespace_index: u16) -> Self {
        Self {
            namespace_index,
            space: Mutex::new(AddressSpace::default()),
            create_behavior: Mutex::new(CreateBehavior::default()),
            read_overrides: Mutex::new(HashMap::new()),
            write_overrides: Mutex::new(HashMap::new()),
            browse_overrides: Mutex::new(HashMap::new()),
            monitor_overrides: Mutex::new(HashMap::new()),
            latency: Mutex::new(Duration::ZERO),
            monitor_latency: Mutex::new(Duration::ZERO),
            reconnect_delay: Mutex::new(Duration::from_millis(20)),
            fail_transport: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            fail_reconnect: AtomicBool::new(false),
            fail_delete_subscription: AtomicBool::new(false),
            truncate_results: AtomicBool::new(false),
            duplicate_references: AtomicBool::new(false),
            keep_alive: Mutex::new(None),
            last_session: Mutex::new(None),
            last_request: Mutex::new(None),
            monitors: Mutex::new(HashMap::new()),
            subscription_settings: Mutex::new(Vec::new()),
            deleted_subscriptions: Mutex::new(Vec::new()),
            next_subscription_id: AtomicU32::new(1),
            create_count: AtomicU64::new(0),
            close_count: AtomicU64::new(0),
            dispose_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            browse_count: AtomicU64::new(0),
            reconnect_count: AtomicU64::new(0),
            reconnects_in_flight: AtomicU64::new(0),
            max_reconnects_in_flight: AtomicU64::new(0),
            write_history: Mutex::new(Vec::new()),
            served_generations: Mutex::new(Vec::new()),
        }
    }

    // =========================================================================
    // Address space setup
    // =========================================================================

    /// Adds an object. Its parent, if any, must already exist.
    pub fn add_object(&self, address: &str) -> &Self {
        self.space.lock().insert(
            address,
            MockNode {
                class: NodeClass::Object,
                children: Vec::new(),
                value: Value::Null,
                writable: false,
            },
        );
        self
    }

    /// Adds a writable variable.
    pub fn add_variable(&self, address: &str, value: impl Into<Value>) -> &Self {
        self.insert_variable(address, value.into(), true)
    }

    /// Adds a read-only variable.
    pub fn add_read_only_variable(&self, address: &str, value: impl Into<Value>) -> &Self {
        self.insert_variable(address, value.into(), false)
    }

    fn insert_variable(&self, address: &str, value: Value, writable: bool) -> &Self {
        self.space.lock().insert(
            address,
            MockNode {
                class: NodeClass::Variable,
                children: Vec::new(),
                value,
                writable,
            },
        );
        self
    }

    /// Returns the stored value of a variable.
    pub fn value(&self, address: &str) -> Option<Value> {
        self.space.lock().nodes.get(address).map(|n| n.value.clone())
    }

    // =========================================================================
    // Failure injection
    // =========================================================================

    /// Sets what `create_session` does.
    pub fn set_create_behavior(&self, behavior: CreateBehavior) {
        *self.create_behavior.lock() = behavior;
    }

    /// Makes reads of `address` report `status`.
    pub fn fail_read(&self, address: &str, status: StatusCode) {
        self.read_overrides.lock().insert(address.to_string(), status);
    }

    /// Makes writes to `address` report `status`.
    pub fn fail_write(&self, address: &str, status: StatusCode) {
        self.write_overrides
            .lock()
            .insert(address.to_string(), status);
    }

    /// Makes browsing `address` fail with `status`.
    pub fn fail_browse(&self, address: &str, status: StatusCode) {
        self.browse_overrides
            .lock()
            .insert(address.to_string(), status);
    }

    /// Makes monitoring `address` report `status`.
    pub fn reject_monitor(&self, address: &str, status: StatusCode) {
        self.monitor_overrides
            .lock()
            .insert(address.to_string(), status);
    }

    /// Delays every read, write and browse.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Delays attaching monitored items.
    pub fn set_monitor_latency(&self, latency: Duration) {
        *self.monitor_latency.lock() = latency;
    }

    /// Sets how long a reconnect takes.
    pub fn set_reconnect_delay(&self, delay: Duration) {
        *self.reconnect_delay.lock() = delay;
    }

    /// Makes every service call fail at the transport level.
    pub fn fail_transport(&self, fail: bool) {
        self.fail_transport.store(fail, Ordering::SeqCst);
    }

    /// Makes closing a session fail.
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Makes reconnect give up.
    pub fn fail_reconnect(&self, fail: bool) {
        self.fail_reconnect.store(fail, Ordering::SeqCst);
    }

    /// Makes deleting subscriptions fail.
    pub fn fail_delete_subscription(&self, fail: bool) {
        self.fail_delete_subscription.store(fail, Ordering::SeqCst);
    }

    /// Makes read and write return one result fewer than requested.
    pub fn truncate_results(&self, truncate: bool) {
        self.truncate_results.store(truncate, Ordering::SeqCst);
    }

    /// Makes browse return every child twice, as a server does when a child
    /// is reachable through two hierarchical references.
    pub fn duplicate_references(&self, duplicate: bool) {
        self.duplicate_references.store(duplicate, Ordering::SeqCst);
    }

    // =========================================================================
    // Driving the client
    // =========================================================================

    /// Pushes a health report through the last session's keep-alive channel.
    ///
    /// Returns `false` if no channel was handed out.
    pub fn report_keep_alive(&self, status: StatusCode) -> bool {
        match self.keep_alive.lock().as_ref() {
            Some(sender) => {
                sender.notify(status);
                true
            }
            None => false,
        }
    }

    /// Generations of the sessions that served each read and write, in order.
    pub fn served_generations(&self) -> Vec<u64> {
        self.served_generations.lock().clone()
    }

    /// Returns the most recently created or reconnected session.
    pub fn last_session(&self) -> Option<MockSession> {
        self.last_session.lock().clone()
    }

    /// Returns the last session request.
    pub fn last_request(&self) -> Option<SessionRequest> {
        self.last_request.lock().clone()
    }

    /// Delivers a value change to every monitor of `address`.
    ///
    /// Returns the number of callbacks invoked.
    pub async fn emit(&self, address: &str, value: impl Into<Value>) -> usize {
        let value = value.into();
        let targets: Vec<(Address, Arc<dyn DataChangeCallback>)> = self
            .monitors
            .lock()
            .values()
            .flatten()
            .filter(|(a, _)| a.as_str() == address)
            .cloned()
            .collect();

        for (address, callback) in &targets {
            let notification = DataChangeNotification::new(address.clone(), value.clone())
                .with_source_timestamp(chrono::Utc::now());
            callback.on_data_change(notification).await;
        }
        targets.len()
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Number of `create_session` calls.
    pub fn create_count(&self) -> u64 {
        self.create_count.load(Ordering::SeqCst)
    }

    /// Number of `close_session` calls.
    pub fn close_count(&self) -> u64 {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Number of `dispose_session` calls.
    pub fn dispose_count(&self) -> u64 {
        self.dispose_count.load(Ordering::SeqCst)
    }

    /// Number of read round trips.
    pub fn read_count(&self) -> u64 {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Number of write round trips.
    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Number of browse round trips.
    pub fn browse_count(&self) -> u64 {
        self.browse_count.load(Ordering::SeqCst)
    }

    /// Number of reconnect calls.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::SeqCst)
    }

    /// Highest number of reconnects observed running at once.
    pub fn max_reconnects_in_flight(&self) -> u64 {
        self.max_reconnects_in_flight.load(Ordering::SeqCst)
    }

    /// Subscriptions deleted so far, in call order.
    pub fn deleted_subscriptions(&self) -> Vec<SubscriptionId> {
        self.deleted_subscriptions.lock().clone()
    }

    /// Subscriptions with live monitors.
    pub fn live_subscriptions(&self) -> usize {
        self.monitors.lock().len()
    }

    /// Settings of every subscription created.
    pub fn subscription_settings(&self) -> Vec<SubscriptionSettings> {
        self.subscription_settings.lock().clone()
    }

    /// Every item written, in call order.
    pub fn write_history(&self) -> Vec<(NodeId, Value)> {
        self.write_history.lock().clone()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Rejects calls on a closed session and records which session served.
    fn check_session(&self, handle: &MockSession) -> ProviderResult<()> {
        if !handle.is_connected() {
            return Err(ProviderError::status(
                format!("session {} is closed", handle.id),
                StatusCode::BAD_SESSION_CLOSED,
            ));
        }
        self.served_generations.lock().push(handle.generation);
        Ok(())
    }

    async fn service_call(&self, counter: &AtomicU64) -> ProviderResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(ProviderError::status(
                "mock transport failure",
                StatusCode::BAD_COMMUNICATION_ERROR,
            ));
        }
        Ok(())
    }

    /// Resolves a node ID to an address in the served namespace.
    fn address_of(&self, node_id: &NodeId) -> Option<String> {
        if node_id.namespace_index != self.namespace_index {
            return None;
        }
        node_id.as_str().map(str::to_string)
    }

    fn truncate<T>(&self, mut results: Vec<T>) -> Vec<T> {
        if self.truncate_results.load(Ordering::SeqCst) {
            results.pop();
        }
        results
    }

    fn read_node(&self, node_id: &NodeId) -> DataValue {
        let Some(address) = self.address_of(node_id) else {
            return DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN);
        };
        if let Some(status) = self.read_overrides.lock().get(&address) {
            return DataValue::bad(*status);
        }
        match self.space.lock().nodes.get(&address) {
            Some(node) if node.class == NodeClass::Variable => DataValue::good(node.value.clone()),
            Some(_) => DataValue::bad(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
            None => DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN),
        }
    }

    fn write_node(&self, node_id: &NodeId, value: &Value) -> StatusCode {
        let Some(address) = self.address_of(node_id) else {
            return StatusCode::BAD_NODE_ID_UNKNOWN;
        };
        if let Some(status) = self.write_overrides.lock().get(&address) {
            return *status;
        }
        let mut space = self.space.lock();
        let Some(node) = space.nodes.get_mut(&address) else {
            return StatusCode::BAD_NODE_ID_UNKNOWN;
        };
        if node.class != NodeClass::Variable || !node.writable {
            return StatusCode::BAD_NOT_WRITABLE;
        }
        if std::mem::discriminant(&node.value) != std::mem::discriminant(value) {
            return StatusCode::BAD_TYPE_MISMATCH;
        }
        node.value = value.clone();
        StatusCode::GOOD
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    type Handle = MockSession;

    async fn create_session(
        &self,
        request: &SessionRequest,
        _timeout: Duration,
        keep_alive: Option<KeepAliveSender>,
    ) -> ProviderResult<Option<Self::Handle>> {
        self.create_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());

        let behavior = *self.create_behavior.lock();
        let session = match behavior {
            CreateBehavior::Connected => MockSession::new(0, true),
            CreateBehavior::Disconnected => MockSession::new(0, false),
            CreateBehavior::NoSession => return Ok(None),
            CreateBehavior::Fail => {
                return Err(ProviderError::status(
                    format!("endpoint {} unreachable", request.endpoint),
                    StatusCode::BAD_COMMUNICATION_ERROR,
                ))
            }
            CreateBehavior::Hang => std::future::pending().await,
        };

        *self.keep_alive.lock() = keep_alive;
        *self.last_session.lock() = Some(session.clone());
        Ok(Some(session))
    }

    async fn close_session(&self, handle: &Self::Handle) -> ProviderResult<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        handle.drop_channel();
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(ProviderError::status(
                "close rejected",
                StatusCode::BAD_SESSION_ID_INVALID,
            ));
        }
        Ok(())
    }

    async fn dispose_session(&self, handle: &Self::Handle) {
        self.dispose_count.fetch_add(1, Ordering::SeqCst);
        handle.drop_channel();
    }

    async fn reconnect(&self, handle: &Self::Handle) -> ProviderResult<Self::Handle> {
        self.reconnect_count.fetch_add(1, Ordering::SeqCst);
        let running = self.reconnects_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_reconnects_in_flight
            .fetch_max(running, Ordering::SeqCst);

        let delay = *self.reconnect_delay.lock();
        tokio::time::sleep(delay).await;
        self.reconnects_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_reconnect.load(Ordering::SeqCst) {
            return Err(ProviderError::status(
                "server did not come back",
                StatusCode::BAD_SERVER_NOT_CONNECTED,
            ));
        }

        let session = MockSession::new(handle.generation + 1, true);
        *self.last_session.lock() = Some(session.clone());
        Ok(session)
    }

    async fn read(
        &self,
        handle: &Self::Handle,
        nodes: &[NodeId],
    ) -> ProviderResult<Vec<DataValue>> {
        self.service_call(&self.read_count).await?;
        self.check_session(handle)?;
        let results = nodes.iter().map(|n| self.read_node(n)).collect();
        Ok(self.truncate(results))
    }

    async fn write(
        &self,
        handle: &Self::Handle,
        items: &[(NodeId, Value)],
    ) -> ProviderResult<Vec<StatusCode>> {
        self.service_call(&self.write_count).await?;
        self.check_session(handle)?;
        self.write_history.lock().extend(items.iter().cloned());
        let results = items
            .iter()
            .map(|(node_id, value)| self.write_node(node_id, value))
            .collect();
        Ok(self.truncate(results))
    }

    async fn browse(
        &self,
        _handle: &Self::Handle,
        target: &BrowseTarget,
        forward: bool,
        mask: NodeClassMask,
    ) -> ProviderResult<Vec<BrowseEntry>> {
        self.service_call(&self.browse_count).await?;
        assert!(forward, "the client only browses forward");

        let parent = match target {
            BrowseTarget::Root => None,
            BrowseTarget::Node(node_id) => Some(self.address_of(node_id).ok_or_else(|| {
                ProviderError::status(
                    format!("unknown node {node_id}"),
                    StatusCode::BAD_NODE_ID_UNKNOWN,
                )
            })?),
        };

        if let Some(address) = &parent {
            if let Some(status) = self.browse_overrides.lock().get(address) {
                return Err(ProviderError::status(
                    format!("browse of {address} rejected"),
                    *status,
                ));
            }
        }

        let entries = self
            .space
            .lock()
            .children_of(parent.as_deref())
            .ok_or_else(|| {
                ProviderError::status("unknown node", StatusCode::BAD_NODE_ID_UNKNOWN)
            })?;

        let entries: Vec<BrowseEntry> = entries
            .into_iter()
            .filter(|e| mask.contains(e.node_class))
            .collect();
        if self.duplicate_references.load(Ordering::SeqCst) {
            return Ok(entries.iter().chain(entries.iter()).cloned().collect());
        }
        Ok(entries)
    }

    async fn create_subscription(
        &self,
        _handle: &Self::Handle,
        settings: &SubscriptionSettings,
    ) -> ProviderResult<SubscriptionId> {
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(ProviderError::new("mock transport failure"));
        }
        self.subscription_settings.lock().push(settings.clone());
        let id = self.next_subscription_id.fetch_add(1, Ordering::SeqCst);
        self.monitors.lock().insert(id, Vec::new());
        Ok(SubscriptionId(id))
    }

    async fn add_monitored_item(
        &self,
        _handle: &Self::Handle,
        subscription: SubscriptionId,
        item: &MonitoredItemRequest,
        callback: Arc<dyn DataChangeCallback>,
    ) -> ProviderResult<StatusCode> {
        let latency = *self.monitor_latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(status) = self.monitor_overrides.lock().get(item.address.as_str()) {
            return Ok(*status);
        }
        let known = self
            .address_of(&item.node_id)
            .is_some_and(|a| self.space.lock().nodes.contains_key(&a));
        if !known {
            return Ok(StatusCode::BAD_NODE_ID_UNKNOWN);
        }

        let mut monitors = self.monitors.lock();
        let Some(items) = monitors.get_mut(&subscription.value()) else {
            return Ok(StatusCode::BAD_SUBSCRIPTION_ID_INVALID);
        };
        items.push((item.address.clone(), callback));
        Ok(StatusCode::GOOD)
    }

    async fn delete_subscription(
        &self,
        _handle: &Self::Handle,
        subscription: SubscriptionId,
    ) -> ProviderResult<()> {
        self.deleted_subscriptions.lock().push(subscription);
        if self.fail_delete_subscription.load(Ordering::SeqCst) {
            return Err(ProviderError::status(
                "delete subscription rejected",
                StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            ));
        }
        self.monitors.lock().remove(&subscription.value());
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_space_children_in_insertion_order() {
        let provider = MockSessionProvider::new();
        provider
            .add_object("Plant")
            .add_variable("Plant.B", 1i32)
            .add_variable("Plant.A", 2i32);

        let children = provider.space.lock().children_of(Some("Plant")).unwrap();
        let names: Vec<_> = children.iter().map(|e| e.browse_name.as_str()).collect();
        assert_eq!(names, ["B", "A"]);
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_missing_parent_panics() {
        MockSessionProvider::new().add_variable("Nowhere.Tag", true);
    }

    #[test]
    fn test_write_rejects_type_change() {
        let provider = MockSessionProvider::new();
        provider.add_object("D").add_variable("D.Flag", false);

        let node = NodeId::string(2, "D.Flag");
        assert_eq!(
            provider.write_node(&node, &Value::Int32(1)),
            StatusCode::BAD_TYPE_MISMATCH
        );
        assert_eq!(provider.write_node(&node, &Value::Boolean(true)), StatusCode::GOOD);
        assert_eq!(provider.value("D.Flag"), Some(Value::Boolean(true)));
    }

    #[test]
    fn test_other_namespace_is_unknown() {
        let provider = MockSessionProvider::new();
        provider.add_object("D").add_variable("D.Flag", false);
        let read = provider.read_node(&NodeId::string(3, "D.Flag"));
        assert_eq!(read.status, StatusCode::BAD_NODE_ID_UNKNOWN);
    }
}
