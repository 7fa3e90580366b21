// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session provider backed by the `opcua` crate.
//!
//! The `opcua` session API is synchronous, so every service call runs on the
//! blocking pool. Channel health comes from the session's connection status
//! callback and is forwarded to the [`KeepAliveSender`].
//!
//! Data change callbacks fire on the session's own threads. Each
//! subscription gets an unbounded queue drained by one task, so the
//! application callback sees notifications in arrival order and can await.
//!
//! # Example
//!
//! ```rust,ignore
//! use ua_access::provider::opcua::OpcUaSessionProvider;
//! use ua_access::{ClientConfig, UaClient};
//!
//! let config = ClientConfig::builder()
//!     .endpoint("opc.tcp://localhost:4840")
//!     .security_enabled(true)
//!     .accept_untrusted(true)
//!     .build()?;
//! let client = UaClient::new(config, OpcUaSessionProvider::new())?;
//! client.connect_default().await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opcua::client::prelude::{
    AttributeId, AttributeService, BrowseDescription, BrowseDescriptionResultMask,
    BrowseDirection, Client, ClientBuilder, ConnectionStatusCallback,
    DataChangeCallback as OpcDataChangeCallback, ExtensionObject, IdentityToken,
    MonitoredItemCreateRequest, MonitoredItemService, MonitoringMode, MonitoringParameters,
    ReadValueId, ReferenceTypeId, Session, SessionCommand, SubscriptionService,
    TimestampsToReturn, ViewService, WriteValue,
};
use opcua::sync::RwLock as OpcRwLock;
use parking_lot::{Mutex, RwLock};
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{
    BrowseEntry, BrowseTarget, DataValue, KeepAliveSender, MonitoredItemRequest, SessionHandle,
    SessionProvider, SessionRequest,
};
use crate::address::Address;
use crate::error::{ProviderError, ProviderResult};
use crate::status::StatusCode;
use crate::subscription::{
    DataChangeCallback, DataChangeNotification, SubscriptionId, SubscriptionSettings,
};
use crate::types::{NodeClass, NodeClassMask, NodeId, NodeIdentifier, SecurityMode, UserIdentity};
use crate::value::Value;

type SharedSession = Arc<OpcRwLock<Session>>;
type Route = Arc<RwLock<Option<(Address, Arc<dyn DataChangeCallback>)>>>;

/// Raw data change captured on the session thread.
struct RawChange {
    value: Option<Value>,
    status: StatusCode,
    source_timestamp: Option<DateTime<Utc>>,
    server_timestamp: Option<DateTime<Utc>>,
}

struct SubscriptionRoute {
    route: Route,
    forwarder: JoinHandle<()>,
}

// =============================================================================
// OpcUaSession
// =============================================================================

/// Handle to a session owned by [`OpcUaSessionProvider`].
pub struct OpcUaSession {
    id: String,
    session: SharedSession,
    stop: Arc<Mutex<Option<oneshot::Sender<SessionCommand>>>>,
    routes: Arc<Mutex<HashMap<u32, SubscriptionRoute>>>,
}

impl OpcUaSession {
    fn derive(&self) -> Self {
        Self {
            id: self.id.clone(),
            session: self.session.clone(),
            stop: self.stop.clone(),
            routes: self.routes.clone(),
        }
    }
}

impl SessionHandle for OpcUaSession {
    fn is_connected(&self) -> bool {
        self.session.read().is_connected()
    }

    fn session_id(&self) -> String {
        self.id.clone()
    }
}

// =============================================================================
// OpcUaSessionProvider
// =============================================================================

/// [`SessionProvider`] over the `opcua` client stack.
#[derive(Debug, Clone)]
pub struct OpcUaSessionProvider {
    reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl Default for OpcUaSessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpcUaSessionProvider {
    /// Default number of reconnect attempts.
    pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
    /// Default delay before the first reconnect retry. Doubles per attempt.
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

    /// Creates a provider with the default reconnect policy.
    pub fn new() -> Self {
        Self {
            reconnect_attempts: Self::DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Sets the number of reconnect attempts.
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_attempts = attempts.max(1);
        self
    }

    /// Sets the initial reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    fn build_client(request: &SessionRequest) -> ProviderResult<Client> {
        // The opcua stack trusts all or nothing, so the policy is asked about
        // the one event it can change the outcome of.
        let trust_untrusted = request
            .trust
            .accepts(StatusCode::BAD_CERTIFICATE_UNTRUSTED);

        ClientBuilder::new()
            .application_name(request.application_name.as_str())
            .application_uri(request.application_uri.as_str())
            .pki_dir(request.pki_dir.clone())
            .create_sample_keypair(true)
            .trust_server_certs(trust_untrusted)
            .session_retry_limit(0)
            .session_timeout(request.session_timeout.as_millis() as u32)
            .client()
            .ok_or_else(|| ProviderError::new("invalid opcua client configuration"))
    }

    fn identity_token(identity: &UserIdentity) -> IdentityToken {
        match identity {
            UserIdentity::Anonymous => IdentityToken::Anonymous,
            UserIdentity::UserName { username, password } => {
                IdentityToken::UserName(username.clone(), password.clone())
            }
        }
    }

    fn message_security_mode(mode: SecurityMode) -> opcua::types::MessageSecurityMode {
        match mode {
            SecurityMode::None => opcua::types::MessageSecurityMode::None,
            SecurityMode::Sign => opcua::types::MessageSecurityMode::Sign,
            SecurityMode::SignAndEncrypt => opcua::types::MessageSecurityMode::SignAndEncrypt,
        }
    }

    fn connect_blocking(
        request: &SessionRequest,
        keep_alive: Option<KeepAliveSender>,
    ) -> ProviderResult<Option<SharedSession>> {
        let mut client = Self::build_client(request)?;

        let endpoints = client
            .get_server_endpoints_from_url(request.endpoint.as_str())
            .map_err(|status| bad_status("endpoint discovery failed", status))?;

        let mode = Self::message_security_mode(request.security.mode);
        let preferred_uri = request.security.policy.uri();

        // Exact policy match first, then the strongest endpoint of the mode.
        let endpoint = endpoints
            .iter()
            .find(|e| e.security_mode == mode && e.security_policy_uri.as_ref() == preferred_uri)
            .or_else(|| {
                endpoints
                    .iter()
                    .filter(|e| e.security_mode == mode)
                    .max_by_key(|e| e.security_level)
            })
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(format!(
                    "no endpoint offers security {}",
                    request.security
                ))
            })?;

        debug!(
            security_policy = %endpoint.security_policy_uri,
            security_mode = ?endpoint.security_mode,
            "Selected endpoint"
        );

        let session = client
            .connect_to_endpoint(endpoint, Self::identity_token(&request.identity))
            .map_err(|status| bad_status("session activation failed", status))?;

        if let Some(keep_alive) = keep_alive {
            session
                .write()
                .set_connection_status_callback(ConnectionStatusCallback::new(
                    move |connected| {
                        let status = if connected {
                            StatusCode::GOOD
                        } else {
                            StatusCode::BAD_CONNECTION_CLOSED
                        };
                        keep_alive.notify(status);
                    },
                ));
        }

        Ok(Some(session))
    }
}

#[async_trait]
impl SessionProvider for OpcUaSessionProvider {
    type Handle = OpcUaSession;

    async fn create_session(
        &self,
        request: &SessionRequest,
        _timeout: Duration,
        keep_alive: Option<KeepAliveSender>,
    ) -> ProviderResult<Option<Self::Handle>> {
        info!(endpoint = %request.endpoint, security = %request.security, "Connecting");

        let owned = request.clone();
        let session =
            blocking("connect", move || Self::connect_blocking(&owned, keep_alive)).await?;
        let Some(session) = session else {
            return Ok(None);
        };

        let stop = Session::run_async(session.clone());
        Ok(Some(OpcUaSession {
            id: uuid::Uuid::new_v4().to_string(),
            session,
            stop: Arc::new(Mutex::new(Some(stop))),
            routes: Arc::new(Mutex::new(HashMap::new())),
        }))
    }

    async fn close_session(&self, handle: &Self::Handle) -> ProviderResult<()> {
        let session = handle.session.clone();
        blocking("disconnect", move || {
            session.read().disconnect();
            Ok(())
        })
        .await
    }

    async fn dispose_session(&self, handle: &Self::Handle) {
        if let Some(stop) = handle.stop.lock().take() {
            // The session loop may already have exited.
            let _ = stop.send(SessionCommand::Stop);
        }
        for (_, route) in handle.routes.lock().drain() {
            route.forwarder.abort();
        }
        trace!(session_id = %handle.id, "Session disposed");
    }

    async fn reconnect(&self, handle: &Self::Handle) -> ProviderResult<Self::Handle> {
        let mut delay = self.reconnect_delay;
        let mut last_error = None;

        for attempt in 1..=self.reconnect_attempts {
            let session = handle.session.clone();
            let result = blocking("reconnect", move || {
                session
                    .write()
                    .reconnect_and_activate()
                    .map_err(|status| bad_status("reconnect failed", status))
            })
            .await;

            match result {
                Ok(()) => {
                    info!(session_id = %handle.id, attempt, "Session reactivated");
                    return Ok(handle.derive());
                }
                Err(e) => {
                    warn!(session_id = %handle.id, attempt, error = %e, "Reconnect attempt failed");
                    last_error = Some(e);
                    if attempt < self.reconnect_attempts {
                        tokio::time::sleep(delay).await;
                        delay = delay.saturating_mul(2);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::new("reconnect not attempted")))
    }

    async fn read(
        &self,
        handle: &Self::Handle,
        nodes: &[NodeId],
    ) -> ProviderResult<Vec<DataValue>> {
        let session = handle.session.clone();
        let requests: Vec<ReadValueId> = nodes.iter().map(value_attribute).collect();
        trace!(count = requests.len(), "Reading");

        blocking("read", move || {
            let results = session
                .read()
                .read(&requests, TimestampsToReturn::Both, 0.0)
                .map_err(|status| bad_status("read failed", status))?;
            Ok(results.iter().map(from_opcua_data_value).collect())
        })
        .await
    }

    async fn write(
        &self,
        handle: &Self::Handle,
        items: &[(NodeId, Value)],
    ) -> ProviderResult<Vec<StatusCode>> {
        let session = handle.session.clone();
        let requests: Vec<WriteValue> = items
            .iter()
            .map(|(node_id, value)| WriteValue {
                node_id: to_opcua_node_id(node_id),
                attribute_id: AttributeId::Value as u32,
                index_range: opcua::types::UAString::null(),
                value: opcua::types::DataValue::new_now(to_opcua_variant(value)),
            })
            .collect();
        trace!(count = requests.len(), "Writing");

        blocking("write", move || {
            let results = session
                .read()
                .write(&requests)
                .map_err(|status| bad_status("write failed", status))?;
            Ok(results.iter().map(|s| StatusCode(s.bits())).collect())
        })
        .await
    }

    async fn browse(
        &self,
        handle: &Self::Handle,
        target: &BrowseTarget,
        forward: bool,
        mask: NodeClassMask,
    ) -> ProviderResult<Vec<BrowseEntry>> {
        let session = handle.session.clone();
        let description = BrowseDescription {
            node_id: to_opcua_node_id(&target.node_id()),
            browse_direction: if forward {
                BrowseDirection::Forward
            } else {
                BrowseDirection::Inverse
            },
            reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
            include_subtypes: true,
            node_class_mask: mask.0,
            result_mask: BrowseDescriptionResultMask::all().bits(),
        };

        blocking("browse", move || {
            let results = session
                .read()
                .browse(&[description])
                .map_err(|status| bad_status("browse failed", status))?
                .unwrap_or_default();

            let Some(result) = results.into_iter().next() else {
                return Ok(Vec::new());
            };
            if !result.status_code.is_good() {
                return Err(bad_status("browse rejected", result.status_code));
            }

            Ok(result
                .references
                .unwrap_or_default()
                .iter()
                .filter_map(|r| {
                    NodeClass::from_value(r.node_class as u32)
                        .map(|class| BrowseEntry::new(r.browse_name.name.as_ref(), class))
                })
                .collect())
        })
        .await
    }

    async fn create_subscription(
        &self,
        handle: &Self::Handle,
        settings: &SubscriptionSettings,
    ) -> ProviderResult<SubscriptionId> {
        let session = handle.session.clone();
        let settings = settings.clone();

        let route: Route = Arc::new(RwLock::new(None));
        let (tx, rx) = mpsc::unbounded_channel::<RawChange>();
        let forwarder = tokio::spawn(forward_changes(route.clone(), rx));

        let created = blocking("create_subscription", move || {
            session
                .read()
                .create_subscription(
                    settings.publishing_interval.as_millis() as f64,
                    settings.lifetime_count,
                    settings.keep_alive_count,
                    settings.max_notifications_per_publish,
                    settings.priority,
                    settings.publishing_enabled,
                    OpcDataChangeCallback::new(move |items| {
                        for item in items {
                            let change = from_opcua_data_value(item.last_value());
                            // Receiver gone means the subscription is being torn down.
                            let _ = tx.send(RawChange {
                                value: change.value,
                                status: change.status,
                                source_timestamp: change.source_timestamp,
                                server_timestamp: change.server_timestamp,
                            });
                        }
                    }),
                )
                .map_err(|status| bad_status("create subscription failed", status))
        })
        .await;

        match created {
            Ok(id) => {
                handle
                    .routes
                    .lock()
                    .insert(id, SubscriptionRoute { route, forwarder });
                Ok(SubscriptionId(id))
            }
            Err(e) => {
                forwarder.abort();
                Err(e)
            }
        }
    }

    async fn add_monitored_item(
        &self,
        handle: &Self::Handle,
        subscription: SubscriptionId,
        item: &MonitoredItemRequest,
        callback: Arc<dyn DataChangeCallback>,
    ) -> ProviderResult<StatusCode> {
        let route = handle
            .routes
            .lock()
            .get(&subscription.value())
            .map(|r| r.route.clone())
            .ok_or_else(|| {
                ProviderError::status(
                    format!("unknown subscription {subscription}"),
                    StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
                )
            })?;
        *route.write() = Some((item.address.clone(), callback));

        let session = handle.session.clone();
        let request = MonitoredItemCreateRequest {
            item_to_monitor: value_attribute(&item.node_id),
            monitoring_mode: MonitoringMode::Reporting,
            requested_parameters: MonitoringParameters {
                sampling_interval: item.sampling_interval.as_millis() as f64,
                filter: ExtensionObject::null(),
                queue_size: 1,
                discard_oldest: true,
                client_handle: 0,
            },
        };

        blocking("create_monitored_items", move || {
            let results = session
                .read()
                .create_monitored_items(subscription.value(), TimestampsToReturn::Both, &[request])
                .map_err(|status| bad_status("create monitored item failed", status))?;
            Ok(results
                .first()
                .map(|r| StatusCode(r.status_code.bits()))
                .unwrap_or(StatusCode::BAD_UNEXPECTED_ERROR))
        })
        .await
    }

    async fn delete_subscription(
        &self,
        handle: &Self::Handle,
        subscription: SubscriptionId,
    ) -> ProviderResult<()> {
        if let Some(route) = handle.routes.lock().remove(&subscription.value()) {
            route.forwarder.abort();
        }

        let session = handle.session.clone();
        blocking("delete_subscription", move || {
            session
                .read()
                .delete_subscription(subscription.value())
                .map(|_| ())
                .map_err(|status| bad_status("delete subscription failed", status))
        })
        .await
    }

    fn name(&self) -> &str {
        "opcua"
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn blocking<T, F>(operation: &'static str, f: F) -> ProviderResult<T>
where
    F: FnOnce() -> ProviderResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProviderError::new(format!("{operation} task failed")).with_source(e))?
}

async fn forward_changes(route: Route, mut rx: mpsc::UnboundedReceiver<RawChange>) {
    while let Some(change) = rx.recv().await {
        let target = route.read().clone();
        let Some((address, callback)) = target else {
            trace!("Dropping change that arrived before its monitored item");
            continue;
        };
        let notification = DataChangeNotification {
            address,
            value: change.value,
            status: change.status,
            source_timestamp: change.source_timestamp,
            server_timestamp: change.server_timestamp,
        };
        callback.on_data_change(notification).await;
    }
}

fn bad_status(message: &str, status: opcua::types::StatusCode) -> ProviderError {
    ProviderError::status(format!("{message}: {status}"), StatusCode(status.bits()))
}

fn value_attribute(node_id: &NodeId) -> ReadValueId {
    ReadValueId {
        node_id: to_opcua_node_id(node_id),
        attribute_id: AttributeId::Value as u32,
        index_range: opcua::types::UAString::null(),
        data_encoding: opcua::types::QualifiedName::null(),
    }
}

fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
    match &node_id.identifier {
        NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(node_id.namespace_index, *v),
        NodeIdentifier::String(v) => opcua::types::NodeId::new(node_id.namespace_index, v.clone()),
        NodeIdentifier::Guid(v) => {
            opcua::types::NodeId::new(node_id.namespace_index, opcua::types::Guid::from(*v))
        }
    }
}

fn to_chrono(dt: &opcua::types::DateTime) -> DateTime<Utc> {
    dt.as_chrono()
}

fn from_opcua_data_value(dv: &opcua::types::DataValue) -> DataValue {
    DataValue {
        value: dv.value.as_ref().map(from_opcua_variant),
        status: dv
            .status
            .as_ref()
            .map(|s| StatusCode(s.bits()))
            .unwrap_or(StatusCode::GOOD),
        source_timestamp: dv.source_timestamp.as_ref().map(to_chrono),
        server_timestamp: dv.server_timestamp.as_ref().map(to_chrono),
    }
}

fn from_opcua_variant(variant: &opcua::types::Variant) -> Value {
    use opcua::types::Variant;

    match variant {
        Variant::Empty => Value::Null,
        Variant::Boolean(v) => Value::Boolean(*v),
        Variant::SByte(v) => Value::SByte(*v),
        Variant::Byte(v) => Value::Byte(*v),
        Variant::Int16(v) => Value::Int16(*v),
        Variant::UInt16(v) => Value::UInt16(*v),
        Variant::Int32(v) => Value::Int32(*v),
        Variant::UInt32(v) => Value::UInt32(*v),
        Variant::Int64(v) => Value::Int64(*v),
        Variant::UInt64(v) => Value::UInt64(*v),
        Variant::Float(v) => Value::Float(*v),
        Variant::Double(v) => Value::Double(*v),
        Variant::String(v) => Value::String(v.as_ref().to_string()),
        Variant::DateTime(v) => Value::DateTime(v.as_chrono()),
        Variant::Guid(v) => Value::Guid(uuid::Uuid::from_bytes(*v.as_bytes())),
        Variant::ByteString(v) => Value::ByteString(v.value.clone().unwrap_or_default()),
        Variant::Array(array) => {
            Value::Array(array.values.iter().map(from_opcua_variant).collect())
        }
        other => Value::String(format!("{other:?}")),
    }
}

fn to_opcua_variant(value: &Value) -> opcua::types::Variant {
    use opcua::types::Variant;

    match value {
        Value::Null => Variant::Empty,
        Value::Boolean(v) => Variant::Boolean(*v),
        Value::SByte(v) => Variant::SByte(*v),
        Value::Byte(v) => Variant::Byte(*v),
        Value::Int16(v) => Variant::Int16(*v),
        Value::UInt16(v) => Variant::UInt16(*v),
        Value::Int32(v) => Variant::Int32(*v),
        Value::UInt32(v) => Variant::UInt32(*v),
        Value::Int64(v) => Variant::Int64(*v),
        Value::UInt64(v) => Variant::UInt64(*v),
        Value::Float(v) => Variant::Float(*v),
        Value::Double(v) => Variant::Double(*v),
        // No decimal on the wire; servers expose decimals as doubles.
        Value::Decimal(v) => Variant::Double(v.to_f64().unwrap_or(f64::NAN)),
        Value::String(v) => Variant::String(opcua::types::UAString::from(v.as_str())),
        Value::DateTime(v) => Variant::DateTime(Box::new(opcua::types::DateTime::from(*v))),
        Value::Guid(v) => Variant::Guid(Box::new(opcua::types::Guid::from(*v))),
        Value::ByteString(v) => Variant::ByteString(opcua::types::ByteString::from(v.as_slice())),
        Value::Array(values) => {
            let variants: Vec<Variant> = values.iter().map(to_opcua_variant).collect();
            Variant::from(variants)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_conversion() {
        let node = to_opcua_node_id(&NodeId::string(2, "NexusMeter.Test.Boolean"));
        assert_eq!(node.namespace, 2);
        assert_eq!(node.to_string(), "ns=2;s=NexusMeter.Test.Boolean");

        let objects = to_opcua_node_id(&NodeId::objects_folder());
        assert_eq!(objects, opcua::types::ObjectId::ObjectsFolder.into());
    }

    #[test]
    fn test_variant_conversion() {
        for value in [
            Value::Boolean(true),
            Value::Int32(-12),
            Value::Float(1.5),
            Value::Double(3.25),
            Value::String("Hello".into()),
        ] {
            assert_eq!(from_opcua_variant(&to_opcua_variant(&value)), value);
        }
    }

    #[test]
    fn test_decimal_goes_out_as_double() {
        let value = Value::Decimal(rust_decimal::Decimal::new(1250, 2));
        assert_eq!(from_opcua_variant(&to_opcua_variant(&value)), Value::Double(12.5));
    }

    #[test]
    fn test_provider_defaults() {
        let provider = OpcUaSessionProvider::new().with_reconnect_attempts(0);
        assert_eq!(provider.reconnect_attempts, 1);
        assert_eq!(provider.name(), "opcua");
    }
}
