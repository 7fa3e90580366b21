// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Connection Integration Tests
//!
//! Session lifecycle against the mock provider:
//!
//! - connect and disconnect, including repeated disconnects
//! - every way session creation can fail
//! - keep-alive driven reconnection and its exclusivity
//! - subscription cleanup on disconnect
//!
//! ## Test Categories
//!
//! - `test_connect_*`: session establishment
//! - `test_disconnect_*`: teardown
//! - `test_reconnect_*`: keep-alive recovery

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use ua_access::{
    Address, ConnectionError, ConnectionState, SecurityMode, ServerError, SessionHandle,
    StatusCode, UaClient, UaError, UserIdentity,
};
use ua_access_tests::prelude::*;

const TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Connect
// =============================================================================

#[tokio::test]
async fn test_connect_and_disconnect() {
    init_test_logging();
    let (client, provider) = client_for(PlantFixtures::flag_device());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());

    client.connect(TIMEOUT, true).await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.is_connected());
    assert_eq!(provider.create_count(), 1);
    assert_eq!(client.connection().stats().connects(), 1);

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());
    assert_eq!(provider.close_count(), 1);
    assert_eq!(provider.dispose_count(), 1);
    assert_eq!(client.connection().stats().disconnects(), 1);
}

#[tokio::test]
async fn test_connect_passes_configuration_to_provider() {
    let provider = Arc::new(PlantFixtures::flag_device());
    let client =
        UaClient::with_shared_provider(ConfigFixtures::secured(), provider.clone())
            .unwrap();
    client.connect_default().await.unwrap();

    let request = provider.last_request().unwrap();
    assert_eq!(request.endpoint, ConfigFixtures::ENDPOINT);
    assert_eq!(request.application_name, "ua-access-tests");
    assert_eq!(request.security.mode, SecurityMode::SignAndEncrypt);
    assert!(request.trust.accepts(StatusCode::BAD_CERTIFICATE_UNTRUSTED));
    assert_eq!(
        request.identity,
        UserIdentity::user_name("operator", "secret")
    );
}

#[tokio::test]
async fn test_connect_replaces_existing_session() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    let first = provider.last_session().unwrap();

    client.connect(TIMEOUT, true).await.unwrap();

    assert_eq!(provider.create_count(), 2);
    assert_eq!(provider.close_count(), 1);
    assert!(client.is_connected());
    assert_ne!(provider.last_session().unwrap().session_id(), first.session_id());
    assert!(!first.is_connected());
}

#[tokio::test]
async fn test_connect_no_session() {
    let (client, provider) = client_for(PlantFixtures::flag_device());
    provider.set_create_behavior(CreateBehavior::NoSession);

    let err = client.connect(TIMEOUT, true).await.unwrap_err();

    assert!(
        matches!(
            err,
            UaError::Server(ServerError::NoSession { ref endpoint })
                if endpoint == ConfigFixtures::ENDPOINT
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.connection().stats().connect_failures(), 1);
}

#[tokio::test]
async fn test_connect_session_not_connected() {
    let (client, provider) = client_for(PlantFixtures::flag_device());
    provider.set_create_behavior(CreateBehavior::Disconnected);

    let err = client.connect(TIMEOUT, true).await.unwrap_err();

    assert!(
        matches!(err, UaError::Server(ServerError::SessionNotConnected { .. })),
        "unexpected error: {err:?}"
    );
    assert_eq!(provider.dispose_count(), 1);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connect_provider_failure() {
    let (client, provider) = client_for(PlantFixtures::flag_device());
    provider.set_create_behavior(CreateBehavior::Fail);

    let err = client.connect(TIMEOUT, true).await.unwrap_err();

    match err {
        UaError::Server(ServerError::CreationFailed { source, .. }) => {
            assert_eq!(source.status, Some(StatusCode::BAD_COMMUNICATION_ERROR));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout() {
    let (client, provider) = client_for(PlantFixtures::flag_device());
    provider.set_create_behavior(CreateBehavior::Hang);

    let err = client
        .connect(Duration::from_millis(250), true)
        .await
        .unwrap_err();

    match err {
        UaError::Timeout(timeout) => {
            assert_eq!(timeout.duration, Duration::from_millis(250));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connect_cancelled() {
    let (client, provider) = client_for(PlantFixtures::flag_device());
    provider.set_create_behavior(CreateBehavior::Hang);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = client
        .connect_with_cancel(TIMEOUT, true, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, UaError::Cancelled { operation: "connect" }));
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // The client is usable afterwards.
    provider.set_create_behavior(CreateBehavior::Connected);
    client.connect(TIMEOUT, true).await.unwrap();
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_operations_require_session() {
    let (client, _provider) = client_for(PlantFixtures::flag_device());

    let read = client.read(&[Address::new("Device.Group.Flag")]).await;
    assert!(matches!(
        read,
        Err(UaError::Connection(ConnectionError::NotConnected))
    ));

    let browse = client.devices(true).await;
    assert!(matches!(
        browse,
        Err(UaError::Connection(ConnectionError::NotConnected))
    ));

    let monitor = client.monitor_fn("Device.Group.Flag", 100, |_| {}).await;
    assert!(matches!(
        monitor,
        Err(UaError::Connection(ConnectionError::NotConnected))
    ));
}

#[tokio::test]
async fn test_connect_state_transitions_observed() {
    let (client, _provider) = client_for(PlantFixtures::flag_device());
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = transitions.clone();
    client
        .connection()
        .set_state_observer(move |from, to| sink.lock().push((from, to)));

    client.connect(TIMEOUT, true).await.unwrap();
    client.disconnect().await.unwrap();

    use ConnectionState::*;
    assert_eq!(
        *transitions.lock(),
        vec![
            (Disconnected, Connecting),
            (Connecting, Connected),
            (Connected, Disconnecting),
            (Disconnecting, Disconnected),
        ]
    );
}

// =============================================================================
// Disconnect
// =============================================================================

#[tokio::test]
async fn test_disconnect_without_session_is_noop() {
    let (client, provider) = client_for(PlantFixtures::flag_device());

    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();

    assert_eq!(provider.close_count(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_twice() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;

    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();

    assert_eq!(provider.close_count(), 1);
    assert_eq!(provider.dispose_count(), 1);
}

#[tokio::test]
async fn test_disconnect_reports_close_failure() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.fail_close(true);

    let err = client.disconnect().await.unwrap_err();

    assert!(matches!(err, UaError::Provider(_)), "unexpected error: {err:?}");
    assert_eq!(provider.dispose_count(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_deletes_subscriptions_best_effort() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    let first = client
        .monitor_fn("Device.Group.Flag", 100, |_| {})
        .await
        .unwrap();
    let second = client
        .monitor_fn("Device.Group.Count", 100, |_| {})
        .await
        .unwrap();
    provider.fail_delete_subscription(true);

    client.disconnect().await.unwrap();

    assert_eq!(provider.deleted_subscriptions(), vec![first, second]);
    assert_eq!(provider.close_count(), 1);
    assert!(client.subscriptions().active().await.is_empty());
}

// =============================================================================
// Reconnect
// =============================================================================

#[tokio::test]
async fn test_reconnect_on_keep_alive_failure() {
    init_test_logging();
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.set_reconnect_delay(Duration::from_millis(50));

    assert!(provider.report_keep_alive(StatusCode::BAD_CONNECTION_CLOSED));
    wait_until("reconnect to start", TIMEOUT, || provider.reconnect_count() == 1).await;
    wait_for_state(&client, ConnectionState::Connected, TIMEOUT).await;

    assert!(client.is_connected());
    assert_eq!(provider.last_session().unwrap().generation(), 1);
    let stats = client.connection().stats();
    assert_eq!(stats.reconnects_started(), 1);
    assert_eq!(stats.reconnects_succeeded(), 1);

    // The session keeps working after the swap.
    let flag: bool = client.read_typed("Device.Group.Flag").await.unwrap();
    assert!(!flag);
}

#[tokio::test]
async fn test_reconnect_ignores_good_reports() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;

    for _ in 0..10 {
        provider.report_keep_alive(StatusCode::GOOD);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(provider.reconnect_count(), 0);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_reconnect_at_most_one_in_flight() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.set_reconnect_delay(Duration::from_millis(200));

    for _ in 0..50 {
        provider.report_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    }
    wait_until("keep-alive reports to drain", TIMEOUT, || {
        client.connection().stats().keep_alive_failures() == 50
    })
    .await;
    wait_for_state(&client, ConnectionState::Connected, TIMEOUT).await;

    assert_eq!(provider.max_reconnects_in_flight(), 1);
    assert_eq!(provider.reconnect_count(), 1);
    assert_eq!(client.connection().stats().reconnects_started(), 1);
}

#[tokio::test]
async fn test_reconnect_again_after_recovery() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.set_reconnect_delay(Duration::from_millis(10));

    for expected in 1..=3u64 {
        provider.report_keep_alive(StatusCode::BAD_SECURE_CHANNEL_CLOSED);
        wait_until("reconnect", TIMEOUT, || provider.reconnect_count() == expected).await;
        wait_until("reconnect to finish", TIMEOUT, || {
            client.connection().stats().reconnects_succeeded() == expected
        })
        .await;
    }

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(provider.last_session().unwrap().generation(), 3);
}

#[tokio::test]
async fn test_reconnect_failure_releases_session() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    client
        .monitor_fn("Device.Group.Flag", 100, |_| {})
        .await
        .unwrap();
    provider.fail_reconnect(true);
    provider.set_reconnect_delay(Duration::from_millis(10));

    provider.report_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    wait_until("reconnect to give up", TIMEOUT, || {
        client.connection().stats().reconnects_failed() == 1
    })
    .await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());
    assert_eq!(provider.dispose_count(), 1);
    assert!(client.subscriptions().active().await.is_empty());
    match client.read_one("Device.Group.Flag").await {
        Err(UaError::Connection(ConnectionError::Lost { endpoint })) => {
            assert_eq!(endpoint, ConfigFixtures::ENDPOINT);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        client.devices(true).await,
        Err(UaError::Connection(ConnectionError::Lost { .. }))
    ));

    // A fresh connect recovers.
    provider.fail_reconnect(false);
    client.connect(TIMEOUT, true).await.unwrap();
    assert!(client.is_connected());
    assert!(client.read_one("Device.Group.Flag").await.is_ok());
}

#[tokio::test]
async fn test_reconnect_failure_cleared_by_disconnect() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.fail_reconnect(true);
    provider.set_reconnect_delay(Duration::from_millis(10));

    provider.report_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    wait_until("reconnect to give up", TIMEOUT, || {
        client.connection().stats().reconnects_failed() == 1
    })
    .await;
    client.disconnect().await.unwrap();

    assert!(matches!(
        client.read_one("Device.Group.Flag").await,
        Err(UaError::Connection(ConnectionError::NotConnected))
    ));
}

#[tokio::test]
async fn test_reconnect_io_during_swap() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.set_reconnect_delay(Duration::from_millis(300));

    provider.report_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    wait_for_state(&client, ConnectionState::Reconnecting, TIMEOUT).await;

    // Concurrent callers keep using the old session while the swap is pending.
    let mut workers = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        workers.push(tokio::spawn(async move {
            let value = i % 2 == 0;
            client.write_value("Device.Group.Flag", value).await?;
            client.read_typed::<bool>("Device.Group.Flag").await
        }));
    }
    for worker in workers {
        worker.await.unwrap().unwrap();
    }
    assert_eq!(client.state(), ConnectionState::Reconnecting);
    assert!(provider.served_generations().iter().all(|g| *g == 0));

    wait_for_state(&client, ConnectionState::Connected, TIMEOUT).await;

    // After the swap the new session serves.
    client.write_value("Device.Group.Flag", true).await.unwrap();
    assert!(client.read_typed::<bool>("Device.Group.Flag").await.unwrap());
    let served = provider.served_generations();
    assert_eq!(served.len(), 18);
    assert_eq!(&served[16..], &[1, 1]);
}

#[tokio::test]
async fn test_reconnect_superseded_by_disconnect() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.set_reconnect_delay(Duration::from_millis(300));

    provider.report_keep_alive(StatusCode::BAD_CONNECTION_CLOSED);
    wait_for_state(&client, ConnectionState::Reconnecting, TIMEOUT).await;
    assert!(client.connection().is_reconnecting().await);

    client.disconnect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());
    assert!(!client.connection().is_reconnecting().await);
}

#[tokio::test]
async fn test_keep_alive_disabled() {
    let (client, provider) = client_for(PlantFixtures::flag_device());
    client.connect(TIMEOUT, false).await.unwrap();

    assert!(!provider.report_keep_alive(StatusCode::BAD_CONNECTION_CLOSED));
    assert_eq!(client.state(), ConnectionState::Connected);
}
