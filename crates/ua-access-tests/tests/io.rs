// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Batch I/O Integration Tests
//!
//! Reads and writes against the flag device and the two-device plant:
//!
//! - positional correlation of batch results
//! - partial failure in both write modes
//! - typed reads and their error paths
//! - cancellation

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ua_access::{
    Address, OperationError, StatusCode, Tag, UaError, Value, ValueType, WriteError,
};
use ua_access_tests::prelude::*;

const FLAG: &str = "Device.Group.Flag";

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn test_flag_write_read_cycle() {
    init_test_logging();
    let (client, provider) = client_for(PlantFixtures::flag_device());
    client.connect(Duration::from_secs(30), true).await.unwrap();

    client.write_value(FLAG, true).await.unwrap();
    assert!(client.read_typed::<bool>(FLAG).await.unwrap());

    client.write_value(FLAG, false).await.unwrap();
    assert!(!client.read_typed::<bool>(FLAG).await.unwrap());

    client.disconnect().await.unwrap();
    assert_eq!(provider.value(FLAG), Some(Value::Boolean(false)));
}

#[tokio::test]
async fn test_scalar_write_read_cycle() {
    let (client, _provider) = connected_client(PlantFixtures::flag_device()).await;

    client.write_value("Device.Group.Count", -12337i32).await.unwrap();
    client.write_value("Device.Group.Ratio", 0.25f32).await.unwrap();
    client.write_value("Device.Group.Level", 1234.5678f64).await.unwrap();
    client.write_value("Device.Group.Label", "Hello").await.unwrap();

    assert_eq!(client.read_typed::<i32>("Device.Group.Count").await.unwrap(), -12337);
    assert_eq!(client.read_typed::<f32>("Device.Group.Ratio").await.unwrap(), 0.25);
    assert_eq!(client.read_typed::<f64>("Device.Group.Level").await.unwrap(), 1234.5678);
    assert_eq!(client.read_typed::<String>("Device.Group.Label").await.unwrap(), "Hello");
}

#[tokio::test]
async fn test_typed_read_coerces() {
    let (client, _provider) = connected_client(PlantFixtures::flag_device()).await;
    client.write_value("Device.Group.Count", 42i32).await.unwrap();

    assert_eq!(client.read_typed::<i64>("Device.Group.Count").await.unwrap(), 42);
    assert_eq!(client.read_typed::<f64>("Device.Group.Count").await.unwrap(), 42.0);
    assert_eq!(
        client.read_typed::<String>("Device.Group.Count").await.unwrap(),
        "42"
    );
    assert_eq!(
        client.read_as("Device.Group.Count", ValueType::Double).await.unwrap(),
        Value::Double(42.0)
    );
}

// =============================================================================
// Batch read
// =============================================================================

#[tokio::test]
async fn test_read_batch_preserves_order() {
    let (client, provider) = connected_client(PlantFixtures::two_device_plant()).await;
    let addresses: Vec<Address> = (0..PlantFixtures::DEVICE_TAGS)
        .rev()
        .map(|i| Address::new(format!("Press02.Tag{i:04}")))
        .collect();

    let tags = client.read(&addresses).await.unwrap();

    assert_eq!(provider.read_count(), 1);
    assert_eq!(tags.len(), addresses.len());
    for (tag, address) in tags.iter().zip(&addresses) {
        assert_eq!(tag.address(), address);
        tag.assert_good();
        let index: i32 = address.name()["Tag".len()..].parse().unwrap();
        tag.assert_value(&Value::Int32(index));
    }
}

#[tokio::test]
async fn test_read_batch_partial_failure() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.fail_read("Device.Group.Count", StatusCode::BAD_NOT_READABLE);
    let addresses = [
        Address::new(FLAG),
        Address::new("Device.Group.Count"),
        Address::new("Device.Group.Missing"),
        Address::new("Device.Group.Label"),
    ];

    let tags = client.read(&addresses).await.unwrap();

    tags[0].assert_good();
    tags[1].assert_status(StatusCode::BAD_NOT_READABLE);
    tags[2].assert_status(StatusCode::BAD_NODE_ID_UNKNOWN);
    tags[3].assert_good();
    assert!(tags[1].value.is_none());
    assert_eq!(client.io().stats().bad_items(), 2);
}

#[tokio::test]
async fn test_read_empty_batch_skips_round_trip() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;

    assert!(client.read(&[]).await.unwrap().is_empty());
    assert!(client.write_tags(&[]).await.unwrap().is_empty());
    client.write(&[]).await.unwrap();

    assert_eq!(provider.read_count(), 0);
    assert_eq!(provider.write_count(), 0);
}

#[tokio::test]
async fn test_read_result_count_mismatch() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.truncate_results(true);

    let err = client
        .read(&[Address::new(FLAG), Address::new("Device.Group.Count")])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UaError::Operation(OperationError::ResultCountMismatch {
            operation: "read",
            expected: 2,
            actual: 1,
        })
    ));
}

#[tokio::test]
async fn test_read_transport_failure() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.fail_transport(true);

    let err = client.read_one(FLAG).await.unwrap_err();

    match err {
        UaError::Provider(e) => assert_eq!(e.status, Some(StatusCode::BAD_COMMUNICATION_ERROR)),
        other => panic!("unexpected error: {other:?}"),
    }
}

// =============================================================================
// Typed read failures
// =============================================================================

#[tokio::test]
async fn test_typed_read_bad_status() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.fail_read(FLAG, StatusCode::BAD_WAITING_FOR_INITIAL_DATA);

    let err = client.read_typed::<bool>(FLAG).await.unwrap_err();

    match err {
        UaError::Read(e) => {
            assert_eq!(e.address, FLAG);
            assert_eq!(e.status, StatusCode::BAD_WAITING_FOR_INITIAL_DATA);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_typed_read_unsupported_type() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;

    let err = client.read_typed::<uuid::Uuid>(FLAG).await.unwrap_err();
    assert!(matches!(err, UaError::UnsupportedType(ref e) if e.type_name == "Guid"));

    let err = client.read_as(FLAG, ValueType::ByteString).await.unwrap_err();
    assert!(matches!(err, UaError::UnsupportedType(_)));

    assert_eq!(provider.read_count(), 0);
}

#[tokio::test]
async fn test_typed_read_conversion_failure() {
    let (client, _provider) = connected_client(PlantFixtures::flag_device()).await;
    client.write_value("Device.Group.Label", "not a number").await.unwrap();

    let err = client.read_typed::<i32>("Device.Group.Label").await.unwrap_err();

    assert!(matches!(err, UaError::Conversion(_)), "unexpected error: {err:?}");
}

// =============================================================================
// Batch write
// =============================================================================

#[tokio::test]
async fn test_write_tags_reports_every_outcome() {
    let (client, provider) = connected_client(PlantFixtures::two_device_plant()).await;
    let failing = [7usize, 100, 513, 1021];
    for i in failing {
        provider.fail_write(&format!("Press01.Tag{i:04}"), StatusCode::BAD_NOT_WRITABLE);
    }
    let tags: Vec<Tag> = (0..PlantFixtures::DEVICE_TAGS)
        .map(|i| Tag::new(format!("Press01.Tag{i:04}")).with_value(-(i as i32)))
        .collect();

    let results = client.write_tags(&tags).await.unwrap();

    assert_eq!(provider.write_count(), 1);
    assert_eq!(results.len(), tags.len());
    let bad: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.quality())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(bad, failing);
    for (result, tag) in results.iter().zip(&tags) {
        assert_eq!(result.address(), tag.address());
        assert_eq!(result.value, tag.value);
    }
    assert_eq!(provider.value("Press01.Tag0008"), Some(Value::Int32(-8)));
    assert_eq!(provider.value("Press01.Tag0007"), Some(Value::Int32(7)));
}

#[tokio::test]
async fn test_write_fail_fast_reports_first_bad_status() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.fail_write("Device.Group.Count", StatusCode::BAD_OUT_OF_RANGE);
    let tags = [
        Tag::new(FLAG).with_value(true),
        Tag::new("Device.Group.Count").with_value(5i32),
        Tag::new("Device.Group.Serial").with_value("SN-0002"),
    ];

    let err = client.write(&tags).await.unwrap_err();

    match err {
        UaError::Write(WriteError { status, batch_size }) => {
            assert_eq!(status, StatusCode::BAD_OUT_OF_RANGE);
            assert_eq!(batch_size, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The good item was still applied.
    assert_eq!(provider.value(FLAG), Some(Value::Boolean(true)));
}

#[tokio::test]
async fn test_write_rejected_items() {
    let (client, _provider) = connected_client(PlantFixtures::flag_device()).await;
    let tags = [
        Tag::new("Device.Group.Serial").with_value("SN-0002"),
        Tag::new("Device.Group.Count").with_value(true),
        Tag::new("Device.Group.Nowhere").with_value(1i32),
    ];

    let results = client.write_tags(&tags).await.unwrap();

    results[0].assert_status(StatusCode::BAD_NOT_WRITABLE);
    results[1].assert_status(StatusCode::BAD_TYPE_MISMATCH);
    results[2].assert_status(StatusCode::BAD_NODE_ID_UNKNOWN);
}

#[tokio::test]
async fn test_write_tag_without_value_sends_null() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;

    let results = client.write_tags(&[Tag::new(FLAG)]).await.unwrap();

    assert_eq!(provider.write_history()[0].1, Value::Null);
    results[0].assert_status(StatusCode::BAD_TYPE_MISMATCH);
}

#[tokio::test]
async fn test_write_uses_configured_namespace() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;

    client.write_value(FLAG, true).await.unwrap();

    let (node_id, _) = &provider.write_history()[0];
    assert_eq!(node_id.to_string(), "ns=2;s=Device.Group.Flag");
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_read_cancelled() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.set_latency(Duration::from_millis(500));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = client
        .read_with_cancel(&[Address::new(FLAG)], &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, UaError::Cancelled { operation: "read" }));
}

#[tokio::test]
async fn test_write_precancelled_never_sent() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .write_with_cancel(&[Tag::new(FLAG).with_value(true)], &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, UaError::Cancelled { operation: "write" }));
    assert_eq!(provider.write_count(), 0);
    assert_eq!(provider.value(FLAG), Some(Value::Boolean(false)));
}

#[tokio::test]
async fn test_typed_read_cancelled() {
    let (client, _provider) = connected_client(PlantFixtures::flag_device()).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .read_typed_with_cancel::<bool>(FLAG, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, UaError::Cancelled { .. }));
}
