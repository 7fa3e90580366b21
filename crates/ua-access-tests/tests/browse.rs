// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Browse Integration Tests
//!
//! Address-space discovery over the two-device plant:
//!
//! ```text
//! Objects
//! ├── Server                  (excluded)
//! ├── Press01
//! │   ├── Hydraulics          4 tags
//! │   │   └── Diagnostics     2 tags
//! │   ├── Motion              ...
//! │   ├── Safety              ...
//! │   └── Tag0000..Tag1021    1022 tags
//! └── Press02                 same shape
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ua_access::{Address, BrowseError, Browser, ClientConfig, StatusCode, UaClient, UaError};
use ua_access_tests::prelude::*;

const DEVICE_TAG_TOTAL: usize = PlantFixtures::DEVICE_TAGS
    + PlantFixtures::GROUPS.len() * (PlantFixtures::GROUP_TAGS + PlantFixtures::NESTED_TAGS);

// =============================================================================
// Devices
// =============================================================================

#[tokio::test]
async fn test_list_devices_two_device_plant() {
    init_test_logging();
    let (client, _provider) = connected_client(PlantFixtures::two_device_plant()).await;

    let devices = client.devices(true).await.unwrap();

    assert_eq!(devices.len(), 2);
    for (device, name) in devices.iter().zip(PlantFixtures::DEVICES) {
        assert_eq!(device.name(), name);
        assert_eq!(device.groups().len(), 3);
        assert_eq!(device.tags().len(), 1022);
        assert_eq!(device.tag_count(), DEVICE_TAG_TOTAL);
        assert!(device.tags().iter().all(|t| t.value.is_none()));
    }
    assert_addresses_well_formed(&devices);
}

#[tokio::test]
async fn test_list_devices_skips_server_node() {
    let (client, _provider) = connected_client(PlantFixtures::two_device_plant()).await;

    let devices = client.devices(true).await.unwrap();

    assert!(devices.iter().all(|d| d.name() != "Server"));
}

#[tokio::test]
async fn test_list_devices_custom_exclusions() {
    let provider = std::sync::Arc::new(PlantFixtures::two_device_plant());
    let config = ClientConfig::builder()
        .application_name("ua-access-tests")
        .endpoint(ConfigFixtures::ENDPOINT)
        .excluded_root_nodes(["Server", "Press02"])
        .build()
        .unwrap();
    let client = UaClient::with_shared_provider(config, provider).unwrap();
    client.connect_default().await.unwrap();

    let devices = client.devices(true).await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name(), "Press01");
}

#[tokio::test]
async fn test_list_devices_full_expansion() {
    let (client, _provider) = connected_client(PlantFixtures::two_device_plant()).await;

    let devices = client.devices(true).await.unwrap();

    let hydraulics = &devices[0].groups()[0];
    assert_eq!(hydraulics.address().as_str(), "Press01.Hydraulics");
    assert_eq!(hydraulics.tags().len(), PlantFixtures::GROUP_TAGS);
    assert_eq!(hydraulics.groups().len(), 1);

    let nested = &hydraulics.groups()[0];
    assert_eq!(nested.address().as_str(), "Press01.Hydraulics.Diagnostics");
    assert_eq!(nested.tags().len(), PlantFixtures::NESTED_TAGS);
    assert_eq!(
        nested.tags()[0].address().as_str(),
        "Press01.Hydraulics.Diagnostics.Counter0"
    );
}

#[tokio::test]
async fn test_list_devices_shallow() {
    let (client, provider) = connected_client(PlantFixtures::two_device_plant()).await;

    let devices = client.devices(false).await.unwrap();

    assert_eq!(devices.len(), 2);
    for device in &devices {
        assert_eq!(device.groups().len(), 3);
        assert_eq!(device.tags().len(), 1022);
        for group in device.groups() {
            assert!(group.groups().is_empty());
            assert_eq!(group.tags().len(), PlantFixtures::GROUP_TAGS);
        }
    }
    // Root, then one per device and one per group.
    assert_eq!(provider.browse_count(), 1 + 2 * (1 + 3));
}

#[tokio::test]
async fn test_list_devices_round_trips() {
    let (client, provider) = connected_client(PlantFixtures::two_device_plant()).await;

    client.devices(true).await.unwrap();

    // Root, then per device: itself, three groups and three nested groups.
    let expected = 1 + 2 * (1 + 3 + 3);
    assert_eq!(provider.browse_count(), expected);
    assert_eq!(client.browser().stats().round_trips(), expected);
    assert_eq!(client.browser().stats().errors(), 0);
}

#[tokio::test]
async fn test_list_devices_deterministic() {
    let (client, _provider) = connected_client(PlantFixtures::two_device_plant()).await;

    let first = address_multiset(&client.devices(true).await.unwrap());
    let second = address_multiset(&client.devices(true).await.unwrap());

    assert_eq!(first, second);
    assert!(first.values().all(|count| *count == 1), "duplicate address");
    assert!(first.contains_key(&Address::new("Press02.Safety.Diagnostics.Counter1")));
    assert!(first.contains_key(&Address::new("Press01.Tag1021")));
}

#[tokio::test]
async fn test_list_devices_duplicate_references() {
    let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
    provider.duplicate_references(true);

    let devices = client.devices(true).await.unwrap();

    assert_eq!(devices.len(), 1);
    let addresses = address_multiset(&devices);
    assert_eq!(addresses.len(), 8);
    assert!(addresses.values().all(|count| *count == 1), "duplicate address");
    assert_eq!(devices[0].groups().len(), 1);
    assert_eq!(devices[0].groups()[0].tags().len(), 6);
    // Root, the device and its one group: each node is expanded once.
    assert_eq!(provider.browse_count(), 3);

    assert_eq!(client.tags("Device.Group").await.unwrap().len(), 6);
    let shallow = client.groups("Device", false).await.unwrap();
    assert_eq!(shallow.len(), 1);
    assert_eq!(shallow[0].tags().len(), 6);
}

// =============================================================================
// Groups and Tags
// =============================================================================

#[tokio::test]
async fn test_list_groups() {
    let (client, _provider) = connected_client(PlantFixtures::two_device_plant()).await;

    let groups = client.groups("Press02", true).await.unwrap();

    let names: Vec<_> = groups.iter().map(|g| g.name()).collect();
    assert_eq!(names, PlantFixtures::GROUPS);
    assert!(groups.iter().all(|g| g.groups().len() == 1));
}

#[tokio::test]
async fn test_list_groups_of_group() {
    let (client, _provider) = connected_client(PlantFixtures::two_device_plant()).await;

    let groups = client.groups("Press01.Motion", true).await.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].address().as_str(), "Press01.Motion.Diagnostics");
}

#[tokio::test]
async fn test_list_tags() {
    let (client, _provider) = connected_client(PlantFixtures::two_device_plant()).await;

    let device_tags = client.tags("Press01").await.unwrap();
    let group_tags = client.tags("Press01.Hydraulics").await.unwrap();

    assert_eq!(device_tags.len(), 1022);
    assert_eq!(device_tags[0].address().as_str(), "Press01.Tag0000");
    assert_eq!(group_tags.len(), PlantFixtures::GROUP_TAGS);
    assert!(group_tags.iter().all(|t| t.value.is_none()));
}

#[tokio::test]
async fn test_list_tags_of_leafless_group() {
    let provider = MockSessionProvider::new();
    provider.add_object("Empty").add_object("Empty.Nothing");
    let (client, _provider) = connected_client(provider).await;

    assert!(client.tags("Empty.Nothing").await.unwrap().is_empty());
    assert!(client.groups("Empty.Nothing", true).await.unwrap().is_empty());
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_browse_unknown_node() {
    let (client, _provider) = connected_client(PlantFixtures::two_device_plant()).await;

    let err = client.groups("Press09", true).await.unwrap_err();

    match err {
        UaError::Browse(BrowseError::BadStatus { address, status }) => {
            assert_eq!(address, "Press09");
            assert_eq!(status, StatusCode::BAD_NODE_ID_UNKNOWN);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(client.browser().stats().errors(), 1);
}

#[tokio::test]
async fn test_browse_bad_status_mid_tree() {
    let (client, provider) = connected_client(PlantFixtures::two_device_plant()).await;
    provider.fail_browse("Press02.Motion", StatusCode::BAD_NODE_ID_INVALID);

    let err = client.devices(true).await.unwrap_err();

    assert!(
        matches!(
            err,
            UaError::Browse(BrowseError::BadStatus { ref address, status })
                if address == "Press02.Motion" && status == StatusCode::BAD_NODE_ID_INVALID
        ),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_browse_transport_failure() {
    let (client, provider) = connected_client(PlantFixtures::two_device_plant()).await;
    provider.fail_transport(true);

    let err = client.devices(true).await.unwrap_err();

    assert!(matches!(err, UaError::Provider(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_browse_depth_limit() {
    let (client, _provider) = connected_client(PlantFixtures::deep_chain(5)).await;
    let browser = Browser::new(client.connection().clone()).with_max_depth(3);

    let err = browser.list_devices(true).await.unwrap_err();

    match err {
        UaError::Browse(BrowseError::DepthExceeded { address, max_depth }) => {
            assert_eq!(max_depth, 3);
            assert_eq!(address, "Deep.L1.L2.L3");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_browse_depth_within_limit() {
    let (client, _provider) = connected_client(PlantFixtures::deep_chain(5)).await;
    let browser = Browser::new(client.connection().clone()).with_max_depth(6);

    let devices = browser.list_devices(true).await.unwrap();

    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].tag_count(), 1);
    assert!(devices[0]
        .addresses()
        .contains(&Address::new("Deep.L1.L2.L3.L4.L5.Leaf")));
}

#[tokio::test]
async fn test_browse_cancelled() {
    let (client, provider) = connected_client(PlantFixtures::two_device_plant()).await;
    provider.set_latency(Duration::from_millis(200));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = client.devices_with_cancel(true, &cancel).await.unwrap_err();
    assert!(matches!(err, UaError::Cancelled { operation: "browse" }));

    // An already cancelled token never reaches the provider.
    let before = provider.browse_count();
    let err = client.tags_with_cancel("Press01", &cancel).await.unwrap_err();
    assert!(matches!(err, UaError::Cancelled { .. }));
    assert_eq!(provider.browse_count(), before);
}
