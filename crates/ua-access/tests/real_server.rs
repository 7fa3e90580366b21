// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Real Server Tests
//!
//! These tests require a running OPC UA server and are ignored by default.
//!
//! # Environment Variables
//!
//! - `UA_ACCESS_TEST_ENDPOINT`: server endpoint (default: opc.tcp://localhost:4840)
//! - `UA_ACCESS_TEST_NAMESPACE`: namespace index of the test nodes (default: 2)
//! - `UA_ACCESS_TEST_BOOL_TAG`: writable boolean address (default: Device.Group.Flag)
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p ua-access --features real-transport --test real_server -- --ignored
//! ```

#![cfg(feature = "real-transport")]

use std::time::Duration;

use ua_access::provider::opcua::OpcUaSessionProvider;
use ua_access::{ClientConfig, UaClient};

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn real_client() -> UaClient<OpcUaSessionProvider> {
    let namespace = env_or("UA_ACCESS_TEST_NAMESPACE", "2")
        .parse()
        .expect("namespace index is a number");
    let config = ClientConfig::builder()
        .application_name("ua-access-real-tests")
        .endpoint(env_or("UA_ACCESS_TEST_ENDPOINT", "opc.tcp://localhost:4840"))
        .security_enabled(false)
        .namespace_index(namespace)
        .build()
        .expect("valid test configuration");
    UaClient::new(config, OpcUaSessionProvider::new()).expect("client")
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running OPC UA server"]
async fn test_real_connect_and_browse() {
    let client = real_client();
    client.connect(Duration::from_secs(30), true).await.unwrap();
    assert!(client.is_connected());

    let devices = client.devices(false).await.unwrap();
    assert!(devices.iter().all(|d| d.name() != "Server"));

    client.disconnect().await.unwrap();
    assert!(!client.is_connected());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires a running OPC UA server"]
async fn test_real_flag_cycle() {
    let client = real_client();
    let flag = env_or("UA_ACCESS_TEST_BOOL_TAG", "Device.Group.Flag");
    client.connect(Duration::from_secs(30), true).await.unwrap();

    client.write_value(flag.as_str(), true).await.unwrap();
    assert!(client.read_typed::<bool>(flag.as_str()).await.unwrap());
    client.write_value(flag.as_str(), false).await.unwrap();
    assert!(!client.read_typed::<bool>(flag.as_str()).await.unwrap());

    client.disconnect().await.unwrap();
}
