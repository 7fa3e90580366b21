// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built address spaces and configurations.

use std::sync::Arc;
use std::time::Duration;

use ua_access::{ClientConfig, UaClient};

use super::mocks::MockSessionProvider;

// =============================================================================
// Configuration Fixtures
// =============================================================================

/// Pre-built client configurations.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// Endpoint the mock pretends to serve.
    pub const ENDPOINT: &'static str = "opc.tcp://mock-server:4840";

    /// Unsecured configuration with short timeouts.
    pub fn local() -> ClientConfig {
        ClientConfig::builder()
            .application_name("ua-access-tests")
            .endpoint(Self::ENDPOINT)
            .security_enabled(false)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("fixture configuration is valid")
    }

    /// Secured configuration with a user identity.
    pub fn secured() -> ClientConfig {
        ClientConfig::builder()
            .application_name("ua-access-tests")
            .endpoint(Self::ENDPOINT)
            .security_enabled(true)
            .accept_untrusted(true)
            .credentials("operator", "secret")
            .build()
            .expect("fixture configuration is valid")
    }
}

// =============================================================================
// Address Space Fixtures
// =============================================================================

/// Pre-built address spaces.
pub struct PlantFixtures;

impl PlantFixtures {
    /// Device names in [`two_device_plant`](Self::two_device_plant).
    pub const DEVICES: [&'static str; 2] = ["Press01", "Press02"];
    /// Group names under each device.
    pub const GROUPS: [&'static str; 3] = ["Hydraulics", "Motion", "Safety"];
    /// Direct tags under each device.
    pub const DEVICE_TAGS: usize = 1022;
    /// Tags directly under each group.
    pub const GROUP_TAGS: usize = 4;
    /// Nested group under each group.
    pub const NESTED_GROUP: &'static str = "Diagnostics";
    /// Tags under each nested group.
    pub const NESTED_TAGS: usize = 2;

    /// Two devices, each with three groups and 1022 direct tags.
    ///
    /// Every group holds [`GROUP_TAGS`](Self::GROUP_TAGS) tags and one nested
    /// group. The server's own `Server` object sits next to the devices.
    pub fn two_device_plant() -> MockSessionProvider {
        let provider = MockSessionProvider::new();
        provider
            .add_object("Server")
            .add_read_only_variable("Server.ServiceLevel", 255u8);

        for device in Self::DEVICES {
            provider.add_object(device);
            for group in Self::GROUPS {
                let group_address = format!("{device}.{group}");
                provider.add_object(&group_address);
                for i in 0..Self::GROUP_TAGS {
                    provider.add_variable(&format!("{group_address}.Value{i}"), i as f64);
                }

                let nested = format!("{group_address}.{}", Self::NESTED_GROUP);
                provider.add_object(&nested);
                for i in 0..Self::NESTED_TAGS {
                    provider.add_variable(&format!("{nested}.Counter{i}"), i as u32);
                }
            }
            for i in 0..Self::DEVICE_TAGS {
                provider.add_variable(&format!("{device}.Tag{i:04}"), i as i32);
            }
        }
        provider
    }

    /// `Device.Group` with one writable variable per supported scalar type.
    ///
    /// | Address              | Initial value |
    /// |----------------------|---------------|
    /// | `Device.Group.Flag`  | `false`       |
    /// | `Device.Group.Count` | `0i32`        |
    /// | `Device.Group.Ratio` | `0.0f32`      |
    /// | `Device.Group.Level` | `0.0f64`      |
    /// | `Device.Group.Label` | `""`          |
    /// | `Device.Group.Serial`| read-only     |
    pub fn flag_device() -> MockSessionProvider {
        let provider = MockSessionProvider::new();
        provider
            .add_object("Device")
            .add_object("Device.Group")
            .add_variable("Device.Group.Flag", false)
            .add_variable("Device.Group.Count", 0i32)
            .add_variable("Device.Group.Ratio", 0.0f32)
            .add_variable("Device.Group.Level", 0.0f64)
            .add_variable("Device.Group.Label", "")
            .add_read_only_variable("Device.Group.Serial", "SN-0001");
        provider
    }

    /// A chain of nested objects `Deep.L1.L2...` of the given depth.
    pub fn deep_chain(depth: usize) -> MockSessionProvider {
        let provider = MockSessionProvider::new();
        let mut address = String::from("Deep");
        provider.add_object(&address);
        for level in 1..=depth {
            address = format!("{address}.L{level}");
            provider.add_object(&address);
        }
        provider.add_variable(&format!("{address}.Leaf"), true);
        provider
    }
}

// =============================================================================
// Client Fixtures
// =============================================================================

/// Creates a client over a shared mock provider.
pub fn client_for(
    provider: MockSessionProvider,
) -> (UaClient<MockSessionProvider>, Arc<MockSessionProvider>) {
    let provider = Arc::new(provider);
    let client = UaClient::with_shared_provider(ConfigFixtures::local(), provider.clone())
        .expect("fixture configuration is valid");
    (client, provider)
}

/// Creates and connects a client over a shared mock provider.
pub async fn connected_client(
    provider: MockSessionProvider,
) -> (UaClient<MockSessionProvider>, Arc<MockSessionProvider>) {
    let (client, provider) = client_for(provider);
    client
        .connect(Duration::from_secs(5), true)
        .await
        .expect("mock connect succeeds");
    (client, provider)
}
