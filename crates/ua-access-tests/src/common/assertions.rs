// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Assertion helpers with failure messages that name the address involved.

use std::collections::BTreeMap;
use std::time::Duration;

use ua_access::{Address, ConnectionState, Device, StatusCode, Tag, UaClient, Value};

use super::mocks::MockSessionProvider;

// =============================================================================
// Tag Assertions
// =============================================================================

/// Assertion extensions for [`Tag`].
pub trait TagAssertions {
    /// Assert that the tag has good quality.
    fn assert_good(&self);

    /// Assert that the tag carries a specific status.
    fn assert_status(&self, expected: StatusCode);

    /// Assert that the tag carries a specific value.
    fn assert_value(&self, expected: &Value);
}

impl TagAssertions for Tag {
    fn assert_good(&self) {
        assert!(
            self.quality(),
            "Expected good quality for {}, got {}",
            self.address(),
            self.status
        );
    }

    fn assert_status(&self, expected: StatusCode) {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} for {}, got {}",
            expected,
            self.address(),
            self.status
        );
    }

    fn assert_value(&self, expected: &Value) {
        assert_eq!(
            self.value.as_ref(),
            Some(expected),
            "Expected value {:?} for {}, got {:?}",
            expected,
            self.address(),
            self.value
        );
    }
}

// =============================================================================
// Hierarchy Assertions
// =============================================================================

/// Counts how often each address appears across the devices.
pub fn address_multiset(devices: &[Device]) -> BTreeMap<Address, usize> {
    let mut counts = BTreeMap::new();
    for device in devices {
        for address in device.addresses() {
            *counts.entry(address).or_insert(0) += 1;
        }
    }
    counts
}

/// Asserts that every child address is its parent's address plus its name.
pub fn assert_addresses_well_formed(devices: &[Device]) {
    fn check_tag(parent: &Address, tag: &Tag) {
        assert_eq!(
            tag.address().as_str(),
            format!("{parent}.{}", tag.name()),
            "Tag {} is not under {}",
            tag.address(),
            parent
        );
    }

    fn check_group(parent: &Address, group: &ua_access::Group) {
        assert_eq!(
            group.address().as_str(),
            format!("{parent}.{}", group.name()),
            "Group {} is not under {}",
            group.address(),
            parent
        );
        for tag in group.tags() {
            check_tag(group.address(), tag);
        }
        for nested in group.groups() {
            check_group(group.address(), nested);
        }
    }

    for device in devices {
        assert!(
            !device.address().as_str().contains(Address::DELIMITER),
            "Device {} is not a root child",
            device.address()
        );
        for tag in device.tags() {
            check_tag(device.address(), tag);
        }
        for group in device.groups() {
            check_group(device.address(), group);
        }
    }
}

// =============================================================================
// Async Assertions
// =============================================================================

/// Polls until the client reaches `expected` or `timeout` elapses.
pub async fn wait_for_state(
    client: &UaClient<MockSessionProvider>,
    expected: ConnectionState,
    timeout: Duration,
) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if client.state() == expected {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "Expected state {} within {:?}, still {}",
                expected,
                timeout,
                client.state()
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(description: &str, timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("Timed out after {timeout:?} waiting for {description}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
