// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device / Group / Tag hierarchy and dotted-path addressing.
//!
//! ```text
//! Device  "Plant"
//! ├── Group  "Plant.Line1"
//! │   ├── Group  "Plant.Line1.Motor"
//! │   │   └── Tag "Plant.Line1.Motor.Speed"
//! │   └── Tag  "Plant.Line1.Running"
//! └── Tag  "Plant.Alarm"
//! ```
//!
//! A node's name is the text after the last `.` of its address. Addresses are
//! never split further than that; a child address is always the parent address,
//! a `.`, and the child's browse name.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::StatusCode;
use crate::types::NodeId;
use crate::value::Value;

// =============================================================================
// Address
// =============================================================================

/// Dot-delimited path identifying a node in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Path delimiter.
    pub const DELIMITER: char = '.';

    /// Creates an address from its textual form.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the terminal path segment.
    ///
    /// ```
    /// use ua_access::Address;
    ///
    /// assert_eq!(Address::new("Plant.Line1.Speed").name(), "Speed");
    /// assert_eq!(Address::new("Plant").name(), "Plant");
    /// ```
    pub fn name(&self) -> &str {
        match self.0.rfind(Self::DELIMITER) {
            Some(idx) => &self.0[idx + Self::DELIMITER.len_utf8()..],
            None => &self.0,
        }
    }

    /// Returns the address of a direct child.
    pub fn child(&self, name: &str) -> Self {
        let mut address = String::with_capacity(self.0.len() + 1 + name.len());
        address.push_str(&self.0);
        address.push(Self::DELIMITER);
        address.push_str(name);
        Self(address)
    }

    /// Returns the textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Maps the address to a string node ID in the given namespace.
    pub fn to_node_id(&self, namespace_index: u16) -> NodeId {
        NodeId::string(namespace_index, self.0.clone())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Address {
    fn from(address: String) -> Self {
        Self(address)
    }
}

impl From<&Address> for Address {
    fn from(address: &Address) -> Self {
        address.clone()
    }
}

// =============================================================================
// Tag
// =============================================================================

/// Leaf data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    address: Address,
    /// Last value read or written. `None` until the tag has been read.
    pub value: Option<Value>,
    /// Status reported by the server for the last operation on this tag.
    pub status: StatusCode,
}

impl Tag {
    /// Creates an empty tag.
    ///
    /// Empty tags report `BadWaitingForInitialData` until read.
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            value: None,
            status: StatusCode::BAD_WAITING_FOR_INITIAL_DATA,
        }
    }

    /// Sets the value to write.
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Returns the address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the terminal path segment of the address.
    pub fn name(&self) -> &str {
        self.address.name()
    }

    /// Returns `true` if the last status was good.
    pub fn quality(&self) -> bool {
        self.status.is_good()
    }
}

// =============================================================================
// Group / Device
// =============================================================================

/// Interior node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    address: Address,
    groups: Vec<Group>,
    tags: Vec<Tag>,
}

impl Group {
    /// Creates a group from fully resolved children.
    pub fn new(address: impl Into<Address>, groups: Vec<Group>, tags: Vec<Tag>) -> Self {
        Self {
            address: address.into(),
            groups,
            tags,
        }
    }

    /// Returns the address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the terminal path segment of the address.
    pub fn name(&self) -> &str {
        self.address.name()
    }

    /// Returns the child groups in browse order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Returns the child tags in browse order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Counts the tags in this group and every nested group.
    pub fn tag_count(&self) -> usize {
        self.tags.len() + self.groups.iter().map(Group::tag_count).sum::<usize>()
    }

    /// Collects every address in this subtree, this group included.
    pub fn addresses(&self) -> Vec<Address> {
        let mut out = Vec::new();
        collect_addresses(&self.address, &self.groups, &self.tags, &mut out);
        out
    }
}

/// Root-level interior node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    address: Address,
    groups: Vec<Group>,
    tags: Vec<Tag>,
}

impl Device {
    /// Creates a device from fully resolved children.
    pub fn new(address: impl Into<Address>, groups: Vec<Group>, tags: Vec<Tag>) -> Self {
        Self {
            address: address.into(),
            groups,
            tags,
        }
    }

    /// Returns the address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the terminal path segment of the address.
    pub fn name(&self) -> &str {
        self.address.name()
    }

    /// Returns the child groups in browse order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Returns the child tags in browse order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Counts the tags directly under the device and in every nested group.
    pub fn tag_count(&self) -> usize {
        self.tags.len() + self.groups.iter().map(Group::tag_count).sum::<usize>()
    }

    /// Collects every address in this device, the device included.
    pub fn addresses(&self) -> Vec<Address> {
        let mut out = Vec::new();
        collect_addresses(&self.address, &self.groups, &self.tags, &mut out);
        out
    }
}

fn collect_addresses(address: &Address, groups: &[Group], tags: &[Tag], out: &mut Vec<Address>) {
    out.push(address.clone());
    out.extend(tags.iter().map(|t| t.address.clone()));
    for group in groups {
        collect_addresses(&group.address, &group.groups, &group.tags, out);
    }
}

// =============================================================================
// Tests
// =============================================================================
