// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ua-access Integration Tests
//!
//! Test support for the `ua-access` client and the integration suites that
//! use it. Everything runs against [`common::mocks::MockSessionProvider`],
//! an in-memory address space with switchable failure modes.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p ua-access-tests
//!
//! # Run specific test suite
//! cargo test -p ua-access-tests --test connection
//! cargo test -p ua-access-tests --test browse
//! cargo test -p ua-access-tests --test io
//! cargo test -p ua-access-tests --test subscription
//! cargo test -p ua-access-tests --test blocking
//! cargo test -p ua-access-tests --test config
//! ```
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use ua_access_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (client, provider) = connected_client(PlantFixtures::flag_device()).await;
//!     provider.fail_read("Device.Group.Flag", StatusCode::BAD_NOT_READABLE);
//!     // ... test logic
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::mocks::*;
    pub use crate::common::{init_test_logging, temp_test_dir};
}
