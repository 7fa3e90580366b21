// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Batched reads and writes.
//!
//! Every call is one round trip. Requests are built in input order and
//! results are mapped back by position, never by anything the server echoes:
//!
//! ```text
//! addresses[0] ─► nodes[0] ─┐                 ┌─► results[0] ─► tags[0] (address from input)
//! addresses[1] ─► nodes[1] ─┼─► provider.read ┼─► results[1] ─► tags[1]
//! addresses[n] ─► nodes[n] ─┘                 └─► results[n] ─► tags[n]
//! ```
//!
//! A response of the wrong length fails with
//! [`OperationError::ResultCountMismatch`] instead of being mis-correlated.
//!
//! # Failure modes
//!
//! | Operation          | Per-item bad status                    |
//! |--------------------|----------------------------------------|
//! | `read`             | reported in the returned tag           |
//! | `write_tags`       | reported in the returned tag           |
//! | `write`            | [`WriteError`] with the first bad code |
//! | `read_typed`       | [`ReadError`]                          |
//!
//! Transport failures are returned unchanged as provider errors.
//!
//! [`WriteError`]: crate::error::WriteError
//! [`ReadError`]: crate::error::ReadError

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::address::{Address, Tag};
use crate::codec::{coerce, FromValue, ValueType};
use crate::connection::ConnectionManager;
use crate::error::{OperationError, UaError, UaResult, UnsupportedTypeError};
use crate::provider::SessionProvider;
use crate::status::StatusCode;
use crate::types::NodeId;
use crate::value::Value;

// =============================================================================
// Cancellation
// =============================================================================

/// Runs `future` unless `cancel` fires first.
///
/// The token is checked before the future is polled, raced against it, and
/// checked again once it completes. Cancelling abandons the wait only; the
/// server may still apply a request that was already sent.
pub(crate) async fn cancellable<F, T>(
    operation: &'static str,
    cancel: Option<&CancellationToken>,
    future: F,
) -> UaResult<T>
where
    F: Future<Output = T>,
{
    let Some(cancel) = cancel else {
        return Ok(future.await);
    };
    if cancel.is_cancelled() {
        return Err(UaError::cancelled(operation));
    }

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(UaError::cancelled(operation)),
        output = future => output,
    };

    if cancel.is_cancelled() {
        return Err(UaError::cancelled(operation));
    }
    Ok(output)
}

fn check_result_count(operation: &'static str, expected: usize, actual: usize) -> UaResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(OperationError::ResultCountMismatch {
            operation,
            expected,
            actual,
        }
        .into())
    }
}

// =============================================================================
// IoStats
// =============================================================================

/// Batch I/O counters.
#[derive(Debug, Default)]
pub struct IoStats {
    reads: AtomicU64,
    writes: AtomicU64,
    items_read: AtomicU64,
    items_written: AtomicU64,
    bad_items: AtomicU64,
}

impl IoStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_read(&self, items: usize, bad: usize) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.items_read.fetch_add(items as u64, Ordering::Relaxed);
        self.bad_items.fetch_add(bad as u64, Ordering::Relaxed);
    }

    fn record_write(&self, items: usize, bad: usize) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.items_written.fetch_add(items as u64, Ordering::Relaxed);
        self.bad_items.fetch_add(bad as u64, Ordering::Relaxed);
    }

    /// Read round trips.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Write round trips.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Items read.
    pub fn items_read(&self) -> u64 {
        self.items_read.load(Ordering::Relaxed)
    }

    /// Items written.
    pub fn items_written(&self) -> u64 {
        self.items_written.load(Ordering::Relaxed)
    }

    /// Items that came back with a non-good status.
    pub fn bad_items(&self) -> u64 {
        self.bad_items.load(Ordering::Relaxed)
    }
}

// =============================================================================
// BatchIo
// =============================================================================

/// Correlated batch reads and writes over the live session.
pub struct BatchIo<P: SessionProvider> {
    connection: ConnectionManager<P>,
    namespace_index: u16,
    stats: Arc<IoStats>,
}

impl<P: SessionProvider> Clone for BatchIo<P> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            namespace_index: self.namespace_index,
            stats: self.stats.clone(),
        }
    }
}

impl<P: SessionProvider> BatchIo<P> {
    /// Creates the engine over a connection manager.
    pub fn new(connection: ConnectionManager<P>, namespace_index: u16) -> Self {
        Self {
            connection,
            namespace_index,
            stats: Arc::new(IoStats::new()),
        }
    }

    /// Returns the counters.
    pub fn stats(&self) -> &IoStats {
        &self.stats
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Reads every address in one round trip.
    ///
    /// `result[i]` always belongs to `addresses[i]`. Per-item failures are
    /// reported through each tag's status.
    pub async fn read(&self, addresses: &[Address]) -> UaResult<Vec<Tag>> {
        self.read_batch(addresses, None).await
    }

    /// [`read`](Self::read) with cancellation.
    pub async fn read_with_cancel(
        &self,
        addresses: &[Address],
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Tag>> {
        self.read_batch(addresses, Some(cancel)).await
    }

    /// Reads one address as a batch of one.
    pub async fn read_one(&self, address: impl Into<Address>) -> UaResult<Tag> {
        self.read_single(address.into(), None).await
    }

    /// [`read_one`](Self::read_one) with cancellation.
    pub async fn read_one_with_cancel(
        &self,
        address: impl Into<Address>,
        cancel: &CancellationToken,
    ) -> UaResult<Tag> {
        self.read_single(address.into(), Some(cancel)).await
    }

    /// Reads one address and converts the value to `T`.
    ///
    /// # Errors
    ///
    /// - unsupported type error when `T` is outside the conversion table
    /// - [`ReadError`](crate::error::ReadError) when the status is not good
    /// - conversion error when the value does not fit `T`
    pub async fn read_typed<T: FromValue>(&self, address: impl Into<Address>) -> UaResult<T> {
        self.read_typed_inner(address.into(), None).await
    }

    /// [`read_typed`](Self::read_typed) with cancellation.
    pub async fn read_typed_with_cancel<T: FromValue>(
        &self,
        address: impl Into<Address>,
        cancel: &CancellationToken,
    ) -> UaResult<T> {
        self.read_typed_inner(address.into(), Some(cancel)).await
    }

    /// Reads one address and coerces the value to a runtime-chosen type.
    pub async fn read_as(&self, address: impl Into<Address>, target: ValueType) -> UaResult<Value> {
        self.read_as_inner(address.into(), target, None).await
    }

    /// [`read_as`](Self::read_as) with cancellation.
    pub async fn read_as_with_cancel(
        &self,
        address: impl Into<Address>,
        target: ValueType,
        cancel: &CancellationToken,
    ) -> UaResult<Value> {
        self.read_as_inner(address.into(), target, Some(cancel)).await
    }

    async fn read_as_inner(
        &self,
        address: Address,
        target: ValueType,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Value> {
        ensure_supported(target)?;
        let value = self.read_good_value(address, cancel).await?;
        coerce(&value, target)
    }

    async fn read_typed_inner<T: FromValue>(
        &self,
        address: Address,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<T> {
        ensure_supported(T::VALUE_TYPE)?;
        let value = self.read_good_value(address, cancel).await?;
        T::from_value(&value)
    }

    async fn read_good_value(
        &self,
        address: Address,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Value> {
        let tag = self.read_single(address, cancel).await?;
        if !tag.status.is_good() {
            return Err(UaError::read(tag.address().as_str(), tag.status));
        }
        Ok(tag.value.unwrap_or_default())
    }

    async fn read_single(
        &self,
        address: Address,
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Tag> {
        let mut tags = self.read_batch(std::slice::from_ref(&address), cancel).await?;
        tags.pop().ok_or_else(|| {
            OperationError::ResultCountMismatch {
                operation: "read",
                expected: 1,
                actual: 0,
            }
            .into()
        })
    }

    #[instrument(skip_all, fields(count = addresses.len()))]
    async fn read_batch(
        &self,
        addresses: &[Address],
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Vec<Tag>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let session = self.connection.session()?;
        let nodes: Vec<NodeId> = addresses
            .iter()
            .map(|a| a.to_node_id(self.namespace_index))
            .collect();

        let results = cancellable(
            "read",
            cancel,
            self.connection.provider().read(&session, &nodes),
        )
        .await??;
        check_result_count("read", addresses.len(), results.len())?;

        let tags: Vec<Tag> = addresses
            .iter()
            .zip(results)
            .map(|(address, result)| {
                let mut tag = Tag::new(address.clone()).with_status(result.status);
                tag.value = result.value;
                tag
            })
            .collect();

        let bad = tags.iter().filter(|t| !t.quality()).count();
        self.stats.record_read(tags.len(), bad);
        debug!(bad, "Batch read complete");
        Ok(tags)
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Writes every tag in one round trip, failing on the first bad status.
    ///
    /// Only the first non-good status in input order is reported. Use
    /// [`write_tags`](Self::write_tags) to see every outcome.
    pub async fn write(&self, tags: &[Tag]) -> UaResult<()> {
        self.write_fail_fast(tags, None).await
    }

    /// [`write`](Self::write) with cancellation.
    pub async fn write_with_cancel(
        &self,
        tags: &[Tag],
        cancel: &CancellationToken,
    ) -> UaResult<()> {
        self.write_fail_fast(tags, Some(cancel)).await
    }

    /// Writes every tag in one round trip and reports each outcome.
    ///
    /// Returns the input tags with their status set to what the server
    /// reported for them.
    pub async fn write_tags(&self, tags: &[Tag]) -> UaResult<Vec<Tag>> {
        self.write_inspect(tags, None).await
    }

    /// [`write_tags`](Self::write_tags) with cancellation.
    pub async fn write_tags_with_cancel(
        &self,
        tags: &[Tag],
        cancel: &CancellationToken,
    ) -> UaResult<Vec<Tag>> {
        self.write_inspect(tags, Some(cancel)).await
    }

    /// Writes one tag as a batch of one.
    pub async fn write_one(&self, tag: &Tag) -> UaResult<()> {
        self.write_fail_fast(std::slice::from_ref(tag), None).await
    }

    /// Writes `value` to `address`.
    pub async fn write_value(
        &self,
        address: impl Into<Address>,
        value: impl Into<Value>,
    ) -> UaResult<()> {
        self.write_one(&Tag::new(address).with_value(value)).await
    }

    async fn write_fail_fast(
        &self,
        tags: &[Tag],
        cancel: Option<&CancellationToken>,
    ) -> UaResult<()> {
        let statuses = self.write_batch(tags, cancel).await?;
        match statuses.into_iter().find(|s| !s.is_good()) {
            Some(status) => {
                let err = UaError::write(status, tags.len());
                warn!(status = %status, count = tags.len(), "Batch write rejected");
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn write_inspect(
        &self,
        tags: &[Tag],
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Vec<Tag>> {
        let statuses = self.write_batch(tags, cancel).await?;
        Ok(tags
            .iter()
            .zip(statuses)
            .map(|(tag, status)| tag.clone().with_status(status))
            .collect())
    }

    #[instrument(skip_all, fields(count = tags.len()))]
    async fn write_batch(
        &self,
        tags: &[Tag],
        cancel: Option<&CancellationToken>,
    ) -> UaResult<Vec<StatusCode>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let session = self.connection.session()?;
        let items: Vec<(NodeId, Value)> = tags
            .iter()
            .map(|tag| {
                (
                    tag.address().to_node_id(self.namespace_index),
                    tag.value.clone().unwrap_or_default(),
                )
            })
            .collect();

        let statuses = cancellable(
            "write",
            cancel,
            self.connection.provider().write(&session, &items),
        )
        .await??;
        check_result_count("write", tags.len(), statuses.len())?;

        let bad = statuses.iter().filter(|s| !s.is_good()).count();
        self.stats.record_write(statuses.len(), bad);
        debug!(bad, "Batch write complete");
        Ok(statuses)
    }
}

fn ensure_supported(target: ValueType) -> UaResult<()> {
    if target.is_supported() {
        Ok(())
    } else {
        Err(UnsupportedTypeError {
            type_name: target.name().to_string(),
        }
        .into())
    }
}

// =============================================================================
// Tests
// =============================================================================
