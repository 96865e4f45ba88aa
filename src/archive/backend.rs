//! The archive commit transaction (§4.4, §4.5): the one place a concrete
//! backend's transaction type is allowed to leak past its own crate, kept
//! narrow so the coordinator never branches on backend identity (§9).

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ArchiveSegment, NewSegment};

/// A single, backend-owned atomic unit of work committing one segment.
///
/// Implementations wrap a native transaction (e.g. a `sqlx::Transaction`)
/// so that the overlap check, the registry insert, and the hot-store
/// cleanup all succeed or all fail together. Consumed by value on
/// [`Self::commit`]/[`Self::rollback`] so a transaction cannot be reused
/// after either call.
#[async_trait]
pub trait ArchiveTransaction: Send {
    /// True if an existing active segment's `[min, max]` range intersects
    /// `[min_position, max_position]`, checked against this transaction's
    /// own connection so the read is part of the same atomic unit as the
    /// [`Self::insert_segment`] that follows it (§3/§4.5: the non-overlap
    /// pre-check must run inside the same transaction that inserts the
    /// row). [`super::registry::SegmentRegistry::find_overlapping`] runs
    /// on a separate connection and is informational only.
    async fn has_overlapping_segment(&mut self, min_position: i64, max_position: i64) -> Result<bool>;

    /// Insert `segment` as the new active registry row. Callers must have
    /// already confirmed no overlap via [`Self::has_overlapping_segment`]
    /// on this same transaction.
    async fn insert_segment(&mut self, segment: NewSegment) -> Result<ArchiveSegment>;

    /// Clear the hot copy of every event in `(domain, stream_id)` with
    /// `stream_version <= cutoff_version`, per [`crate::model::RetentionMode::ColdArchivable`].
    /// Never touches the stream header's `last_version`/`last_position`.
    async fn delete_hot_events_up_to(&mut self, domain: &str, stream_id: &str, cutoff_version: u32) -> Result<()>;

    /// Permanently remove every event and the header itself for
    /// `(domain, stream_id)`, per [`crate::model::RetentionMode::HardDeletable`]
    /// once `is_deleted` is set. No cold-archive write accompanies this.
    async fn hard_delete_stream(&mut self, domain: &str, stream_id: &str) -> Result<()>;

    /// Stamp the header's `archive_cutoff_version`/`archived_at` to reflect
    /// a completed archive action, without altering `last_version`.
    async fn mark_archived(&mut self, domain: &str, stream_id: &str, cutoff_version: u32) -> Result<()>;

    /// Commit every change made through this transaction.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every change made through this transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Backend capability providing archive commit transactions.
///
/// Split out from [`crate::store::EventStore`] and
/// [`super::registry::SegmentRegistry`] so a backend can share a single
/// connection pool across all three without the core crate knowing it.
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Begin a new commit transaction against this backend.
    async fn begin_archive_transaction(&self) -> Result<Box<dyn ArchiveTransaction>>;
}
