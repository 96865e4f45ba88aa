//! The hot event store contract (§4.1): optimistic-concurrency append plus
//! the by-stream and by-global-position read cursors.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::model::{Event, ExpectedVersion, NewEvent, StreamHeader};

/// A lazy, finite, non-restartable sequence of events, yielded in the
/// order each cursor promises. Suspension (a database round trip or file
/// read) may occur between any two items.
pub type EventStream<'a> = BoxStream<'a, Result<Event>>;

/// Parameters for a `read_all_forwards`-style cursor, shared by the hot
/// store, the cold archive, and the combined feed.
#[derive(Debug, Clone, Default)]
pub struct ForwardCursorOptions {
    /// Restrict to events with this `domain`, if set.
    pub domain: Option<String>,
    /// Restrict to events with this `stream_namespace`, if set.
    pub namespace: Option<String>,
    /// Only yield events with `global_position` strictly greater than this.
    pub from_global_position_exclusive: Option<i64>,
}

/// The hot, relational-backed event store: append with optimistic
/// concurrency, plus the by-stream and global-position read cursors.
///
/// Implementations own the stream-header invariants described in §3: the
/// header is created lazily on first append, updated atomically alongside
/// the event inserts, and never has `is_deleted`, `archive_cutoff_version`
/// or `archived_at` reset by an append.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append `events` to `(domain, stream_id)` under the given
    /// concurrency expectation, returning the stream's new `last_version`.
    ///
    /// # Errors
    ///
    /// - [`crate::error::Error::InvalidArgument`] if `domain`/`stream_id`
    ///   are malformed, or `events` is empty or contains a malformed event.
    /// - [`crate::error::Error::StreamClosed`] if the header is soft-deleted.
    /// - [`crate::error::Error::ConcurrencyConflict`] if `expected_version`
    ///   does not match the stream's actual `last_version`.
    async fn append(
        &self,
        domain: &str,
        stream_id: &str,
        expected_version: ExpectedVersion,
        events: Vec<NewEvent>,
    ) -> Result<u32>;

    /// Read events of `(domain, stream_id)` with `stream_version >=
    /// from_version_inclusive`, optionally filtered by `namespace`,
    /// ascending, capped at `max_count` (`[1, 10_000]`).
    ///
    /// Returns an empty list, not an error, if the stream does not exist.
    async fn read_stream(
        &self,
        domain: &str,
        stream_id: &str,
        namespace: Option<&str>,
        from_version_inclusive: u32,
        max_count: u32,
    ) -> Result<Vec<Event>>;

    /// A lazy cursor over every event with `global_position` greater than
    /// `options.from_global_position_exclusive`, in ascending
    /// `global_position` order, optionally filtered by domain/namespace,
    /// internally paginated in batches of `batch_size` (`[1, 10_000]`).
    fn read_all_forwards<'a>(&'a self, options: ForwardCursorOptions, batch_size: u32) -> EventStream<'a>;

    /// Point read of a stream's header, or `None` if it has never been
    /// appended to (or has been hard-deleted).
    async fn get_stream_header(&self, domain: &str, stream_id: &str) -> Result<Option<StreamHeader>>;

    /// The stream's `last_version`, or 0 if it does not exist.
    async fn get_max_stream_version(&self, domain: &str, stream_id: &str) -> Result<u32>;

    /// The smallest `global_position` present anywhere in the hot store,
    /// or `None` if it is empty.
    async fn get_min_global_position(&self) -> Result<Option<i64>>;

    /// Every hot event of `(domain, stream_id)` with `stream_version <=
    /// up_to_version_inclusive`, ascending by `global_position`. Unlike
    /// [`Self::read_stream`] this has no upper bound on the number of rows
    /// returned; it exists only for the archive coordinator's
    /// archive-and-keep / archive-and-delete sub-protocol (§4.5).
    async fn read_up_to_version(&self, domain: &str, stream_id: &str, up_to_version_inclusive: u32) -> Result<Vec<Event>>;

    /// Stream headers eligible for the archive coordinator's retention-mode
    /// state machine (§4.5): either `retention_mode` is `ColdArchivable` or
    /// `FullHistory` with `archive_cutoff_version` set and `is_deleted =
    /// false`, or `retention_mode = HardDeletable` and `is_deleted = true`.
    async fn find_archive_candidates(&self) -> Result<Vec<StreamHeader>>;
}
