//! The segment registry (§4.3): the durable source of truth for which
//! cold-archive segment files are active.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::ArchiveSegment;

/// Durable catalog of committed cold-archive segments.
///
/// A file existing on disk is not sufficient for a segment to participate
/// in reads; only a row with [`crate::model::SegmentStatus::Active`] in
/// the registry is. Mutations happen exclusively through
/// [`super::backend::ArchiveTransaction`], never through this trait
/// directly, so that a segment commit and its registry row are atomic.
#[async_trait]
pub trait SegmentRegistry: Send + Sync {
    /// Every active segment overlapping `[min_position, max_position]`.
    /// Informational only: this reads from a connection independent of any
    /// open archive transaction, so it is not race-proof by itself. The
    /// coordinator's authoritative pre-insert check is
    /// [`super::backend::ArchiveTransaction::has_overlapping_segment`].
    async fn find_overlapping(&self, min_position: i64, max_position: i64) -> Result<Vec<ArchiveSegment>>;

    /// All active segments, ascending by `min_position`.
    async fn list_active(&self) -> Result<Vec<ArchiveSegment>>;

    /// The largest `max_position` across all active segments, or `None` if
    /// the registry is empty. Used by the combined feed to decide which
    /// side of its two cursors currently leads.
    async fn get_max_archived_position(&self) -> Result<Option<i64>>;
}
