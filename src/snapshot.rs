//! Snapshot store and cutoff advancer (§4.4): a per-stream, latest-wins
//! read-model cache plus the sole mechanism for advancing a stream's
//! archive cutoff.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Snapshot;

/// Per-stream snapshot persistence and archive-cutoff advancement.
///
/// `try_advance_archive_cutoff` is the only sanctioned way to move a
/// stream's `archive_cutoff_version` forward; the archive coordinator
/// never writes it by any other path.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Upsert the snapshot for `stream_id`, keyed by stream_id alone.
    /// Last writer wins regardless of `version`; callers are expected to
    /// supply monotonically non-decreasing versions.
    async fn save_snapshot(&self, stream_id: &str, version: u32, payload: Vec<u8>) -> Result<()>;

    /// The most recently saved snapshot for `stream_id`, or `None`.
    async fn get_latest(&self, stream_id: &str) -> Result<Option<Snapshot>>;

    /// Atomically set `(domain, stream_id)`'s `archive_cutoff_version` to
    /// `new_cutoff` if and only if the current value is unset or strictly
    /// less than `new_cutoff`. Returns whether the update happened.
    async fn try_advance_archive_cutoff(&self, domain: &str, stream_id: &str, new_cutoff: u32) -> Result<bool>;

    /// `save_snapshot` followed by `try_advance_archive_cutoff`. If the
    /// save fails, the cutoff is left untouched; a `false` return from the
    /// advance step is not an error, the snapshot is already durable.
    async fn save_snapshot_and_advance_cutoff(
        &self,
        domain: &str,
        stream_id: &str,
        version: u32,
        payload: Vec<u8>,
    ) -> Result<bool> {
        self.save_snapshot(stream_id, version, payload).await?;
        self.try_advance_archive_cutoff(domain, stream_id, version).await
    }
}
