//! The archive coordinator (§4.5): drives the retention-mode state machine
//! over candidate streams, committing one segment per stream per run.

use std::sync::Arc;
use std::time::Instant;

use crate::archive::backend::ArchiveBackend;
use crate::archive::cold::ColdArchive;
use crate::error::Result;
use crate::model::{NewSegment, RetentionMode, StreamHeader};
use crate::store::EventStore;

const SLOW_OPERATION_THRESHOLD_MS: u128 = 100;

/// Outcome recorded for a single candidate stream in one [`ArchiveCoordinator::archive`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Wrote a segment and kept the hot copy (`FullHistory`).
    ArchivedAndKept { segment_file: String },
    /// Wrote a segment and deleted the archived hot events (`ColdArchivable`).
    ArchivedAndDeleted { segment_file: String },
    /// Deleted all events and the header (`HardDeletable`, `is_deleted`).
    HardDeleted,
    /// No eligible events found for the cutoff; nothing to do.
    NothingToArchive,
    /// Another coordinator already committed an overlapping segment.
    SkippedOverlap,
}

/// Drives the candidate-stream state machine described in §4.5.
///
/// Not a long-running task itself: [`Self::archive`] performs one pass and
/// returns; scheduling a recurring call is the host application's job (see
/// the `demos/scheduled-archive` binary).
pub struct ArchiveCoordinator<S, C, B> {
    store: Arc<S>,
    cold: Arc<C>,
    backend: Arc<B>,
}

impl<S, C, B> ArchiveCoordinator<S, C, B>
where
    S: EventStore,
    C: ColdArchive,
    B: ArchiveBackend,
{
    pub fn new(store: Arc<S>, cold: Arc<C>, backend: Arc<B>) -> Self {
        Self { store, cold, backend }
    }

    /// Run one archive pass over every candidate stream, returning the
    /// per-stream outcome. Never fails the whole pass because of one
    /// stream; see the module-level contract.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    pub async fn archive(&self) -> Result<Vec<(String, String, ArchiveOutcome)>> {
        let started = Instant::now();
        let candidates = self.store.find_archive_candidates().await?;

        let mut outcomes = Vec::with_capacity(candidates.len());
        for header in candidates {
            let outcome = self.process_candidate(&header).await?;
            outcomes.push((header.domain.clone(), header.stream_id.clone(), outcome));
        }

        let elapsed_ms = started.elapsed().as_millis();
        if elapsed_ms > SLOW_OPERATION_THRESHOLD_MS {
            #[cfg(feature = "tracing")]
            tracing::warn!(elapsed_ms, candidate_count = outcomes.len(), "archive pass exceeded 100ms");
        }

        Ok(outcomes)
    }

    async fn process_candidate(&self, header: &StreamHeader) -> Result<ArchiveOutcome> {
        match (header.retention_mode, header.is_deleted, header.archive_cutoff_version) {
            (RetentionMode::Default, _, _) => Ok(ArchiveOutcome::NothingToArchive),
            (RetentionMode::FullHistory, false, Some(cutoff)) => self.archive_and_keep(header, cutoff).await,
            (RetentionMode::ColdArchivable, false, Some(cutoff)) => self.archive_and_delete(header, cutoff).await,
            (RetentionMode::HardDeletable, true, _) => self.hard_delete(header).await,
            (RetentionMode::HardDeletable, false, _) => Ok(ArchiveOutcome::NothingToArchive),
            _ => Ok(ArchiveOutcome::NothingToArchive),
        }
    }

    async fn archive_and_keep(&self, header: &StreamHeader, cutoff: u32) -> Result<ArchiveOutcome> {
        match self.archive_common(header, cutoff, false).await? {
            None => Ok(ArchiveOutcome::NothingToArchive),
            Some(None) => Ok(ArchiveOutcome::SkippedOverlap),
            Some(Some(segment_file)) => Ok(ArchiveOutcome::ArchivedAndKept { segment_file }),
        }
    }

    async fn archive_and_delete(&self, header: &StreamHeader, cutoff: u32) -> Result<ArchiveOutcome> {
        match self.archive_common(header, cutoff, true).await? {
            None => Ok(ArchiveOutcome::NothingToArchive),
            Some(None) => Ok(ArchiveOutcome::SkippedOverlap),
            Some(Some(segment_file)) => Ok(ArchiveOutcome::ArchivedAndDeleted { segment_file }),
        }
    }

    async fn hard_delete(&self, header: &StreamHeader) -> Result<ArchiveOutcome> {
        let mut txn = self.backend.begin_archive_transaction().await?;
        txn.hard_delete_stream(&header.domain, &header.stream_id).await?;
        txn.commit().await?;
        Ok(ArchiveOutcome::HardDeleted)
    }

    /// The common archive-and-keep / archive-and-delete sub-protocol
    /// (§4.5 steps 1-8), parameterized by whether hot events are deleted
    /// after the segment commits. Returns `None` if there was nothing
    /// eligible, `Some(None)` on overlap skip, `Some(Some(file_name))` on
    /// a committed segment.
    async fn archive_common(&self, header: &StreamHeader, cutoff: u32, delete_after_commit: bool) -> Result<Option<Option<String>>> {
        let events = self.store.read_up_to_version(&header.domain, &header.stream_id, cutoff).await?;
        if events.is_empty() {
            return Ok(None);
        }
        let min_pos = events.first().expect("non-empty").global_position;
        let max_pos = events.last().expect("non-empty").global_position;
        let namespace = events.first().expect("non-empty").stream_namespace.clone();

        let mut txn = self.backend.begin_archive_transaction().await?;

        if txn.has_overlapping_segment(min_pos, max_pos).await? {
            txn.rollback().await?;
            return Ok(Some(None));
        }

        let file_name = self.cold.write_segment(&events).await?;
        let segment = NewSegment { min_position: min_pos, max_position: max_pos, file_name: file_name.clone(), stream_namespace: namespace };
        txn.insert_segment(segment).await?;

        if delete_after_commit {
            txn.delete_hot_events_up_to(&header.domain, &header.stream_id, cutoff).await?;
        }
        txn.mark_archived(&header.domain, &header.stream_id, cutoff).await?;
        txn.commit().await?;

        Ok(Some(Some(file_name)))
    }
}
