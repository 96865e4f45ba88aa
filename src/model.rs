//! Core data model: [`Event`], [`StreamHeader`], [`Snapshot`], [`ArchiveSegment`].
//!
//! Field names here are the semantic names from the specification; a
//! concrete backend is free to use different column names as long as the
//! invariants documented on each type hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum length, in bytes, of a `domain` identifier.
pub const MAX_DOMAIN_LEN: usize = 100;
/// Maximum length, in bytes, of a `stream_id` identifier.
pub const MAX_STREAM_ID_LEN: usize = 200;
/// Smallest accepted `max_count` for [`crate::store::EventStore::read_stream`].
pub const MIN_READ_COUNT: u32 = 1;
/// Largest accepted `max_count` for [`crate::store::EventStore::read_stream`]
/// and batch size for forward cursors.
pub const MAX_READ_COUNT: u32 = 10_000;

/// A fact recorded against a stream. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Store-wide, strictly increasing position assigned at append time.
    pub global_position: i64,
    /// Domain the owning stream belongs to.
    pub domain: String,
    /// Identifier of the owning stream, unique within `domain`.
    pub stream_id: String,
    /// 1-based, dense position of this event within its stream.
    pub stream_version: u32,
    /// Optional selective read filter.
    pub stream_namespace: Option<String>,
    /// Short identifier describing the payload's schema.
    pub event_type: String,
    /// Opaque payload bytes. May be empty, never absent.
    pub payload: Vec<u8>,
    /// Opaque metadata bytes.
    pub metadata: Option<Vec<u8>>,
    /// Wall-clock timestamp stamped by the hot store at append; shared by
    /// every event in the same append batch.
    pub created_utc: DateTime<Utc>,
}

/// An event not yet assigned a `stream_version`, `global_position` or
/// `created_utc` — the unit of input to [`crate::store::EventStore::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    /// Selective read filter; must be non-empty.
    pub stream_namespace: String,
    /// Short identifier describing the payload's schema; must be non-empty.
    pub event_type: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Opaque metadata bytes.
    pub metadata: Option<Vec<u8>>,
}

impl NewEvent {
    fn validate(&self) -> Result<()> {
        if self.stream_namespace.is_empty() {
            return Err(Error::invalid(
                "stream_namespace",
                "must not be empty for an appended event",
            ));
        }
        if self.event_type.is_empty() {
            return Err(Error::invalid(
                "event_type",
                "must not be empty for an appended event",
            ));
        }
        Ok(())
    }
}

/// Caller's optimistic-concurrency assertion for [`crate::store::EventStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must not yet exist (`last_version == 0`).
    New,
    /// Disable the concurrency check entirely.
    Any,
    /// The stream's `last_version` must equal this exact value.
    Exact(u32),
}

impl ExpectedVersion {
    /// Decode the wire-level integer encoding (`0` = NEW, `-1` = ANY,
    /// `N >= 1` = exact) used at the edges of the system (e.g. host
    /// application configuration).
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            0 => Ok(ExpectedVersion::New),
            -1 => Ok(ExpectedVersion::Any),
            n if n >= 1 => Ok(ExpectedVersion::Exact(n as u32)),
            _ => Err(Error::invalid(
                "expected_version",
                format!("must be -1, 0, or >= 1, got {raw}"),
            )),
        }
    }

    /// True if `actual` satisfies this expectation.
    pub fn matches(self, actual: u32) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::New => actual == 0,
            ExpectedVersion::Exact(expected) => expected == actual,
        }
    }
}

/// Per-stream retention policy, selecting how the archive coordinator
/// treats the stream's events once an archive cutoff is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RetentionMode {
    /// Not yet eligible for any archive action.
    Default,
    /// Archive to cold storage but keep the hot copy.
    FullHistory,
    /// Archive to cold storage and delete the hot copy.
    ColdArchivable,
    /// Hard-delete all events and the header once `is_deleted` is set.
    HardDeletable,
}

/// One row per `(domain, stream_id)`, created lazily on first append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Domain the stream belongs to.
    pub domain: String,
    /// Identifier of the stream.
    pub stream_id: String,
    /// Max `stream_version` appended so far, or 0 if none.
    pub last_version: u32,
    /// `global_position` of the most recently appended event.
    pub last_position: i64,
    /// Policy applied by the archive coordinator.
    pub retention_mode: RetentionMode,
    /// Soft-delete flag, meaningful only for [`RetentionMode::HardDeletable`].
    pub is_deleted: bool,
    /// Inclusive upper bound on `stream_version` eligible for archival.
    pub archive_cutoff_version: Option<u32>,
    /// Informational timestamp of the most recent archive action.
    pub archived_at: Option<DateTime<Utc>>,
}

impl StreamHeader {
    /// Header for a stream that has never been appended to.
    pub fn fresh(domain: impl Into<String>, stream_id: impl Into<String>, retention_mode: RetentionMode) -> Self {
        Self {
            domain: domain.into(),
            stream_id: stream_id.into(),
            last_version: 0,
            last_position: 0,
            retention_mode,
            is_deleted: false,
            archive_cutoff_version: None,
            archived_at: None,
        }
    }
}

/// Opaque, latest-wins per-stream read-model snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Identifier of the stream this snapshot replays up to.
    pub stream_id: String,
    /// Stream version the snapshot was taken at.
    pub stream_version: u32,
    /// Opaque serialized application state.
    pub payload: Vec<u8>,
    /// When the snapshot was persisted.
    pub created_utc: DateTime<Utc>,
}

/// One committed cold-storage segment: an NDJSON file plus its registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSegment {
    /// Unique monotonic identifier assigned by the registry.
    pub segment_id: i64,
    /// Inclusive lower bound of `global_position` covered by the file.
    pub min_position: i64,
    /// Inclusive upper bound of `global_position` covered by the file.
    pub max_position: i64,
    /// Basename of the NDJSON file (directory implied by configuration).
    pub file_name: String,
    /// Only `active` segments participate in reads.
    pub status: SegmentStatus,
    /// Propagated from the first event in the segment, if present.
    pub stream_namespace: Option<String>,
}

/// Activeness of an [`ArchiveSegment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    /// Participates in combined-feed and cold reads.
    Active,
}

/// A not-yet-committed segment, the input to the archive coordinator's
/// commit protocol.
#[derive(Debug, Clone)]
pub struct NewSegment {
    /// Inclusive lower bound of `global_position` covered by the file.
    pub min_position: i64,
    /// Inclusive upper bound of `global_position` covered by the file.
    pub max_position: i64,
    /// Basename of the NDJSON file already written to disk.
    pub file_name: String,
    /// Propagated from the first event in the segment, if present.
    pub stream_namespace: Option<String>,
}

/// Validate a `domain` identifier against the length bound in §3.
pub fn validate_domain(domain: &str) -> Result<()> {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return Err(Error::invalid(
            "domain",
            format!("must be non-empty and at most {MAX_DOMAIN_LEN} chars"),
        ));
    }
    Ok(())
}

/// Validate a `stream_id` identifier against the length bound in §3.
pub fn validate_stream_id(stream_id: &str) -> Result<()> {
    if stream_id.is_empty() || stream_id.len() > MAX_STREAM_ID_LEN {
        return Err(Error::invalid(
            "stream_id",
            format!("must be non-empty and at most {MAX_STREAM_ID_LEN} chars"),
        ));
    }
    Ok(())
}

/// Validate a batch of events to append: non-empty, every event well-formed.
pub fn validate_new_events(events: &[NewEvent]) -> Result<()> {
    if events.is_empty() {
        return Err(Error::invalid("events", "append batch must not be empty"));
    }
    for event in events {
        event.validate()?;
    }
    Ok(())
}

/// Validate a `max_count`/`batch_size` parameter against `[1, 10_000]`.
pub fn validate_max_count(max_count: u32) -> Result<()> {
    if max_count < MIN_READ_COUNT || max_count > MAX_READ_COUNT {
        return Err(Error::invalid(
            "max_count",
            format!("must be in [{MIN_READ_COUNT}, {MAX_READ_COUNT}], got {max_count}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn expected_version_new_matches_only_zero() {
        assert!(ExpectedVersion::New.matches(0));
        assert!(!ExpectedVersion::New.matches(1));
    }

    #[test]
    fn expected_version_any_matches_everything() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(u32::MAX));
    }

    proptest! {
        /// Every raw encoding accepted by `from_raw` round-trips back to a
        /// version that `matches` the same actual value it was decoded
        /// from, for `Exact`; `New`/`Any` are covered by the unit tests
        /// above since they collapse many raw inputs to one variant.
        #[test]
        fn exact_from_raw_matches_only_its_own_value(n in 1i64..=i64::from(u32::MAX), other in 0u32..=u32::MAX) {
            let decoded = ExpectedVersion::from_raw(n).expect("n >= 1 is a valid raw encoding");
            let actual = n as u32;
            prop_assert_eq!(decoded.matches(actual), true);
            if other != actual {
                prop_assert_eq!(decoded.matches(other), false);
            }
        }

        #[test]
        fn from_raw_rejects_anything_below_minus_one(n in i64::MIN..-1) {
            prop_assert!(ExpectedVersion::from_raw(n).is_err());
        }
    }
}
