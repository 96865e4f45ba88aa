//! Cold archive: an append-only, file-per-segment NDJSON store (§4.2, §6).
//!
//! Each committed segment is named `events-{min:016d}-{max:016d}.ndjson`;
//! the filename is authoritative for the segment's bounds when scanning
//! the directory, while the [`super::registry::SegmentRegistry`] is
//! authoritative for whether a segment is active.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::model::Event;

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^events-(\d{16})-(\d{16})\.ndjson$").expect("valid regex"))
}

/// On-the-wire NDJSON representation of an [`Event`] (§6): camelCase
/// fields, base64-encoded binary payload/metadata, RFC 3339 timestamp.
/// `domain` is deliberately absent — it is not part of the §6 field list,
/// so cold segments are domain-agnostic on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NdjsonEvent {
    global_position: i64,
    stream_id: String,
    stream_version: u32,
    stream_namespace: Option<String>,
    event_type: String,
    created_utc: DateTime<Utc>,
    data: Option<String>,
    metadata: Option<String>,
}

impl From<&Event> for NdjsonEvent {
    fn from(event: &Event) -> Self {
        Self {
            global_position: event.global_position,
            stream_id: event.stream_id.clone(),
            stream_version: event.stream_version,
            stream_namespace: event.stream_namespace.clone(),
            event_type: event.event_type.clone(),
            created_utc: event.created_utc,
            data: Some(BASE64.encode(&event.payload)),
            metadata: event.metadata.as_deref().map(|bytes| BASE64.encode(bytes)),
        }
    }
}

impl TryFrom<NdjsonEvent> for Event {
    type Error = Error;

    fn try_from(line: NdjsonEvent) -> Result<Self> {
        let payload = match line.data {
            Some(encoded) => BASE64
                .decode(encoded)
                .map_err(|err| Error::backend(anyhow::anyhow!("invalid base64 payload: {err}")))?,
            None => Vec::new(),
        };
        let metadata = line
            .metadata
            .map(|encoded| {
                BASE64
                    .decode(encoded)
                    .map_err(|err| Error::backend(anyhow::anyhow!("invalid base64 metadata: {err}")))
            })
            .transpose()?;

        Ok(Event {
            global_position: line.global_position,
            // Not carried on the wire; the combined feed never filters cold
            // events by domain, only the hot store scopes reads by it.
            domain: String::new(),
            stream_id: line.stream_id,
            stream_version: line.stream_version,
            stream_namespace: line.stream_namespace,
            event_type: line.event_type,
            payload,
            metadata,
            created_utc: line.created_utc,
        })
    }
}

/// Serialize one event to a single NDJSON line (no trailing newline).
fn serialize_line(event: &Event) -> Result<String> {
    serde_json::to_string(&NdjsonEvent::from(event))
        .map_err(|err| Error::backend(anyhow::anyhow!("failed to encode event as json: {err}")))
}

/// Parse one NDJSON line back into an [`Event`].
fn deserialize_line(line: &str) -> Result<Event> {
    let parsed: NdjsonEvent = serde_json::from_str(line)
        .map_err(|err| Error::backend(anyhow::anyhow!("failed to decode ndjson line: {err}")))?;
    Event::try_from(parsed)
}

fn segment_file_name(min_position: i64, max_position: i64) -> String {
    format!("events-{min_position:016}-{max_position:016}.ndjson")
}

fn parse_segment_bounds(file_name: &str) -> Option<(i64, i64)> {
    let captures = file_name_pattern().captures(file_name)?;
    let min: i64 = captures.get(1)?.as_str().parse().ok()?;
    let max: i64 = captures.get(2)?.as_str().parse().ok()?;
    Some((min, max))
}

/// Cold-storage read cursor, consumed by the combined feed (§4.6).
///
/// Implementations do not know which segments are "active" — filtering by
/// the registry's active-segment set is the combined feed's job, not the
/// archive's. No orphan-file garbage collection is performed here; see
/// the open-question decision in DESIGN.md.
#[async_trait]
pub trait ColdArchive: Send + Sync {
    /// A lazy cursor over every event across every segment file with
    /// `global_position > from_exclusive`, in ascending order. Segment
    /// files are visited in ascending `min_position` order; within a file,
    /// lines are already ordered because of how they were written.
    fn read_all_forwards<'a>(&'a self, from_exclusive: Option<i64>, batch_size: usize) -> BoxStream<'a, Result<Event>>;

    /// The `(min, max)` global-position range spanned by every segment
    /// file found by filename scan, or `None` if the archive directory has
    /// no segment files. Purely informational; ignores registry activeness.
    async fn get_range(&self) -> Result<Option<(i64, i64)>>;

    /// Serialize `events` (already ordered by ascending `global_position`)
    /// to a new NDJSON segment file, via the atomic write protocol in §4.2,
    /// and return its basename. Does not touch the segment registry.
    async fn write_segment(&self, events: &[Event]) -> Result<String>;
}

/// [`ColdArchive`] implementation backed by a directory of NDJSON files on
/// the local filesystem.
#[derive(Debug, Clone)]
pub struct FileArchive {
    directory: PathBuf,
}

impl FileArchive {
    /// Create a cold archive rooted at `directory`. The directory is
    /// created (including parents) if it does not already exist.
    pub async fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .await
            .map_err(|err| Error::backend(anyhow::anyhow!("failed to create archive directory: {err}")))?;
        Ok(Self { directory })
    }

    fn path_for(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }

    async fn scan_segment_files(&self) -> Result<Vec<(i64, i64, PathBuf)>> {
        let mut entries = fs::read_dir(&self.directory)
            .await
            .map_err(|err| Error::backend(anyhow::anyhow!("failed to read archive directory: {err}")))?;

        let mut segments = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| Error::backend(anyhow::anyhow!("failed to enumerate archive directory: {err}")))?
        {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some((min, max)) = parse_segment_bounds(file_name) else {
                continue;
            };
            segments.push((min, max, entry.path()));
        }
        segments.sort_by_key(|(min, _, _)| *min);
        Ok(segments)
    }

    async fn read_file_lines(path: &Path) -> Result<Vec<String>> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|err| Error::backend(anyhow::anyhow!("failed to read segment file {path:?}: {err}")))?;
        Ok(contents.lines().map(str::to_owned).collect())
    }
}

#[async_trait]
impl ColdArchive for FileArchive {
    fn read_all_forwards<'a>(&'a self, from_exclusive: Option<i64>, _batch_size: usize) -> BoxStream<'a, Result<Event>> {
        let from_exclusive = from_exclusive.unwrap_or(0);

        Box::pin(stream::once(async move { self.scan_segment_files().await }).flat_map(move |segments| {
            let segments = match segments {
                Ok(segments) => segments
                    .into_iter()
                    .filter(|(_, max, _)| *max > from_exclusive)
                    .collect::<Vec<_>>(),
                Err(err) => return stream::iter(vec![Err(err)]).boxed(),
            };

            stream::iter(segments)
                .then(move |(_, _, path)| async move { Self::read_file_lines(&path).await })
                .flat_map(move |lines| {
                    let lines = match lines {
                        Ok(lines) => lines,
                        Err(err) => return stream::iter(vec![Err(err)]).boxed(),
                    };
                    stream::iter(lines)
                        .map(|line| deserialize_line(&line))
                        .filter(move |event| {
                            let keep = matches!(event, Ok(event) if event.global_position > from_exclusive)
                                || event.is_err();
                            futures::future::ready(keep)
                        })
                        .boxed()
                })
                .boxed()
        }))
    }

    async fn get_range(&self) -> Result<Option<(i64, i64)>> {
        let segments = self.scan_segment_files().await?;
        if segments.is_empty() {
            return Ok(None);
        }
        let min = segments.iter().map(|(min, _, _)| *min).min().expect("non-empty");
        let max = segments.iter().map(|(_, max, _)| *max).max().expect("non-empty");
        Ok(Some((min, max)))
    }

    async fn write_segment(&self, events: &[Event]) -> Result<String> {
        if events.is_empty() {
            return Err(Error::invalid("events", "cannot write an empty segment"));
        }

        let min_position = events.first().expect("non-empty").global_position;
        let max_position = events.last().expect("non-empty").global_position;
        let file_name = segment_file_name(min_position, max_position);
        let final_path = self.path_for(&file_name);

        if fs::try_exists(&final_path)
            .await
            .map_err(|err| Error::backend(anyhow::anyhow!("failed to stat segment file: {err}")))?
        {
            // Crash recovery / retry: the file already exists, treat it as authoritative.
            return Ok(file_name);
        }

        let tmp_path = self.path_for(&format!("{file_name}.tmp"));

        let mut lines = Vec::with_capacity(events.len());
        for event in events {
            lines.push(serialize_line(event)?);
        }
        let mut contents = lines.join("\n");
        contents.push('\n');

        {
            let mut file = fs::File::create(&tmp_path)
                .await
                .map_err(|err| Error::backend(anyhow::anyhow!("failed to create temp segment file: {err}")))?;
            file.write_all(contents.as_bytes())
                .await
                .map_err(|err| Error::backend(anyhow::anyhow!("failed to write temp segment file: {err}")))?;
            file.flush()
                .await
                .map_err(|err| Error::backend(anyhow::anyhow!("failed to flush temp segment file: {err}")))?;
            file.sync_all()
                .await
                .map_err(|err| Error::backend(anyhow::anyhow!("failed to fsync temp segment file: {err}")))?;
        }

        match fs::rename(&tmp_path, &final_path).await {
            Ok(()) => Ok(file_name),
            Err(err) if final_path_exists_race(&err) => {
                let _ = fs::remove_file(&tmp_path).await;
                Ok(file_name)
            }
            Err(err) => Err(Error::backend(anyhow::anyhow!(
                "failed to atomically rename segment file: {err}"
            ))),
        }
    }
}

fn final_path_exists_race(_err: &std::io::Error) -> bool {
    // `rename` overwrites on most platforms rather than failing when the
    // destination exists, so this only matters on platforms where it
    // doesn't; treat any rename error as non-retryable beyond that check
    // performed up-front in `write_segment`.
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(global_position: i64, stream_version: u32) -> Event {
        Event {
            global_position,
            domain: "d".into(),
            stream_id: "s1".into(),
            stream_version,
            stream_namespace: Some("ns".into()),
            event_type: "Created".into(),
            payload: vec![1, 2, 3],
            metadata: Some(vec![9]),
            created_utc: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn segment_file_name_is_zero_padded() {
        assert_eq!(segment_file_name(1, 5), "events-0000000000000001-0000000000000005.ndjson");
    }

    #[test]
    fn parses_well_formed_file_name() {
        assert_eq!(
            parse_segment_bounds("events-0000000000000001-0000000000000005.ndjson"),
            Some((1, 5))
        );
    }

    #[test]
    fn rejects_malformed_file_name() {
        assert_eq!(parse_segment_bounds("events-1-5.ndjson"), None);
        assert_eq!(parse_segment_bounds("not-a-segment.ndjson"), None);
    }

    #[test]
    fn line_round_trips() {
        let original = event(42, 3);
        let line = serialize_line(&original).expect("serialize");
        let restored = deserialize_line(&line).expect("deserialize");
        // `domain` is not part of the wire format (§6); every other field
        // must survive the round trip unchanged.
        let expected = Event { domain: String::new(), ..original };
        assert_eq!(expected, restored);
    }

    #[test]
    fn line_uses_camel_case_field_names() {
        let line = serialize_line(&event(42, 3)).expect("serialize");
        let value: serde_json::Value = serde_json::from_str(&line).expect("valid json");
        let object = value.as_object().expect("object");
        for field in ["globalPosition", "streamId", "streamVersion", "streamNamespace", "eventType", "createdUtc", "data", "metadata"] {
            assert!(object.contains_key(field), "missing {field} in {line}");
        }
        assert!(!object.contains_key("domain"), "domain must not be serialized: {line}");
        assert!(!object.contains_key("global_position"), "field must be camelCase, not snake_case: {line}");
    }

    #[tokio::test]
    async fn write_then_read_segment() {
        let dir = tempdir();
        let archive = FileArchive::new(dir.path()).await.expect("create archive");

        let events = vec![event(1, 1), event(2, 2), event(3, 3)];
        let file_name = archive.write_segment(&events).await.expect("write segment");
        assert_eq!(file_name, "events-0000000000000001-0000000000000003.ndjson");

        let read_back: Vec<Event> = archive
            .read_all_forwards(None, 10)
            .map(|result| result.expect("event"))
            .collect::<Vec<_>>()
            .await;
        let expected: Vec<Event> = events.iter().cloned().map(|event| Event { domain: String::new(), ..event }).collect();
        assert_eq!(read_back, expected);

        let range = archive.get_range().await.expect("range");
        assert_eq!(range, Some((1, 3)));
    }

    #[tokio::test]
    async fn read_all_forwards_respects_from_exclusive() {
        let dir = tempdir();
        let archive = FileArchive::new(dir.path()).await.expect("create archive");
        let events = vec![event(1, 1), event(2, 2), event(3, 3)];
        archive.write_segment(&events).await.expect("write segment");

        let read_back: Vec<Event> = archive
            .read_all_forwards(Some(1), 10)
            .map(|result| result.expect("event"))
            .collect::<Vec<_>>()
            .await;
        assert_eq!(
            read_back,
            vec![Event { domain: String::new(), ..event(2, 2) }, Event { domain: String::new(), ..event(3, 3) }]
        );
    }

    #[tokio::test]
    async fn rewriting_same_segment_is_idempotent() {
        let dir = tempdir();
        let archive = FileArchive::new(dir.path()).await.expect("create archive");
        let events = vec![event(1, 1)];
        let first = archive.write_segment(&events).await.expect("write");
        let second = archive.write_segment(&events).await.expect("write again");
        assert_eq!(first, second);
    }

    fn tempdir() -> tempfile::TempDir {
        tempfile::tempdir().expect("create temp dir")
    }
}
