//! The combined event feed (§4.6): a single ascending `global_position`
//! sequence merged from the cold archive and the hot store, with no
//! duplicates at the seam between them.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};

use crate::archive::{ColdArchive, SegmentRegistry};
use crate::error::Result;
use crate::model::Event;
use crate::store::{EventStore, ForwardCursorOptions};

/// Merges a [`ColdArchive`] and an [`EventStore`] into one ordered, gap-free,
/// duplicate-free cursor.
pub struct CombinedFeed<S, C, R> {
    store: Arc<S>,
    cold: Arc<C>,
    registry: Arc<R>,
}

impl<S, C, R> CombinedFeed<S, C, R>
where
    S: EventStore,
    C: ColdArchive,
    R: SegmentRegistry,
{
    pub fn new(store: Arc<S>, cold: Arc<C>, registry: Arc<R>) -> Self {
        Self { store, cold, registry }
    }

    /// A lazy cursor over every event with `global_position >
    /// from_exclusive`, merged from cold and hot sources in strict
    /// ascending order with the cold side winning position ties (§4.6).
    ///
    /// The active-segment set is snapshotted once, at call time; segments
    /// committed after that are invisible to this cursor even if it is
    /// still iterating (see the consistency note in §4.6).
    pub async fn read_all_forwards<'a>(&'a self, from_exclusive: Option<i64>, batch_size: u32) -> Result<BoxStream<'a, Result<Event>>> {
        let active_segments = self.registry.list_active().await?;
        let active_ranges: HashSet<(i64, i64)> = active_segments
            .iter()
            .map(|segment| (segment.min_position, segment.max_position))
            .collect();

        let cold_cursor = self
            .cold
            .read_all_forwards(from_exclusive, batch_size as usize)
            .filter(move |result| {
                let keep = match result {
                    Ok(event) => active_ranges.iter().any(|(min, max)| event.global_position >= *min && event.global_position <= *max),
                    Err(_) => true,
                };
                futures::future::ready(keep)
            })
            .boxed();

        let hot_options = ForwardCursorOptions { domain: None, namespace: None, from_global_position_exclusive: from_exclusive };
        let hot_cursor = self.store.read_all_forwards(hot_options, batch_size);

        Ok(merge_by_position(cold_cursor, hot_cursor))
    }
}

/// Classical two-cursor merge over `global_position`, cold-wins-tie.
fn merge_by_position<'a>(cold: BoxStream<'a, Result<Event>>, hot: BoxStream<'a, Result<Event>>) -> BoxStream<'a, Result<Event>> {
    Box::pin(stream::unfold(
        (cold.peekable(), hot.peekable()),
        |(mut cold, mut hot)| async move {
            let cold_peek = cold.as_mut().peek().await;
            let hot_peek = hot.as_mut().peek().await;

            match (cold_peek, hot_peek) {
                (None, None) => None,
                (Some(_), None) => cold.next().await.map(|item| (item, (cold, hot))),
                (None, Some(_)) => hot.next().await.map(|item| (item, (cold, hot))),
                (Some(cold_result), Some(hot_result)) => {
                    let ordering = match (cold_result, hot_result) {
                        (Ok(cold_event), Ok(hot_event)) => cold_event.global_position.cmp(&hot_event.global_position),
                        // Surface the error as soon as possible; order is irrelevant once either side failed.
                        (Err(_), _) => std::cmp::Ordering::Less,
                        (_, Err(_)) => std::cmp::Ordering::Greater,
                    };

                    match ordering {
                        std::cmp::Ordering::Less => cold.next().await.map(|item| (item, (cold, hot))),
                        std::cmp::Ordering::Greater => hot.next().await.map(|item| (item, (cold, hot))),
                        std::cmp::Ordering::Equal => {
                            let cold_item = cold.next().await;
                            let _ = hot.next().await;
                            cold_item.map(|item| (item, (cold, hot)))
                        }
                    }
                }
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(global_position: i64) -> Event {
        Event {
            global_position,
            domain: "d".into(),
            stream_id: "s1".into(),
            stream_version: global_position as u32,
            stream_namespace: Some("ns".into()),
            event_type: "Created".into(),
            payload: vec![],
            metadata: None,
            created_utc: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn merges_disjoint_sides_in_order() {
        let cold = stream::iter(vec![Ok(event(1)), Ok(event(3))]).boxed();
        let hot = stream::iter(vec![Ok(event(2)), Ok(event(4))]).boxed();
        let merged: Vec<i64> = merge_by_position(cold, hot)
            .map(|result| result.expect("event").global_position)
            .collect()
            .await;
        assert_eq!(merged, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn tie_yields_cold_side_once() {
        let cold = stream::iter(vec![Ok(event(1))]).boxed();
        let hot = stream::iter(vec![Ok(event(1))]).boxed();
        let merged: Vec<Event> = merge_by_position(cold, hot).map(|result| result.expect("event")).collect().await;
        assert_eq!(merged.len(), 1);
    }

    struct StubStore {
        events: Vec<Event>,
    }

    #[async_trait::async_trait]
    impl EventStore for StubStore {
        async fn append(&self, _: &str, _: &str, _: crate::model::ExpectedVersion, _: Vec<crate::model::NewEvent>) -> Result<u32> {
            unimplemented!()
        }
        async fn read_stream(&self, _: &str, _: &str, _: Option<&str>, _: u32, _: u32) -> Result<Vec<Event>> {
            unimplemented!()
        }
        fn read_all_forwards<'a>(&'a self, options: ForwardCursorOptions, _: u32) -> crate::store::EventStream<'a> {
            let from = options.from_global_position_exclusive.unwrap_or(0);
            stream::iter(self.events.clone().into_iter().filter(move |e| e.global_position > from).map(Ok)).boxed()
        }
        async fn get_stream_header(&self, _: &str, _: &str) -> Result<Option<crate::model::StreamHeader>> {
            unimplemented!()
        }
        async fn get_max_stream_version(&self, _: &str, _: &str) -> Result<u32> {
            unimplemented!()
        }
        async fn get_min_global_position(&self) -> Result<Option<i64>> {
            unimplemented!()
        }
        async fn read_up_to_version(&self, _: &str, _: &str, _: u32) -> Result<Vec<Event>> {
            unimplemented!()
        }
        async fn find_archive_candidates(&self) -> Result<Vec<crate::model::StreamHeader>> {
            unimplemented!()
        }
    }

    struct StubCold {
        events: Vec<Event>,
    }

    #[async_trait::async_trait]
    impl ColdArchive for StubCold {
        fn read_all_forwards<'a>(&'a self, from_exclusive: Option<i64>, _: usize) -> BoxStream<'a, Result<Event>> {
            let from = from_exclusive.unwrap_or(0);
            stream::iter(self.events.clone().into_iter().filter(move |e| e.global_position > from).map(Ok)).boxed()
        }
        async fn get_range(&self) -> Result<Option<(i64, i64)>> {
            unimplemented!()
        }
        async fn write_segment(&self, _: &[Event]) -> Result<String> {
            unimplemented!()
        }
    }

    struct StubRegistry {
        active: Vec<crate::model::ArchiveSegment>,
    }

    #[async_trait::async_trait]
    impl SegmentRegistry for StubRegistry {
        async fn find_overlapping(&self, _: i64, _: i64) -> Result<Vec<crate::model::ArchiveSegment>> {
            unimplemented!()
        }
        async fn list_active(&self) -> Result<Vec<crate::model::ArchiveSegment>> {
            Ok(self.active.clone())
        }
        async fn get_max_archived_position(&self) -> Result<Option<i64>> {
            unimplemented!()
        }
    }

    fn segment(min: i64, max: i64) -> crate::model::ArchiveSegment {
        crate::model::ArchiveSegment {
            segment_id: 1,
            min_position: min,
            max_position: max,
            file_name: format!("events-{min:016}-{max:016}.ndjson"),
            status: crate::model::SegmentStatus::Active,
            stream_namespace: None,
        }
    }

    #[tokio::test]
    async fn combined_feed_deduplicates_full_history_seam() {
        // Positions 1..6 archived (FullHistory: kept hot too); 7..10 hot only.
        let all_events: Vec<Event> = (1..=10).map(event).collect();
        let cold_events = all_events[0..6].to_vec();

        let store = Arc::new(StubStore { events: all_events.clone() });
        let cold = Arc::new(StubCold { events: cold_events });
        let registry = Arc::new(StubRegistry { active: vec![segment(1, 6)] });

        let feed = CombinedFeed::new(store, cold, registry);
        let merged: Vec<i64> = feed
            .read_all_forwards(None, 100)
            .await
            .expect("cursor")
            .map(|result| result.expect("event").global_position)
            .collect()
            .await;

        assert_eq!(merged, (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn combined_feed_on_empty_store_is_empty() {
        let store = Arc::new(StubStore { events: vec![] });
        let cold = Arc::new(StubCold { events: vec![] });
        let registry = Arc::new(StubRegistry { active: vec![] });

        let feed = CombinedFeed::new(store, cold, registry);
        let merged: Vec<Event> = feed.read_all_forwards(None, 100).await.expect("cursor").map(|result| result.expect("event")).collect().await;

        assert!(merged.is_empty());
    }
}
