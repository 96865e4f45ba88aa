//! [`EventStore`] implementation backed by Postgres, grounded on
//! `eventually-postgres`'s `event::Store::append`/`stream`/`stream_all`
//! (transaction-wrapped append, `sqlx::query` row streaming).

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use sqlx::{Postgres, Row, Transaction};
use streamvault::model::{validate_domain, validate_max_count, validate_new_events, validate_stream_id};
use streamvault::store::{EventStore, ForwardCursorOptions};
use streamvault::{Error, Event, ExpectedVersion, Result, StreamHeader};

use crate::error::{backend, is_concurrency_conflict};
use crate::pool::PostgresBackend;

const SLOW_OPERATION_THRESHOLD_MS: u128 = 100;

/// Warn if `operation` on `(domain, stream_id)` took longer than the
/// threshold in §5; never affects the result either way.
fn report_if_slow(operation: &'static str, domain: &str, stream_id: &str, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis();
    if elapsed_ms > SLOW_OPERATION_THRESHOLD_MS {
        #[cfg(feature = "tracing")]
        tracing::warn!(operation, domain, stream_id, elapsed_ms, "hot store operation exceeded 100ms");
        #[cfg(not(feature = "tracing"))]
        let _ = (operation, domain, stream_id, elapsed_ms);
    }
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> Result<Event> {
    Ok(Event {
        global_position: row.try_get("global_position").map_err(backend)?,
        domain: row.try_get("domain").map_err(backend)?,
        stream_id: row.try_get("stream_id").map_err(backend)?,
        stream_version: row.try_get::<i32, _>("stream_version").map_err(backend)? as u32,
        stream_namespace: row.try_get("stream_namespace").map_err(backend)?,
        event_type: row.try_get("event_type").map_err(backend)?,
        payload: row.try_get("payload").map_err(backend)?,
        metadata: row.try_get("metadata").map_err(backend)?,
        created_utc: row.try_get("created_utc").map_err(backend)?,
    })
}

fn row_to_header(row: &sqlx::postgres::PgRow) -> Result<StreamHeader> {
    use streamvault::model::RetentionMode;

    let retention_mode: String = row.try_get("retention_mode").map_err(backend)?;
    let retention_mode = match retention_mode.as_str() {
        "Default" => RetentionMode::Default,
        "FullHistory" => RetentionMode::FullHistory,
        "ColdArchivable" => RetentionMode::ColdArchivable,
        "HardDeletable" => RetentionMode::HardDeletable,
        other => return Err(Error::backend(anyhow::anyhow!("unknown retention_mode '{other}' in database"))),
    };

    Ok(StreamHeader {
        domain: row.try_get("domain").map_err(backend)?,
        stream_id: row.try_get("stream_id").map_err(backend)?,
        last_version: row.try_get::<i32, _>("last_version").map_err(backend)? as u32,
        last_position: row.try_get("last_position").map_err(backend)?,
        retention_mode,
        is_deleted: row.try_get("is_deleted").map_err(backend)?,
        archive_cutoff_version: row.try_get::<Option<i32>, _>("archive_cutoff_version").map_err(backend)?.map(|v| v as u32),
        archived_at: row.try_get("archived_at").map_err(backend)?,
    })
}

fn retention_mode_str(mode: streamvault::model::RetentionMode) -> &'static str {
    use streamvault::model::RetentionMode;
    match mode {
        RetentionMode::Default => "Default",
        RetentionMode::FullHistory => "FullHistory",
        RetentionMode::ColdArchivable => "ColdArchivable",
        RetentionMode::HardDeletable => "HardDeletable",
    }
}

impl PostgresBackend {
    async fn probe_actual_version(&self, domain: &str, stream_id: &str) -> Result<u32> {
        self.get_max_stream_version(domain, stream_id).await
    }
}

#[async_trait]
impl EventStore for PostgresBackend {
    async fn append(
        &self,
        domain: &str,
        stream_id: &str,
        expected_version: ExpectedVersion,
        events: Vec<streamvault::model::NewEvent>,
    ) -> Result<u32> {
        validate_domain(domain)?;
        validate_stream_id(stream_id)?;
        validate_new_events(&events)?;

        let started = Instant::now();

        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await.map_err(backend)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE").execute(&mut *tx).await.map_err(backend)?;

        let retention_mode = retention_mode_str(self.retention_policy.get_policy(domain));
        sqlx::query(
            r#"INSERT INTO stream_headers (store_name, domain, stream_id, last_version, last_position, retention_mode, is_deleted)
               VALUES ($1, $2, $3, 0, 0, $4, FALSE)
               ON CONFLICT (store_name, domain, stream_id) DO NOTHING"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .bind(retention_mode)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let header_row = sqlx::query(
            r#"SELECT last_version, is_deleted FROM stream_headers
               WHERE store_name = $1 AND domain = $2 AND stream_id = $3
               FOR UPDATE"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        let actual_version = header_row.try_get::<i32, _>("last_version").map_err(backend)? as u32;
        let is_deleted: bool = header_row.try_get("is_deleted").map_err(backend)?;

        if is_deleted {
            return Err(Error::StreamClosed { domain: domain.to_owned(), stream_id: stream_id.to_owned() });
        }

        if !expected_version.matches(actual_version) {
            tx.rollback().await.map_err(backend)?;
            let reprobed = self.probe_actual_version(domain, stream_id).await?;
            let expected = match expected_version {
                ExpectedVersion::Exact(v) => v as i64,
                ExpectedVersion::New => 0,
                ExpectedVersion::Any => unreachable!("Any always matches"),
            };
            return Err(Error::ConcurrencyConflict { stream_id: stream_id.to_owned(), expected, actual: reprobed as i64 });
        }

        let created_utc = Utc::now();
        let mut new_version = actual_version;
        let mut new_position: i64 = 0;

        for event in &events {
            new_version += 1;
            let inserted = sqlx::query(
                r#"INSERT INTO events (store_name, domain, stream_id, stream_version, stream_namespace, event_type, payload, metadata, created_utc)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                   RETURNING global_position"#,
            )
            .bind(&self.store_name)
            .bind(domain)
            .bind(stream_id)
            .bind(new_version as i32)
            .bind(&event.stream_namespace)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(&event.metadata)
            .bind(created_utc)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| {
                if is_concurrency_conflict(&err) {
                    Error::ConcurrencyConflict { stream_id: stream_id.to_owned(), expected: new_version as i64, actual: actual_version as i64 }
                } else {
                    backend(err)
                }
            })?;

            new_position = inserted.try_get("global_position").map_err(backend)?;
        }

        sqlx::query(
            r#"UPDATE stream_headers SET last_version = $4, last_position = $5
               WHERE store_name = $1 AND domain = $2 AND stream_id = $3"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .bind(new_version as i32)
        .bind(new_position)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(|err| {
            if is_concurrency_conflict(&err) {
                Error::ConcurrencyConflict { stream_id: stream_id.to_owned(), expected: new_version as i64, actual: actual_version as i64 }
            } else {
                backend(err)
            }
        })?;

        report_if_slow("append", domain, stream_id, started);
        Ok(new_version)
    }

    async fn read_stream(
        &self,
        domain: &str,
        stream_id: &str,
        namespace: Option<&str>,
        from_version_inclusive: u32,
        max_count: u32,
    ) -> Result<Vec<Event>> {
        validate_domain(domain)?;
        validate_stream_id(stream_id)?;
        validate_max_count(max_count)?;

        let started = Instant::now();

        let rows = sqlx::query(
            r#"SELECT global_position, domain, stream_id, stream_version, stream_namespace, event_type, payload, metadata, created_utc
               FROM events
               WHERE store_name = $1 AND domain = $2 AND stream_id = $3 AND stream_version >= $4
                 AND ($5::text IS NULL OR stream_namespace = $5)
               ORDER BY stream_version ASC
               LIMIT $6"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .bind(from_version_inclusive as i32)
        .bind(namespace)
        .bind(max_count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let events = rows.iter().map(row_to_event).collect::<Result<Vec<_>>>();
        report_if_slow("read_stream", domain, stream_id, started);
        events
    }

    fn read_all_forwards<'a>(&'a self, options: ForwardCursorOptions, batch_size: u32) -> BoxStream<'a, Result<Event>> {
        let stream = async_stream::try_stream! {
            let mut from_exclusive = options.from_global_position_exclusive.unwrap_or(0);

            loop {
                let rows = sqlx::query(
                    r#"SELECT global_position, domain, stream_id, stream_version, stream_namespace, event_type, payload, metadata, created_utc
                       FROM events
                       WHERE store_name = $1 AND global_position > $2
                         AND ($3::text IS NULL OR domain = $3)
                         AND ($4::text IS NULL OR stream_namespace = $4)
                       ORDER BY global_position ASC
                       LIMIT $5"#,
                )
                .bind(&self.store_name)
                .bind(from_exclusive)
                .bind(options.domain.as_deref())
                .bind(options.namespace.as_deref())
                .bind(batch_size as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

                let page_size = rows.len();
                for row in &rows {
                    let event = row_to_event(row)?;
                    from_exclusive = event.global_position;
                    yield event;
                }

                if page_size < batch_size as usize {
                    break;
                }
            }
        };

        Box::pin(stream)
    }

    async fn read_up_to_version(&self, domain: &str, stream_id: &str, up_to_version_inclusive: u32) -> Result<Vec<Event>> {
        validate_domain(domain)?;
        validate_stream_id(stream_id)?;

        let rows = sqlx::query(
            r#"SELECT global_position, domain, stream_id, stream_version, stream_namespace, event_type, payload, metadata, created_utc
               FROM events
               WHERE store_name = $1 AND domain = $2 AND stream_id = $3 AND stream_version <= $4
               ORDER BY global_position ASC"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .bind(up_to_version_inclusive as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_event).collect()
    }

    async fn get_stream_header(&self, domain: &str, stream_id: &str) -> Result<Option<StreamHeader>> {
        validate_domain(domain)?;
        validate_stream_id(stream_id)?;

        let row = sqlx::query(
            r#"SELECT domain, stream_id, last_version, last_position, retention_mode, is_deleted, archive_cutoff_version, archived_at
               FROM stream_headers WHERE store_name = $1 AND domain = $2 AND stream_id = $3"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(row_to_header).transpose()
    }

    async fn get_max_stream_version(&self, domain: &str, stream_id: &str) -> Result<u32> {
        let row = sqlx::query(
            r#"SELECT last_version FROM stream_headers WHERE store_name = $1 AND domain = $2 AND stream_id = $3"#,
        )
        .bind(&self.store_name)
        .bind(domain)
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|row| row.try_get::<i32, _>("last_version").unwrap_or(0) as u32).unwrap_or(0))
    }

    async fn get_min_global_position(&self) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MIN(global_position) AS min_position FROM events WHERE store_name = $1")
            .bind(&self.store_name)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;

        row.try_get("min_position").map_err(backend)
    }

    async fn find_archive_candidates(&self) -> Result<Vec<StreamHeader>> {
        let rows = sqlx::query(
            r#"SELECT domain, stream_id, last_version, last_position, retention_mode, is_deleted, archive_cutoff_version, archived_at
               FROM stream_headers
               WHERE store_name = $1
                 AND (
                   (retention_mode IN ('ColdArchivable', 'FullHistory') AND archive_cutoff_version IS NOT NULL AND is_deleted = FALSE)
                   OR (retention_mode = 'HardDeletable' AND is_deleted = TRUE)
                 )"#,
        )
        .bind(&self.store_name)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_header).collect()
    }
}
