#![deny(unsafe_code)]

//! PostgreSQL backend for the `streamvault` storage engine: a single
//! [`PostgresBackend`] implementing [`streamvault::store::EventStore`],
//! [`streamvault::archive::SegmentRegistry`],
//! [`streamvault::archive::ArchiveBackend`] and
//! [`streamvault::snapshot::SnapshotStore`] against one connection pool.

mod archive_backend;
mod error;
mod event_store;
mod pool;
mod registry;
mod snapshot;

pub use archive_backend::PostgresArchiveTransaction;
pub use pool::PostgresBackend;
