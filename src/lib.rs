//! Durable, tiered hot/cold event-sourcing storage engine.
//!
//! A [`store::EventStore`] holds recent events under optimistic
//! concurrency; an [`archive::ArchiveCoordinator`] migrates older events
//! to [`archive::ColdArchive`] NDJSON segments according to each stream's
//! [`model::RetentionMode`]; [`feed::CombinedFeed`] presents both tiers as
//! one ordered cursor. The core crate is backend-agnostic: a concrete
//! relational backend implements the traits in [`store`], [`archive`] and
//! [`snapshot`].

pub mod archive;
pub mod config;
pub mod error;
pub mod feed;
pub mod model;
pub mod retention;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
pub use model::{Event, ExpectedVersion, NewEvent, RetentionMode, Snapshot, StreamHeader};
