//! Translates `sqlx::Error` into the core crate's [`streamvault::Error`] taxonomy.

use streamvault::Error;

/// Postgres unique-violation SQLSTATE, raised when two writers race on the
/// same `(store_name, domain, stream_id, stream_version)`.
const UNIQUE_VIOLATION: &str = "23505";

/// Postgres serialization-failure SQLSTATE, raised under `SERIALIZABLE`
/// isolation when a concurrent transaction's read-write dependency can't be
/// honored; possible for the header row lock in `append` only under
/// adversarial scheduling, since `SELECT ... FOR UPDATE` already serializes
/// writers on the same stream.
const SERIALIZATION_FAILURE: &str = "40001";

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

/// True for either a unique-violation or a serialization failure — the two
/// SQLSTATEs `append`'s insert treats as "someone else won the race",
/// triggering a reprobe-and-report-conflict instead of a hard backend error.
pub(crate) fn is_concurrency_conflict(err: &sqlx::Error) -> bool {
    is_unique_violation(err)
        || err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .is_some_and(|code| code == SERIALIZATION_FAILURE)
}

pub(crate) fn backend(err: sqlx::Error) -> Error {
    Error::backend(anyhow::anyhow!(err))
}

pub(crate) fn migrate(err: sqlx::migrate::MigrateError) -> Error {
    Error::backend(anyhow::anyhow!(err))
}
