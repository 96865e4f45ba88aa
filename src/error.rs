//! Error taxonomy shared by every component of the storage engine.
//!
//! Mirrors the split the backend crate uses: a small set of typed,
//! `thiserror`-derived variants at the public boundary, never a bare
//! `anyhow::Error`.

/// Result alias returning the crate [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by any public operation of the storage engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller's `expected_version` did not match the stream's actual
    /// last version at append time.
    #[error("concurrency conflict on stream '{stream_id}': expected version {expected}, actual {actual}")]
    ConcurrencyConflict {
        /// Identifier of the stream the append was attempted against.
        stream_id: String,
        /// The version the caller asserted.
        expected: i64,
        /// The version actually stored.
        actual: i64,
    },

    /// The stream's header is marked `is_deleted` and can no longer be
    /// appended to.
    #[error("stream '{domain}/{stream_id}' is closed")]
    StreamClosed {
        /// Domain the stream belongs to.
        domain: String,
        /// Identifier of the closed stream.
        stream_id: String,
    },

    /// A caller-supplied argument violated a documented precondition.
    #[error("invalid argument '{parameter}': {reason}")]
    InvalidArgument {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// Human-readable explanation.
        reason: String,
    },

    /// An unrecoverable I/O or storage failure.
    #[error("backend failure: {cause}")]
    Backend {
        /// The underlying cause.
        #[source]
        cause: anyhow::Error,
    },
}

impl Error {
    /// Shorthand for constructing an [`Error::InvalidArgument`].
    pub fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            parameter,
            reason: reason.into(),
        }
    }

    /// Shorthand for wrapping an arbitrary error as [`Error::Backend`].
    pub fn backend(cause: impl Into<anyhow::Error>) -> Self {
        Error::Backend {
            cause: cause.into(),
        }
    }
}
