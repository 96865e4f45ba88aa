//! Configuration recognized by the storage engine (§6).
//!
//! Host applications own the environment-variable/CLI surface; this module
//! only validates the values once they arrive, the way the teacher crate
//! validates aggregate/type names before using them to namespace tables.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,49}$").expect("valid regex"))
}

/// Validated configuration for a [`crate::store::EventStore`] instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespaces the four backing tables; matches `^[A-Za-z_][A-Za-z0-9_]{0,49}$`.
    pub store_name: String,
    /// Backend-specific opaque connection string.
    pub connection_string: String,
    /// Directory cold archive segments are written to and read from.
    /// Created if missing; required whenever any stream's retention mode
    /// is not [`crate::model::RetentionMode::Default`].
    pub archive_directory: PathBuf,
    /// Schema name for relational backends that support schemas; matches
    /// the same identifier pattern as `store_name`.
    pub schema_name: Option<String>,
}

impl Config {
    /// Validate a fully-populated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `store_name` or `schema_name`
    /// do not match `^[A-Za-z_][A-Za-z0-9_]{0,49}$`, or if
    /// `connection_string` is empty.
    pub fn validate(
        store_name: impl Into<String>,
        connection_string: impl Into<String>,
        archive_directory: impl Into<PathBuf>,
        schema_name: Option<String>,
    ) -> Result<Self> {
        let store_name = store_name.into();
        let connection_string = connection_string.into();

        if !identifier_pattern().is_match(&store_name) {
            return Err(Error::invalid(
                "store_name",
                format!("'{store_name}' does not match ^[A-Za-z_][A-Za-z0-9_]{{0,49}}$"),
            ));
        }
        if connection_string.is_empty() {
            return Err(Error::invalid("connection_string", "must not be empty"));
        }
        if let Some(schema) = &schema_name {
            if !identifier_pattern().is_match(schema) {
                return Err(Error::invalid(
                    "schema_name",
                    format!("'{schema}' does not match ^[A-Za-z_][A-Za-z0-9_]{{0,49}}$"),
                ));
            }
        }

        Ok(Self {
            store_name,
            connection_string,
            archive_directory: archive_directory.into(),
            schema_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_store_name_with_dash() {
        let err = Config::validate("bad-name", "postgres://", "/tmp/archive", None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { parameter: "store_name", .. }));
    }

    #[test]
    fn accepts_well_formed_identifiers() {
        let cfg = Config::validate("orders_es", "postgres://localhost", "/tmp/archive", Some("public".into()))
            .expect("should validate");
        assert_eq!(cfg.store_name, "orders_es");
    }

    #[test]
    fn rejects_empty_connection_string() {
        let err = Config::validate("orders_es", "", "/tmp/archive", None).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { parameter: "connection_string", .. }));
    }
}
