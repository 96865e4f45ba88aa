//! Shared helper for the Postgres-backed integration tests (§8): they are
//! skipped, not failed, when Docker is unavailable.

use std::process::Command;

/// True if a Docker daemon is reachable, checked via `docker info`.
/// `testcontainers::clients::Cli` panics on construction when it can't
/// reach a daemon, so callers must check this first and skip instead.
pub fn docker_available() -> bool {
    Command::new("docker").arg("info").output().map(|output| output.status.success()).unwrap_or(false)
}
