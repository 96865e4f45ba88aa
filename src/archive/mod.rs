//! Cold storage: segment files, the registry of which are active, the
//! commit transaction, and the coordinator driving retention (§4.2-§4.5).

pub mod backend;
pub mod cold;
pub mod coordinator;
pub mod registry;

pub use backend::{ArchiveBackend, ArchiveTransaction};
pub use cold::{ColdArchive, FileArchive};
pub use coordinator::{ArchiveCoordinator, ArchiveOutcome};
pub use registry::SegmentRegistry;
