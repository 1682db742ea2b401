//! File-based ephemeral object store with TTL expiration
//!
//! Stores uploaded blobs on disk under collision-free public names, tracks
//! their expiry in an in-memory index, evicts lazily on read and reclaims
//! storage through a background sweep.

pub mod clock;
pub mod error;
mod names;
mod store;
mod sweeper;
pub mod ttl;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, StoreError};
pub use names::{sanitize_name, NameResolver, MAX_DISAMBIGUATION_ATTEMPTS};
pub use store::{BlobHandle, EphemeralStore};
pub use sweeper::{Sweeper, SweeperHandle};
pub use ttl::{resolve_expiration, TtlSelector};
pub use types::{FileRecord, StagedUpload, StoreStats, StoredFile, SweepReport};
