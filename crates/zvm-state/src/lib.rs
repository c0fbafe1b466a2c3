//! zvm-state — the snapshot cache shared by the refresher and scrape handlers.
//!
//! # Architecture
//!
//! ```text
//! Refresher ──publish()──▶ SnapshotStore ◀──current()── cache-backed collectors
//!                              │
//!                              ├── ArcSwapOption<Snapshot>  (readers, lock-free)
//!                              └── <cache_file>.new → rename → <cache_file>
//! ```
//!
//! Readers always observe a complete snapshot: the old one until the pointer
//! swap, the new one after. File-backed stores persist before swapping, so a
//! failed write never changes what readers see.

pub mod error;
pub mod store;

pub use error::{CacheError, CacheResult};
pub use store::SnapshotStore;
