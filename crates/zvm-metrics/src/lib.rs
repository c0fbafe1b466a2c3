//! zvm-metrics — collectors, exposition, and the snapshot refresher.
//!
//! # Architecture
//!
//! ```text
//! Refresher (background task)
//!   └── refresh_once() → DataSource::fetch(HostInfo) × N → SnapshotStore::publish
//!
//! CollectorSet (per scrape)
//!   ├── HostCollector        → DataSource::fetch(HostInfo), bounded by timeout
//!   ├── GuestsCollector      → DataSource::fetch(GuestList), bounded by timeout
//!   └── CachedHostCollector  → SnapshotStore::current() + cache meta-metrics
//!         └── encode() → Prometheus text, concatenated in order
//! ```

pub mod collector;
pub mod error;
pub mod exposition;
pub mod refresher;

pub use collector::{Collector, CollectorDeps, CollectorSet};
pub use error::{CollectionError, RefreshError};
pub use exposition::{CONTENT_TYPE, MetricSample};
pub use refresher::Refresher;
