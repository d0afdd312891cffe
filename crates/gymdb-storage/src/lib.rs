//! Source fetching, raw snapshots and the keyed score store.

pub mod db;
pub mod fetch;
pub mod snapshot;

pub use db::{GymDb, MergeCounts, StoreError, TableCounts};
pub use fetch::{
    is_transient_status, FetchConfig, FetchError, FetchedText, HttpFetcher, RetryPolicy,
};
pub use snapshot::{Snapshot, SnapshotError, SnapshotStore};

pub const CRATE_NAME: &str = "gymdb-storage";
