//! Storage backends for harvested meetings
//!
//! Persistence goes through the `EventStore` trait. The primary
//! implementation is `SqliteStore`; the SQLite result cache shares its
//! connection setup.

mod sqlite;
mod traits;

pub(crate) use sqlite::open_connection;
pub use sqlite::SqliteStore;
pub use traits::{
    BatchSummary, EventStore, OpenStore, RecordRejection, RefingerprintSummary, StorageError,
    StorageResult, UpsertOutcome,
};
