//! The storage facade (spec.md §1/§4.3): binds the series-name registry,
//! the durable input log, and the query pipeline into a single recoverable
//! engine. `BlockStore`/`ColumnStore`/`MetadataStore` model the external
//! collaborators this crate does not implement in full.

mod config;
mod error;
mod pipeline;
mod session;
mod storage;
mod traits;

pub use config::StorageConfig;
pub use error::Error;
pub use session::Session;
pub use storage::{Storage, StorageStats};
pub use traits::{
    BlockStore, ColumnStore, InMemoryBlockStore, JsonColumnStore, JsonMetadataStore,
    MetadataStore, RescueAddrs,
};

pub use tsdb_query::{Cursor, VecCursor};
