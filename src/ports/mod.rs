//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the relay core and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `HistoryStore` - One project's run directory, event tables, blobs and status
//! - `HistoryStoreFactory` - Opens stores by project id and discovers existing ones

mod history_store;

pub use history_store::{
    BlobRow, EventRow, HistoryStore, HistoryStoreFactory, RunInfo, StatusMap, StoreError,
    WriteOptions,
};
