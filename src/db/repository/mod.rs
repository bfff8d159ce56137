//! Repository layer: table-scoped database operations.
//!
//! Plain functions over a borrowed `Connection`. `SqliteSyncStore` wraps
//! them behind the `SyncStore` trait for the sync engine.

mod practice;
mod snapshot;
mod sync_run;

pub use practice::*;
pub use snapshot::*;
pub use sync_run::*;
