//! Beacon Store - the dynamic announcement registry.
//!
//! Nodes announce the services they provide with a TTL; queries return the
//! currently live set, fused with operator-declared static entries. State
//! lives in one column family of a wide-column layout: one row per node,
//! one column per refresh, the column name carrying the expiration
//! timestamp and the write timestamp carrying last-writer-wins order. A
//! background reaper reclaims expired columns; correctness never depends
//! on it running.

pub mod clock;
pub mod codec;
pub mod column;
pub mod durable;
pub mod dynamic;
pub mod memory;
pub mod query;
pub mod schema;
pub mod static_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use column::{Column, ColumnFamily, RowColumns};
pub use durable::RedbColumnFamily;
pub use dynamic::{DynamicStore, ReaperSnapshot, PAGE_SIZE};
pub use memory::MemoryColumnFamily;
pub use query::ServiceQuery;
pub use static_store::{MemoryStaticStore, StaticStore};
