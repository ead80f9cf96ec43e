//! Event storage for analytics capture.
//!
//! [`EventStore`] keeps captured events in memory, newest first, bounded
//! by a capacity. [`Persistence`] is the durable side: JSON documents for
//! sources, events, and settings, written atomically under the app data
//! directory (or nowhere, with [`NullPersistence`]).
//!
//! ```
//! use argus_core::Event;
//! use argus_storage::{EventFilter, EventStore};
//!
//! let store = EventStore::with_capacity(100);
//! store.add(vec![Event::new("page_view", "track")]);
//!
//! let hits = store.filtered(&EventFilter::default().with_event("page"));
//! assert_eq!(hits.len(), 1);
//! ```

pub mod error;
pub mod export;
pub mod persist;
pub mod settings;
pub mod store;

pub use error::{Result, StorageError};
pub use export::{export_csv, export_json};
pub use persist::{FilePersistence, NullPersistence, Persistence};
pub use settings::Settings;
pub use store::{
    EventFilter, EventStore, StoreChange, StoreSize, StoreStats, TimeRange, DEFAULT_CAPACITY,
};
