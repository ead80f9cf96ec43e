//! Capture pipeline for Argus.
//!
//! Turns observed network requests into normalized analytics events.
//! Request bodies are decoded by [`decoder`], interpreted per source by
//! [`parsers`], and stamped and stored by the [`coordinator`]. A
//! [`poller`] can additionally pull batches from a remote collector.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use argus_capture::{CaptureBody, CaptureCoordinator, CaptureRequest};
//! use argus_core::SourceRegistry;
//! use argus_storage::{EventStore, NullPersistence};
//! use serde_json::json;
//!
//! let coordinator = CaptureCoordinator::new(
//!     Arc::new(SourceRegistry::with_defaults()),
//!     Arc::new(EventStore::new()),
//!     Arc::new(NullPersistence),
//! );
//!
//! let request = CaptureRequest::new("https://api.segment.io/v1/track")
//!     .with_body(CaptureBody::Structured(json!({"event": "signup"})));
//! assert_eq!(coordinator.handle_request(&request), 1);
//! ```

pub mod coordinator;
pub mod decoder;
pub mod parsers;
pub mod poller;

pub use coordinator::{CaptureCoordinator, CaptureRequest};
pub use decoder::{decode, CaptureBody, DecodedPayload, RawChunk};
pub use poller::{RemotePoller, DEFAULT_POLL_INTERVAL};
