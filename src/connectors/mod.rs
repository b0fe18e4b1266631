//! External Service Connectors
//!
//! Adapters for the services the deployer talks to besides Postgres and
//! RabbitMQ: the object store holding bundles and webroots, and the analytics
//! tracker.
//!
//! ## Architecture Pattern
//!
//! 1. Define the trait in `{service}/mod.rs` → allows swapping backends in tests
//! 2. Implement the real client in a sibling file
//! 3. `init` picks the implementation from configuration
//! 4. Services hold `Arc<dyn Trait>` and never depend on the client type
//!
//! ## Testing
//!
//! ```ignore
//! let store = Arc::new(MemoryStore::default());
//! let publisher = BundlePublisher::new(pool, store.clone(), mq, tracker, settings);
//! publisher.publish(&job).await?;
//! assert!(store.get("domains/foo.com/meta.json").is_some());
//! ```

pub mod errors;
pub mod object_store;
pub mod tracker;

pub use errors::ConnectorError;
pub use object_store::{Acl, Location, MemoryStore, ObjectStore, S3Store, StorageError, UploadBody};
pub use tracker::{NoopTracker, SegmentTracker, Tracker};

pub use object_store::init as init_object_store;
pub use tracker::init as init_tracker;
