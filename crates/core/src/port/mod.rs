// Port Layer - Interfaces for external dependencies

pub mod entity_store;
pub mod kv_store;
pub mod message_bus;
pub mod time_provider;

// Re-exports
pub use entity_store::EntityStore;
pub use kv_store::{FieldMap, JobLock, KvStore};
pub use message_bus::MessageBus;
pub use time_provider::TimeProvider;
