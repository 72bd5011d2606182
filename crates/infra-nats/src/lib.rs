// NATS adapters for the Conthesis action engine

pub mod bus;
pub mod entity_store;

pub use bus::NatsBus;
pub use entity_store::NatsEntityStore;
