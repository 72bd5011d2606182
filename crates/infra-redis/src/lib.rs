// Redis adapter for the Conthesis action engine

pub mod kv_store;

pub use kv_store::{connect, RedisKvStore};
