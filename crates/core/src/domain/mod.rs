// Domain Layer - Pure business logic and entities

pub mod action;
pub mod status;

// Re-exports
pub use action::{
    decode_variables, encode_variables, Action, ActionProperty, ActionSource, ActionTrigger,
    DataFormat, Meta, PropertySource,
};
pub use status::Status;
