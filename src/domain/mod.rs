//! Domain layer: aggregates, events and value objects
pub mod aggregates;
pub mod events;
pub mod value_objects;
