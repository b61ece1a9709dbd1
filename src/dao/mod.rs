//! Data access layer: entities and the poll store abstraction.

pub mod models;
pub mod poll_store;
