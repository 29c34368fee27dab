//! Configuration: data model, value resolution and loading.

pub mod manager;
pub mod models;
pub mod value_source;
