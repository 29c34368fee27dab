//! Request planning: argument binding and parameter encoding.

pub mod builder;
pub mod models;
pub mod parameter;
