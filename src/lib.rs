//! prism-connector: a generic HTTP data-source connector.
//!
//! The connector ingests OpenAPI v2/v3 documents into a language-neutral
//! operation catalog, exposes the catalog to a host query engine, and
//! translates engine queries and mutations into outbound HTTP calls with
//! authentication, retries, content codecs and multi-server distribution.

pub mod auth;
pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod connector;
pub mod convert;
pub mod error;
pub mod logging;
pub mod projection;
pub mod request;
pub mod schema;

pub use connector::HttpConnector;
pub use error::{Error, ErrorKind};
