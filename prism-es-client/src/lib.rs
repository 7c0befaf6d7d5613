//! HTTP engine and command line front-end for `prism-es-query`
//!
//! [`HttpEngine`] implements [`prism_es_query::SearchEngine`] against the
//! Elasticsearch REST API; [`Config`] holds connection, execution and
//! logging settings loaded from TOML.

pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;

pub use config::{Config, ConnectionConfig, LoggingConfig};
pub use error::{ClientError, Result};
pub use http::HttpEngine;
