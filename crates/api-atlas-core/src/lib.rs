//! # API Atlas Core
//!
//! Shared logic for API Atlas: data models, OpenAPI/Swagger normalization,
//! endpoint categorization, the store abstraction, and the query engine
//! (endpoint search, schema lookup, example generation, category catalog).
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! runtime-specific dependencies. Storage is reached only through the
//! [`store::Store`] trait.

pub mod categorize;
pub mod error;
pub mod models;
pub mod query;
pub mod schema;
pub mod snippet;
pub mod spec;
pub mod store;
pub mod suggest;

pub use error::{AtlasError, Result};
