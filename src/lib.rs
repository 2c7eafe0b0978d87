//! Query composition and index lifecycle for the event platform's search layer.
//!
//! - [`macros`]: per-index-type query shortcuts such as `is:fixed`
//! - [`builders`]: the ordered, append-only chain of scope filters
//! - [`composer`]: expand, parse and build one request
//! - [`index`]: versioned physical indexes behind aliases, and reindexing
//! - [`indexes`]: the platform's index types
//! - [`configuration`]: wires all of the above together

pub mod builders;
pub mod composer;
pub mod config;
pub mod configuration;
pub mod error;
pub mod index;
pub mod indexes;
pub mod macros;
pub mod metrics;
pub mod models;

pub use configuration::SearchConfiguration;
pub use error::{AppError, ConflictError, Result};
