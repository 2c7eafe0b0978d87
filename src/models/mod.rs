pub mod context;
pub mod query;

pub use context::*;
pub use query::*;
