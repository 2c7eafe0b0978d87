//! Query composition
//!
//! A request's raw query text goes through three stages:
//!
//! ```text
//! raw text ──► MacroRegistry::expand ──► QueryParser::parse ──► QueryBuilderRegistry::build
//!              (index-type shortcuts)    (base clause)          (scope + security filters)
//! ```
//!
//! A failure at any stage is returned as a [`QueryCompositionError`] tagged
//! with the stage.

mod compose;
mod error;
mod parser;

pub use compose::{QueryComposer, TargetedQuery};
pub use error::{CompositionResult, CompositionStage, QueryCompositionError};
pub use parser::{ParseError, QueryParser, TermQueryParser};
