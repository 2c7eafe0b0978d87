//! Query macros scoped to index types
//!
//! Index types declare textual shortcuts (for example `is:fixed` or `age:7d`)
//! through [`HasMacros`]. The [`MacroRegistry`] rewrites those tokens into
//! plain query text before the query is parsed. Expansion is a single pass:
//! the text a rule produces is never expanded again.

mod error;
mod registry;
pub(crate) mod scanner;

pub use error::MacroExpansionError;
pub use registry::{ExpansionRule, HasMacros, MacroInvocation, MacroRegistry, MacroScope};
