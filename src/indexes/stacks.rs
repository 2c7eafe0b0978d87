use crate::error::ConflictError;
use crate::indexes::{age, IndexType};
use crate::macros::{HasMacros, MacroInvocation, MacroScope};
use chrono::Utc;
use serde_json::{json, Value};

/// Groups of similar events
#[derive(Debug, Default, Clone, Copy)]
pub struct StackIndex;

impl StackIndex {
    pub const NAME: &'static str = "stacks";
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self
    }
}

impl IndexType for StackIndex {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        Self::VERSION
    }

    fn mapping(&self) -> Value {
        json!({
            "dynamic": false,
            "properties": {
                "id": { "type": "keyword" },
                "organization": { "type": "keyword" },
                "project": { "type": "keyword" },
                "status": { "type": "keyword" },
                "title": { "type": "text" },
                "signature_hash": { "type": "keyword" },
                "tags": { "type": "keyword" },
                "first_occurrence": { "type": "date" },
                "last_occurrence": { "type": "date" },
                "total_occurrences": { "type": "long" },
                "is_hidden": { "type": "boolean" }
            }
        })
    }

    fn macros(&self) -> Option<&dyn HasMacros> {
        Some(self)
    }
}

impl HasMacros for StackIndex {
    fn macro_index_type(&self) -> &str {
        Self::NAME
    }

    fn configure_macros(&self, macros: &mut MacroScope<'_>) -> Result<(), ConflictError> {
        macros
            .replace("is:fixed", "status:fixed")?
            .replace("is:open", "status:open")?
            .replace("is:regressed", "status:regressed")?
            .replace("is:hidden", "is_hidden:true")?
            .register("age:", |invocation: &MacroInvocation<'_>| {
                age::newer_than("first_occurrence", invocation.argument, Utc::now())
            })?;
        Ok(())
    }
}
