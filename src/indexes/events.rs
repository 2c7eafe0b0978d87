use crate::error::ConflictError;
use crate::index::DocumentTransform;
use crate::indexes::{age, IndexType};
use crate::macros::{HasMacros, MacroInvocation, MacroScope};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// Individual occurrences of errors, logs and feature usages.
///
/// Version 2 stores `tags` as an array; version 1 stored a comma-separated
/// string.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventIndex;

impl EventIndex {
    pub const NAME: &'static str = "events";
    pub const VERSION: u32 = 2;

    pub fn new() -> Self {
        Self
    }
}

impl IndexType for EventIndex {
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
                "stack": { "type": "keyword" },
                "type": { "type": "keyword" },
                "source": { "type": "keyword" },
                "message": { "type": "text" },
                "tags": { "type": "keyword" },
                "date": { "type": "date" },
                "is_first_occurrence": { "type": "boolean" },
                "is_fixed": { "type": "boolean" },
                "is_hidden": { "type": "boolean" },
                "count": { "type": "integer" }
            }
        })
    }

    fn migration_transform(&self) -> Option<Arc<dyn DocumentTransform>> {
        Some(Arc::new(SplitTags))
    }

    fn macros(&self) -> Option<&dyn HasMacros> {
        Some(self)
    }
}

impl HasMacros for EventIndex {
    fn macro_index_type(&self) -> &str {
        Self::NAME
    }

    fn configure_macros(&self, macros: &mut MacroScope<'_>) -> Result<(), ConflictError> {
        macros
            .replace("is:fixed", "is_fixed:true")?
            .replace("is:hidden", "is_hidden:true")?
            .replace("is:first", "is_first_occurrence:true")?
            .replace("is:error", "type:error")?
            .replace("is:log", "type:log")?
            .register("age:", |invocation: &MacroInvocation<'_>| {
                age::newer_than("date", invocation.argument, Utc::now())
            })?;
        Ok(())
    }
}

/// Converts version 1 comma-separated `tags` into an array
#[derive(Debug, Default, Clone, Copy)]
pub struct SplitTags;

impl DocumentTransform for SplitTags {
    fn transform(&self, mut document: Value) -> anyhow::Result<Value> {
        let Some(fields) = document.as_object_mut() else {
            anyhow::bail!("event document is not an object");
        };

        if let Some(Value::String(tags)) = fields.get("tags") {
            let tags: Vec<Value> = tags
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(|tag| Value::String(tag.to_string()))
                .collect();
            fields.insert("tags".to_string(), Value::Array(tags));
        }

        Ok(document)
    }
}
