use crate::indexes::IndexType;
use serde_json::{json, Value};

/// Tenant records. Declares no query macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrganizationIndex;

impl OrganizationIndex {
    pub const NAME: &'static str = "organizations";
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self
    }
}

impl IndexType for OrganizationIndex {
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
                "name": { "type": "text" },
                "plan_id": { "type": "keyword" },
                "created_utc": { "type": "date" },
                "is_suspended": { "type": "boolean" }
            }
        })
    }
}
