//! Logical index definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned logical index.
///
/// The logical name doubles as the alias clients search against; each
/// version lives in its own physical index named `{name}-v{version}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Logical index name, unique per configuration
    pub name: String,

    /// Schema version, bumped whenever the mapping changes incompatibly
    pub version: u32,

    /// Field mapping sent on index creation
    #[serde(default)]
    pub mapping: Value,

    pub shards: u32,

    pub replicas: u32,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            mapping: Value::Null,
            shards: 1,
            replicas: 0,
        }
    }

    pub fn with_mapping(mut self, mapping: Value) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_shards(mut self, shards: u32) -> Self {
        self.shards = shards;
        self
    }

    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = replicas;
        self
    }

    /// Alias that always points at the serving physical index
    pub fn alias(&self) -> &str {
        &self.name
    }

    /// Physical index for the declared version
    pub fn physical_name(&self) -> String {
        self.physical_name_for(self.version)
    }

    pub fn physical_name_for(&self, version: u32) -> String {
        format!("{}{}", self.physical_prefix(), version)
    }

    /// Prefix shared by every physical version of this index
    pub fn physical_prefix(&self) -> String {
        format!("{}-v", self.name)
    }

    /// Version encoded in a physical index name, if it belongs to this index
    pub fn version_of(&self, physical: &str) -> Option<u32> {
        physical
            .strip_prefix(&self.physical_prefix())
            .and_then(|version| version.parse().ok())
    }
}
