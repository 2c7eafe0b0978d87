//! Logical index types of the platform
//!
//! Each type declares its name, schema version and mapping. Types that
//! offer query shortcuts also expose them through [`HasMacros`].

mod age;
pub mod events;
pub mod organizations;
pub mod stacks;

pub use events::EventIndex;
pub use organizations::OrganizationIndex;
pub use stacks::StackIndex;

use crate::config::ElasticsearchSettings;
use crate::index::{DocumentTransform, IndexDefinition};
use crate::macros::HasMacros;
use serde_json::Value;
use std::sync::Arc;

/// A logical index type
pub trait IndexType: Send + Sync {
    fn name(&self) -> &str;

    /// Current schema version
    fn version(&self) -> u32;

    fn mapping(&self) -> Value;

    /// Definition using the cluster-wide shard and replica settings
    fn definition(&self, settings: &ElasticsearchSettings) -> IndexDefinition {
        IndexDefinition::new(self.name(), self.version())
            .with_mapping(self.mapping())
            .with_shards(settings.number_of_shards)
            .with_replicas(settings.number_of_replicas)
    }

    /// Rewrite applied to documents copied into the current version
    fn migration_transform(&self) -> Option<Arc<dyn DocumentTransform>> {
        None
    }

    /// Query macros this type declares, if any
    fn macros(&self) -> Option<&dyn HasMacros> {
        None
    }
}
