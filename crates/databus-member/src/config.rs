//! Member configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use databus_member::MemberConfigBuilder;
//!
//! let config = MemberConfigBuilder::new("ifmgr")
//!     .queue_capacity(256)
//!     .verify_with_scan(true)
//!     .build()
//!     .expect("valid config");
//! ```

use crate::algorithms::matching::Lookup;
use crate::domain::registration::Category;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Upper bound on the member queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

/// Member configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberConfig {
    /// Member name, used in logs and as the registration owner
    pub name: String,
    /// Capacity of the bounded command queue
    pub queue_capacity: usize,
    /// Look candidates up through the shard index instead of a scan
    pub use_shard_index: bool,
    /// Cross-check shard lookups against a full scan
    pub verify_with_scan: bool,
    /// Category of queries that do not name one
    pub default_category: Category,
    /// Follow-on blocks one prepare handler may enqueue
    pub max_new_blocks: usize,
}

impl Default for MemberConfig {
    fn default() -> Self {
        Self {
            name: "member".to_string(),
            queue_capacity: 1024,
            use_shard_index: true,
            verify_with_scan: false,
            default_category: Category::Any,
            max_new_blocks: 16,
        }
    }
}

impl MemberConfig {
    /// Default configuration under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Small queue, scan verification on.
    pub fn for_testing() -> Self {
        Self {
            name: "test-member".to_string(),
            queue_capacity: 64,
            verify_with_scan: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::QueueCapacity {
                capacity: self.queue_capacity,
                max: MAX_QUEUE_CAPACITY,
            });
        }
        if self.verify_with_scan && !self.use_shard_index {
            return Err(ConfigError::InvalidParameter(
                "verify_with_scan requires use_shard_index".to_string(),
            ));
        }
        Ok(())
    }

    /// Candidate lookup strategy these settings select.
    pub fn lookup(&self) -> Lookup {
        match (self.use_shard_index, self.verify_with_scan) {
            (true, true) => Lookup::Verify,
            (true, false) => Lookup::Shard,
            (false, _) => Lookup::Scan,
        }
    }
}

/// Builder for MemberConfig with validation
#[derive(Default)]
pub struct MemberConfigBuilder {
    name: String,
    queue_capacity: Option<usize>,
    use_shard_index: Option<bool>,
    verify_with_scan: Option<bool>,
    default_category: Option<Category>,
    max_new_blocks: Option<usize>,
}

impl MemberConfigBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    pub fn use_shard_index(mut self, enabled: bool) -> Self {
        self.use_shard_index = Some(enabled);
        self
    }

    pub fn verify_with_scan(mut self, enabled: bool) -> Self {
        self.verify_with_scan = Some(enabled);
        self
    }

    pub fn default_category(mut self, category: Category) -> Self {
        self.default_category = Some(category);
        self
    }

    pub fn max_new_blocks(mut self, max: usize) -> Self {
        self.max_new_blocks = Some(max);
        self
    }

    /// Build the MemberConfig, validating all parameters
    pub fn build(self) -> Result<MemberConfig, ConfigError> {
        let defaults = MemberConfig::default();
        let config = MemberConfig {
            name: self.name,
            queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
            use_shard_index: self.use_shard_index.unwrap_or(defaults.use_shard_index),
            verify_with_scan: self.verify_with_scan.unwrap_or(defaults.verify_with_scan),
            default_category: self.default_category.unwrap_or(defaults.default_category),
            max_new_blocks: self.max_new_blocks.unwrap_or(defaults.max_new_blocks),
        };
        config.validate()?;
        Ok(config)
    }
}
