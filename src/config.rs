//! Environment-driven partition configuration.

use crate::model::Origin;

pub const ALEC_ENDPOINT_VAR: &str = "NEXT_PUBLIC_SUPABASE_URL";
pub const ALEC_KEY_VAR: &str = "NEXT_PUBLIC_SUPABASE_ANON_KEY";
pub const NATE_ENDPOINT_VAR: &str = "NEXT_PUBLIC_NATE_SUPABASE_URL";
pub const NATE_KEY_VAR: &str = "NEXT_PUBLIC_NATE_SUPABASE_ANON_KEY";

/// Endpoint and key for one partition. Either may be empty, in which case the
/// partition is treated as not configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionConfig {
    pub endpoint: String,
    pub key: String,
}

impl PartitionConfig {
    pub fn new(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty() && !self.key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub alec: PartitionConfig,
    pub nate: PartitionConfig,
}

impl Config {
    /// Reads both partitions from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads both partitions through `lookup`; unset names become empty.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).unwrap_or_default();
        Self {
            alec: PartitionConfig::new(read(ALEC_ENDPOINT_VAR), read(ALEC_KEY_VAR)),
            nate: PartitionConfig::new(read(NATE_ENDPOINT_VAR), read(NATE_KEY_VAR)),
        }
    }

    pub fn partition(&self, origin: Origin) -> &PartitionConfig {
        match origin {
            Origin::Alec => &self.alec,
            Origin::Nate => &self.nate,
        }
    }

    pub fn partition_mut(&mut self, origin: Origin) -> &mut PartitionConfig {
        match origin {
            Origin::Alec => &mut self.alec,
            Origin::Nate => &mut self.nate,
        }
    }
}
