// Copyright 2026 nearsync Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configurations of the near cache and of the anti-entropy repairing task.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Eviction policy of a near cache.
///
/// Eviction is sampled: only an approximation of the exact policy order is maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Evict the least recently accessed entry first.
    Lru,
    /// Evict the least frequently accessed entry first.
    Lfu,
    /// Evict an arbitrary entry.
    Random,
    /// Never evict. The size bound is ignored.
    #[default]
    None,
}

/// How values are kept in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InMemoryFormat {
    /// Keep the decoded value. Reads clone it.
    Object,
    /// Keep the encoded bytes. Reads decode them.
    #[default]
    Binary,
}

/// Near cache config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearCacheConfig {
    /// Entries not accessed for longer than this are expired. `0` disables idle expiration.
    pub max_idle_seconds: u64,
    /// Entries older than this are expired. `0` means entries never expire by age.
    pub time_to_live_seconds: u64,
    /// In-memory format of the cached values.
    pub in_memory_format: InMemoryFormat,
    /// Eviction policy applied when the store reaches `eviction_max_size`.
    pub eviction_policy: EvictionPolicy,
    /// Entry count that triggers eviction.
    pub eviction_max_size: usize,
    /// Number of records sampled on each eviction.
    pub eviction_sampling_count: usize,
    /// Capacity of the candidate pool carried across evictions.
    pub eviction_sampling_pool_size: usize,
    /// Whether the cluster pushes invalidations for this near cache.
    pub invalidate_on_change: bool,
    /// Treat reads of records cached under a superseded authority, or below the stale boundary, as misses.
    pub check_stale_reads: bool,
}

impl Default for NearCacheConfig {
    fn default() -> Self {
        Self {
            max_idle_seconds: 0,
            time_to_live_seconds: 0,
            in_memory_format: InMemoryFormat::default(),
            eviction_policy: EvictionPolicy::default(),
            eviction_max_size: i32::MAX as usize,
            eviction_sampling_count: 8,
            eviction_sampling_pool_size: 16,
            invalidate_on_change: true,
            check_stale_reads: false,
        }
    }
}

impl NearCacheConfig {
    /// Set the max idle seconds.
    pub fn with_max_idle_seconds(mut self, max_idle_seconds: u64) -> Self {
        self.max_idle_seconds = max_idle_seconds;
        self
    }

    /// Set the time-to-live seconds.
    pub fn with_time_to_live_seconds(mut self, time_to_live_seconds: u64) -> Self {
        self.time_to_live_seconds = time_to_live_seconds;
        self
    }

    /// Set the in-memory format.
    pub fn with_in_memory_format(mut self, in_memory_format: InMemoryFormat) -> Self {
        self.in_memory_format = in_memory_format;
        self
    }

    /// Set the eviction policy.
    pub fn with_eviction_policy(mut self, eviction_policy: EvictionPolicy) -> Self {
        self.eviction_policy = eviction_policy;
        self
    }

    /// Set the entry count that triggers eviction.
    pub fn with_eviction_max_size(mut self, eviction_max_size: usize) -> Self {
        self.eviction_max_size = eviction_max_size;
        self
    }

    /// Set the eviction sampling count.
    pub fn with_eviction_sampling_count(mut self, eviction_sampling_count: usize) -> Self {
        self.eviction_sampling_count = eviction_sampling_count;
        self
    }

    /// Set the eviction candidate pool size.
    pub fn with_eviction_sampling_pool_size(mut self, eviction_sampling_pool_size: usize) -> Self {
        self.eviction_sampling_pool_size = eviction_sampling_pool_size;
        self
    }

    /// Set whether the near cache is invalidated on remote changes.
    pub fn with_invalidate_on_change(mut self, invalidate_on_change: bool) -> Self {
        self.invalidate_on_change = invalidate_on_change;
        self
    }

    /// Enable or disable the strict stale read check on `get`.
    pub fn with_check_stale_reads(mut self, check_stale_reads: bool) -> Self {
        self.check_stale_reads = check_stale_reads;
        self
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<()> {
        if self.eviction_policy == EvictionPolicy::None {
            return Ok(());
        }
        if self.eviction_sampling_count == 0 {
            return Err(Error::config("eviction sampling count must be positive")
                .with_context("eviction_policy", format!("{:?}", self.eviction_policy)));
        }
        if self.eviction_sampling_pool_size == 0 {
            return Err(Error::config("eviction sampling pool size must be positive")
                .with_context("eviction_policy", format!("{:?}", self.eviction_policy)));
        }
        Ok(())
    }
}

/// Config of the anti-entropy repairing task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairingConfig {
    /// Interval between two reconciliations. `0` disables reconciliation.
    pub reconciliation_interval_seconds: u64,
    /// Smallest accepted non-zero reconciliation interval.
    pub min_reconciliation_interval_seconds: u64,
    /// Summed missed sequences of one object that widen its stale boundaries on the next tick.
    pub max_tolerated_miss_count: u64,
}

impl Default for RepairingConfig {
    fn default() -> Self {
        Self {
            reconciliation_interval_seconds: 60,
            min_reconciliation_interval_seconds: 30,
            max_tolerated_miss_count: 10,
        }
    }
}

impl RepairingConfig {
    /// Set the reconciliation interval seconds.
    pub fn with_reconciliation_interval_seconds(mut self, seconds: u64) -> Self {
        self.reconciliation_interval_seconds = seconds;
        self
    }

    /// Set the reconciliation interval floor.
    pub fn with_min_reconciliation_interval_seconds(mut self, seconds: u64) -> Self {
        self.min_reconciliation_interval_seconds = seconds;
        self
    }

    /// Set the max tolerated miss count.
    pub fn with_max_tolerated_miss_count(mut self, count: u64) -> Self {
        self.max_tolerated_miss_count = count;
        self
    }

    /// Validated reconciliation interval.
    ///
    /// Returns `None` if reconciliation is disabled, and an [`ErrorKind::Config`](crate::error::ErrorKind::Config)
    /// error if the interval is below the floor.
    pub fn reconciliation_interval(&self) -> Result<Option<Duration>> {
        let seconds = self.reconciliation_interval_seconds;
        if seconds == 0 {
            return Ok(None);
        }
        if seconds < self.min_reconciliation_interval_seconds {
            return Err(Error::config(
                "reconciliation interval must be at least the configured floor if not 0, \
                 configuring 0 seconds disables reconciliation",
            )
            .with_context("interval_seconds", seconds)
            .with_context("min_interval_seconds", self.min_reconciliation_interval_seconds));
        }
        Ok(Some(Duration::from_secs(seconds)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_reconciliation_interval() {
        let config = RepairingConfig::default();
        assert_eq!(config.reconciliation_interval().unwrap(), Some(Duration::from_secs(60)));

        let config = config.with_reconciliation_interval_seconds(0);
        assert_eq!(config.reconciliation_interval().unwrap(), None);

        let config = config.with_reconciliation_interval_seconds(30);
        assert_eq!(config.reconciliation_interval().unwrap(), Some(Duration::from_secs(30)));

        let config = config.with_reconciliation_interval_seconds(29);
        let err = config.reconciliation_interval().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_near_cache_config_validate() {
        assert!(NearCacheConfig::default().validate().is_ok());

        // Sampling settings are irrelevant without eviction.
        let config = NearCacheConfig::default().with_eviction_sampling_count(0);
        assert!(config.validate().is_ok());

        let config = config.with_eviction_policy(EvictionPolicy::Lru);
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Config);

        let config = NearCacheConfig::default()
            .with_eviction_policy(EvictionPolicy::Lfu)
            .with_eviction_sampling_pool_size(0);
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::Config);
    }
}
