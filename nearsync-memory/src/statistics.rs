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

use serde::{Deserialize, Serialize};

/// Cumulative counters of a record store.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    /// get hits
    pub hit: u64,
    /// get misses, including expired and stale reads
    pub miss: u64,
    /// records evicted to make room
    pub evicted: u64,
    /// records reclaimed after expiring
    pub expired: u64,
}

/// Point-in-time statistics of a near cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Creation time of the store, in milliseconds since the unix epoch.
    pub creation_time: u64,
    /// Reads served from the near cache.
    pub hit_count: u64,
    /// Reads not served from the near cache.
    pub miss_count: u64,
    /// Records evicted by the eviction policy.
    pub evicted_count: u64,
    /// Records removed because they expired.
    pub expired_count: u64,
    /// Records currently held.
    pub entry_count: usize,
}

impl Statistics {
    /// Records currently owned by the near cache.
    pub fn owned_entry_count(&self) -> usize {
        self.entry_count
    }

    /// Ratio of hits over all reads, `0.0` before the first read.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            return 0.0;
        }
        self.hit_count as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        assert_eq!(Statistics::default().hit_ratio(), 0.0);
        let stats = Statistics {
            hit_count: 3,
            miss_count: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_ratio(), 0.75);
    }
}
