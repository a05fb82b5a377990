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

//! Sampled eviction.
//!
//! Instead of maintaining an ordered index over all records, each eviction samples a few records, merges the
//! live ones into a bounded candidate pool that survives across evictions, and evicts the head of the pool. The
//! result approximates the configured policy.

use std::cmp::Ordering;

use hashbrown::HashMap;
use itertools::Itertools;
use nearsync_common::{
    code::KeyData,
    config::{EvictionPolicy, NearCacheConfig},
};
use rand::seq::{IteratorRandom, SliceRandom};

use crate::record::Record;

/// Orders eviction candidates, the first one is evicted first.
pub type Comparator<V> = fn(&Record<V>, &Record<V>) -> Ordering;

fn lru<V>(a: &Record<V>, b: &Record<V>) -> Ordering {
    a.last_access_time().cmp(&b.last_access_time())
}

fn lfu<V>(a: &Record<V>, b: &Record<V>) -> Ordering {
    a.access_hit_count().cmp(&b.access_hit_count())
}

#[derive(Debug)]
enum PoolOrder<V> {
    Sorted(Comparator<V>),
    Shuffled,
}

/// Result of an eviction check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionOutcome {
    /// The store is below the size bound, or eviction is disabled.
    NotRequired,
    /// Expired records were found in the sample and reclaimed instead of evicting a live record.
    Expired(Vec<KeyData>),
    /// A live record was evicted.
    Evicted(KeyData),
    /// Eviction was required but there was nothing to evict.
    NoCandidate,
}

/// Sampled eviction state of a record store.
#[derive(Debug)]
pub struct SampledEviction<V> {
    order: Option<PoolOrder<V>>,
    max_size: usize,
    sampling_count: usize,
    pool_size: usize,
    max_idle_seconds: u64,

    pool: Vec<KeyData>,
}

impl<V> SampledEviction<V> {
    /// Create the eviction state from the near cache config.
    pub fn new(config: &NearCacheConfig) -> Self {
        let order = match config.eviction_policy {
            EvictionPolicy::Lru => Some(PoolOrder::Sorted(lru::<V> as Comparator<V>)),
            EvictionPolicy::Lfu => Some(PoolOrder::Sorted(lfu::<V> as Comparator<V>)),
            EvictionPolicy::Random => Some(PoolOrder::Shuffled),
            EvictionPolicy::None => None,
        };
        Self {
            order,
            max_size: config.eviction_max_size,
            sampling_count: config.eviction_sampling_count,
            pool_size: config.eviction_sampling_pool_size,
            max_idle_seconds: config.max_idle_seconds,
            pool: Vec::with_capacity(config.eviction_sampling_pool_size + config.eviction_sampling_count),
        }
    }

    /// Whether inserting one more record requires an eviction first.
    pub fn is_required(&self, len: usize) -> bool {
        self.order.is_some() && len >= self.max_size
    }

    /// Make room for one record if required.
    ///
    /// Removed records are taken out of `records`; the caller accounts for them.
    pub fn evict_if_required(&mut self, records: &mut HashMap<KeyData, Record<V>>, now: u64) -> EvictionOutcome {
        if !self.is_required(records.len()) {
            return EvictionOutcome::NotRequired;
        }
        let Some(order) = self.order.as_ref() else {
            return EvictionOutcome::NotRequired;
        };

        let mut rng = rand::rng();

        let mut sample = records.keys().cloned().choose_multiple(&mut rng, self.sampling_count);
        sample.shuffle(&mut rng);

        let (expired, live): (Vec<_>, Vec<_>) = sample
            .into_iter()
            .partition(|key| records[key].is_expired(now, self.max_idle_seconds));
        if !expired.is_empty() {
            for key in expired.iter() {
                records.remove(key);
            }
            self.pool.retain(|key| records.contains_key(key));
            tracing::trace!("[eviction]: reclaimed {} expired records", expired.len());
            return EvictionOutcome::Expired(expired);
        }

        // Candidates may have been removed or replaced since they entered the pool.
        self.pool.retain(|key| records.contains_key(key));
        self.pool.extend(live);
        self.pool = std::mem::take(&mut self.pool).into_iter().unique().collect();

        match order {
            PoolOrder::Sorted(compare) => self.pool.sort_by(|a, b| compare(&records[a], &records[b])),
            PoolOrder::Shuffled => self.pool.shuffle(&mut rng),
        }
        self.pool.truncate(self.pool_size);

        if self.pool.is_empty() {
            return EvictionOutcome::NoCandidate;
        }
        let victim = self.pool.remove(0);
        records.remove(&victim);
        tracing::trace!("[eviction]: evicted record {:?}", victim);
        EvictionOutcome::Evicted(victim)
    }

    /// Forget all candidates.
    pub fn clear(&mut self) {
        self.pool.clear();
    }

    /// Current candidate pool, head first.
    pub fn pool(&self) -> &[KeyData] {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::record::StoredValue;

    fn key(i: u8) -> KeyData {
        Bytes::from(vec![i])
    }

    fn records(n: u8) -> HashMap<KeyData, Record<u64>> {
        (0..n)
            .map(|i| (key(i), Record::new(StoredValue::Object(i as u64), 1000 + i as u64, None)))
            .collect()
    }

    fn config(policy: EvictionPolicy) -> NearCacheConfig {
        NearCacheConfig::default()
            .with_eviction_policy(policy)
            .with_eviction_max_size(4)
            .with_eviction_sampling_count(8)
            .with_eviction_sampling_pool_size(2)
    }

    #[test]
    fn test_not_required() {
        let mut rs = records(3);
        let mut eviction = SampledEviction::new(&config(EvictionPolicy::Lru));
        assert_eq!(eviction.evict_if_required(&mut rs, 2000), EvictionOutcome::NotRequired);

        let mut rs = records(10);
        let mut eviction = SampledEviction::new(&config(EvictionPolicy::None));
        assert_eq!(eviction.evict_if_required(&mut rs, 2000), EvictionOutcome::NotRequired);
        assert_eq!(rs.len(), 10);
    }

    #[test]
    fn test_lru_pool_carries_over() {
        let mut rs = records(4);
        let mut eviction = SampledEviction::new(&config(EvictionPolicy::Lru));

        assert_eq!(eviction.evict_if_required(&mut rs, 2000), EvictionOutcome::Evicted(key(0)));
        // The pool was truncated to 2 candidates and the head was evicted.
        assert_eq!(eviction.pool(), &[key(1)]);

        rs.insert(key(9), Record::new(StoredValue::Object(9), 1900, None));
        assert_eq!(eviction.evict_if_required(&mut rs, 2000), EvictionOutcome::Evicted(key(1)));
        assert_eq!(eviction.pool(), &[key(2)]);
        assert_eq!(rs.len(), 3);
    }

    #[test]
    fn test_lfu() {
        let mut rs = records(4);
        for (i, hits) in [(0u8, 5), (1, 1), (2, 3), (3, 2)] {
            let record = rs.get_mut(&key(i)).unwrap();
            for _ in 0..hits {
                record.touch(1500);
            }
        }
        let mut eviction = SampledEviction::new(&config(EvictionPolicy::Lfu));
        assert_eq!(eviction.evict_if_required(&mut rs, 2000), EvictionOutcome::Evicted(key(1)));
        assert_eq!(eviction.pool(), &[key(3)]);
    }

    #[test]
    fn test_random() {
        let mut rs = records(4);
        let mut eviction = SampledEviction::new(&config(EvictionPolicy::Random));
        match eviction.evict_if_required(&mut rs, 2000) {
            EvictionOutcome::Evicted(victim) => assert!(!rs.contains_key(&victim)),
            outcome => panic!("unexpected outcome: {outcome:?}"),
        }
        assert_eq!(rs.len(), 3);
    }

    #[test]
    fn test_expired_before_evicted() {
        let mut rs = records(3);
        rs.insert(key(7), Record::new(StoredValue::Object(7), 1000, Some(1)));
        let mut eviction = SampledEviction::new(&config(EvictionPolicy::Lru));

        assert_eq!(
            eviction.evict_if_required(&mut rs, 5000),
            EvictionOutcome::Expired(vec![key(7)])
        );
        assert_eq!(rs.len(), 3);
        assert!(rs.contains_key(&key(0)));
        assert!(eviction.pool().is_empty());
    }

    #[test]
    fn test_stale_candidates_are_dropped() {
        let mut rs = records(4);
        let mut eviction = SampledEviction::new(&config(EvictionPolicy::Lru));
        assert_eq!(eviction.evict_if_required(&mut rs, 2000), EvictionOutcome::Evicted(key(0)));
        assert_eq!(eviction.pool(), &[key(1)]);

        // Candidate 1 is invalidated behind the pool's back.
        rs.remove(&key(1));
        rs.insert(key(8), Record::new(StoredValue::Object(8), 3000, None));
        rs.insert(key(9), Record::new(StoredValue::Object(9), 3000, None));
        assert_eq!(eviction.evict_if_required(&mut rs, 4000), EvictionOutcome::Evicted(key(2)));
    }

    #[test]
    fn test_zero_max_size_on_empty_store() {
        let mut rs = records(0);
        let mut eviction = SampledEviction::new(&config(EvictionPolicy::Lru).with_eviction_max_size(0));
        assert_eq!(eviction.evict_if_required(&mut rs, 2000), EvictionOutcome::NoCandidate);
    }
}
