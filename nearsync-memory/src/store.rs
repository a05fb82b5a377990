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

use std::{fmt::Debug, sync::Arc};

use hashbrown::HashMap;
use nearsync_common::{
    clock::{Clock, SystemClock},
    code::{KeyData, Value},
    config::NearCacheConfig,
    error::Result,
};
use parking_lot::Mutex;

use crate::{
    eviction::{EvictionOutcome, SampledEviction},
    record::{Record, RecordState, ReservationId, StoredValue},
    stale::StaleReadDetector,
    statistics::{Counters, Statistics},
};

/// Target of invalidations, implemented by record stores of any value type.
pub trait Invalidate: Send + Sync + Debug + 'static {
    /// Remove the record of `key`, if any.
    fn invalidate(&self, key: &[u8]);

    /// Remove all records.
    fn clear(&self);
}

struct RecordStoreInner<V> {
    records: HashMap<KeyData, Record<V>>,
    eviction: SampledEviction<V>,
    counters: Counters,
    detector: Option<Arc<dyn StaleReadDetector>>,
    next_reservation: u64,
}

impl<V> RecordStoreInner<V> {
    fn evict_if_required(&mut self, now: u64) {
        match self.eviction.evict_if_required(&mut self.records, now) {
            EvictionOutcome::NotRequired | EvictionOutcome::NoCandidate => {}
            EvictionOutcome::Expired(keys) => self.counters.expired += keys.len() as u64,
            EvictionOutcome::Evicted(_) => self.counters.evicted += 1,
        }
    }

    fn stamp(&self, record: &mut Record<V>, key: &[u8]) {
        if let Some(detector) = self.detector.as_ref() {
            record.set_stamp(detector.stamp(key));
        }
    }
}

/// The record store of a near cache.
///
/// Holds cached records by their key data, expires them by TTL and idle time, and evicts them with a sampled
/// policy when the configured size bound is reached.
pub struct RecordStore<V> {
    inner: Mutex<RecordStoreInner<V>>,
    config: NearCacheConfig,
    clock: Arc<dyn Clock>,
    creation_time: u64,
}

impl<V> Debug for RecordStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("config", &self.config)
            .field("creation_time", &self.creation_time)
            .finish()
    }
}

impl<V> RecordStore<V>
where
    V: Value,
{
    /// Create a record store driven by the system clock.
    pub fn new(config: NearCacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a record store driven by the given clock.
    pub fn with_clock(config: NearCacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let inner = RecordStoreInner {
            records: HashMap::new(),
            eviction: SampledEviction::new(&config),
            counters: Counters::default(),
            detector: None,
            next_reservation: 0,
        };
        let creation_time = clock.now_millis();
        Ok(Self {
            inner: Mutex::new(inner),
            config,
            clock,
            creation_time,
        })
    }

    /// Get the config of the store.
    pub fn config(&self) -> &NearCacheConfig {
        &self.config
    }

    /// Install the stale read detector.
    ///
    /// Records put afterwards are stamped with their partition's invalidation metadata.
    pub fn set_stale_read_detector(&self, detector: Arc<dyn StaleReadDetector>) {
        self.inner.lock().detector = Some(detector);
    }

    /// Cache `value` for `key`, replacing any previous record.
    ///
    /// `ttl_seconds` overrides the configured time-to-live.
    pub fn put(&self, key: KeyData, value: &V, ttl_seconds: Option<u64>) -> Result<()> {
        let value = StoredValue::new(value, self.config.in_memory_format)?;
        let ttl_seconds = ttl_seconds.or(Some(self.config.time_to_live_seconds));

        let mut inner = self.inner.lock();
        let now = self.clock.now_millis();

        inner.evict_if_required(now);

        let mut record = Record::new(value, now, ttl_seconds);
        inner.stamp(&mut record, &key);
        inner.records.insert(key, record);
        Ok(())
    }

    /// Get the cached value of `key`.
    ///
    /// Expired records, and stale records if stale read checks are enabled, are removed and reported as misses.
    pub fn get(&self, key: &[u8]) -> Result<Option<V>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = self.clock.now_millis();

        let Some(record) = inner.records.get_mut(key) else {
            inner.counters.miss += 1;
            return Ok(None);
        };
        let Some(value) = record.value() else {
            // Reserved by a read-through that has not published yet.
            inner.counters.miss += 1;
            return Ok(None);
        };

        if self.config.check_stale_reads {
            if let Some(detector) = inner.detector.as_ref() {
                if detector.is_stale_read(key, &record.stamp()) {
                    inner.records.remove(key);
                    inner.counters.miss += 1;
                    return Ok(None);
                }
            }
        }

        if record.is_expired(now, self.config.max_idle_seconds) {
            inner.records.remove(key);
            inner.counters.expired += 1;
            inner.counters.miss += 1;
            return Ok(None);
        }

        let value = value.decode()?;
        record.touch(now);
        inner.counters.hit += 1;
        Ok(Some(value))
    }

    /// Remove the record of `key`, if any.
    pub fn invalidate(&self, key: &[u8]) {
        self.inner.lock().records.remove(key);
    }

    /// Remove all records. Statistics are kept.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.records.clear();
        inner.eviction.clear();
    }

    /// Reserve `key` for a read-through.
    ///
    /// Returns `None` if another reservation holds the key. A missing record is replaced by a value-less
    /// placeholder, so an invalidation arriving before [`Self::try_publish_reserved`] removes the placeholder and
    /// the value fetched before the invalidation is never cached.
    pub fn try_reserve_for_update(&self, key: KeyData) -> Option<ReservationId> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let id = ReservationId(inner.next_reservation);
        inner.next_reservation += 1;

        if let Some(record) = inner.records.get_mut(&key) {
            return match record.state() {
                RecordState::Readable => {
                    record.set_state(RecordState::Reserved(id));
                    Some(id)
                }
                RecordState::Reserved(_) => None,
            };
        }

        let now = self.clock.now_millis();
        inner.evict_if_required(now);
        let record = Record::reserved(now, Some(self.config.time_to_live_seconds), id);
        inner.records.insert(key, record);
        Some(id)
    }

    /// Publish the value fetched by the read-through holding `id`.
    ///
    /// Returns the published value. If the record was invalidated meanwhile, nothing is cached and `None` is
    /// returned. If another reservation holds the record, the currently cached value is returned unchanged.
    pub fn try_publish_reserved(&self, key: &[u8], value: &V, id: ReservationId) -> Result<Option<V>> {
        let stored = StoredValue::new(value, self.config.in_memory_format)?;

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = self.clock.now_millis();

        let Some(record) = inner.records.get_mut(key) else {
            return Ok(None);
        };
        if record.state() != RecordState::Reserved(id) {
            return record.value().map(|v| v.decode()).transpose();
        }

        record.publish(stored, now);
        if let Some(detector) = inner.detector.as_ref() {
            record.set_stamp(detector.stamp(key));
        }
        Ok(Some(value.clone()))
    }

    /// Drop the placeholder of an abandoned read-through.
    ///
    /// The record is removed only while it is still held by `id`. Returns whether it was removed.
    pub fn release_reserved(&self, key: &[u8], id: ReservationId) -> bool {
        let mut inner = self.inner.lock();
        match inner.records.get(key) {
            Some(record) if record.state() == RecordState::Reserved(id) => {
                inner.records.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Get the statistics of the store.
    pub fn statistics(&self) -> Statistics {
        let inner = self.inner.lock();
        Statistics {
            creation_time: self.creation_time,
            hit_count: inner.counters.hit,
            miss_count: inner.counters.miss,
            evicted_count: inner.counters.evicted,
            expired_count: inner.counters.expired,
            entry_count: inner.records.len(),
        }
    }

    /// Count of records, including reservation placeholders.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a record for `key` exists, without touching it or the statistics.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.inner.lock().records.contains_key(key)
    }
}

impl<V> Invalidate for RecordStore<V>
where
    V: Value,
{
    fn invalidate(&self, key: &[u8]) {
        RecordStore::invalidate(self, key);
    }

    fn clear(&self) {
        RecordStore::clear(self);
    }
}
