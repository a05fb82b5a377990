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

use bytes::Bytes;
use nearsync_common::{
    code::{self, Value},
    config::InMemoryFormat,
    error::Result,
};
use uuid::Uuid;

use crate::stale::InvalidationStamp;

/// Identifier handed out by a reservation, see [`RecordStore::try_reserve_for_update`](crate::RecordStore::try_reserve_for_update).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReservationId(pub(crate) u64);

/// Whether a record can be read or is held by a pending read-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// The record may be read and reserved.
    Readable,
    /// A read-through holds the record until it publishes with the same id.
    Reserved(ReservationId),
}

/// Value kept by a record, in the configured [`InMemoryFormat`].
#[derive(Debug, Clone)]
pub enum StoredValue<V> {
    /// Decoded value.
    Object(V),
    /// Encoded value.
    Binary(Bytes),
}

impl<V> StoredValue<V>
where
    V: Value,
{
    /// Convert a value into the given in-memory format.
    pub fn new(value: &V, format: InMemoryFormat) -> Result<Self> {
        match format {
            InMemoryFormat::Object => Ok(Self::Object(value.clone())),
            InMemoryFormat::Binary => Ok(Self::Binary(code::encode(value)?)),
        }
    }

    /// Get a decoded copy of the value.
    pub fn decode(&self) -> Result<V> {
        match self {
            Self::Object(v) => Ok(v.clone()),
            Self::Binary(buf) => code::decode(buf),
        }
    }
}

/// [`Record`] holds a cached value and the metadata used by expiration, eviction and stale read detection.
///
/// All timestamps are milliseconds since the unix epoch.
#[derive(Debug, Clone)]
pub struct Record<V> {
    value: Option<StoredValue<V>>,
    state: RecordState,

    creation_time: u64,
    expiration_time: Option<u64>,
    last_access_time: u64,
    access_hit_count: u64,
    ttl_seconds: Option<u64>,

    invalidation_sequence: u64,
    source_id: Option<Uuid>,
}

impl<V> Record<V> {
    /// Create a readable record.
    ///
    /// `ttl_seconds` of `None` or `Some(0)` means the record never expires by age.
    pub fn new(value: StoredValue<V>, now: u64, ttl_seconds: Option<u64>) -> Self {
        let mut record = Self::placeholder(now, ttl_seconds, RecordState::Readable);
        record.value = Some(value);
        record
    }

    /// Create a record without value, held by a reservation.
    pub fn reserved(now: u64, ttl_seconds: Option<u64>, id: ReservationId) -> Self {
        Self::placeholder(now, ttl_seconds, RecordState::Reserved(id))
    }

    fn placeholder(now: u64, ttl_seconds: Option<u64>, state: RecordState) -> Self {
        let ttl_seconds = ttl_seconds.filter(|ttl| *ttl > 0);
        Self {
            value: None,
            state,
            creation_time: now,
            expiration_time: ttl_seconds.map(|ttl| deadline(now, ttl)),
            last_access_time: now,
            access_hit_count: 0,
            ttl_seconds,
            invalidation_sequence: 0,
            source_id: None,
        }
    }

    /// Publish the value of a reserved record, restarting its lifetime at `now`.
    pub(crate) fn publish(&mut self, value: StoredValue<V>, now: u64) {
        self.value = Some(value);
        self.state = RecordState::Readable;
        self.creation_time = now;
        self.last_access_time = now;
        self.expiration_time = self.ttl_seconds.map(|ttl| deadline(now, ttl));
    }

    /// Whether the record has expired, by absolute expiration or by idle time.
    ///
    /// `max_idle_seconds` of `0` disables idle expiration.
    pub fn is_expired(&self, now: u64, max_idle_seconds: u64) -> bool {
        if self.expiration_time.is_some_and(|t| t < now) {
            return true;
        }
        max_idle_seconds > 0 && deadline(self.last_access_time, max_idle_seconds) < now
    }

    /// Record a hit.
    pub fn touch(&mut self, now: u64) {
        self.last_access_time = now;
        self.access_hit_count += 1;
    }

    /// Get the value, `None` if the record is a reservation placeholder.
    pub fn value(&self) -> Option<&StoredValue<V>> {
        self.value.as_ref()
    }

    /// Get the record state.
    pub fn state(&self) -> RecordState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RecordState) {
        self.state = state;
    }

    /// Creation time.
    pub fn creation_time(&self) -> u64 {
        self.creation_time
    }

    /// Absolute expiration time, present iff a positive TTL was configured.
    pub fn expiration_time(&self) -> Option<u64> {
        self.expiration_time
    }

    /// Last access time.
    pub fn last_access_time(&self) -> u64 {
        self.last_access_time
    }

    /// Hits since creation.
    pub fn access_hit_count(&self) -> u64 {
        self.access_hit_count
    }

    /// TTL the record was created with.
    pub fn ttl_seconds(&self) -> Option<u64> {
        self.ttl_seconds
    }

    /// Invalidation metadata captured when the record was created.
    pub fn stamp(&self) -> InvalidationStamp {
        InvalidationStamp {
            sequence: self.invalidation_sequence,
            source_id: self.source_id,
        }
    }

    pub(crate) fn set_stamp(&mut self, stamp: InvalidationStamp) {
        self.invalidation_sequence = stamp.sequence;
        self.source_id = stamp.source_id;
    }
}

/// Millisecond instant `seconds` after `millis`, saturating at `u64::MAX`.
fn deadline(millis: u64, seconds: u64) -> u64 {
    millis.saturating_add(seconds.saturating_mul(1000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(now: u64, ttl: Option<u64>) -> Record<u64> {
        Record::new(StoredValue::Object(1), now, ttl)
    }

    #[test]
    fn test_expiration_time_iff_ttl() {
        assert_eq!(record(1000, None).expiration_time(), None);
        assert_eq!(record(1000, Some(0)).expiration_time(), None);
        assert_eq!(record(1000, Some(2)).expiration_time(), Some(3000));
    }

    #[test]
    fn test_expired_by_ttl() {
        let r = record(1000, Some(1));
        assert!(!r.is_expired(2000, 0));
        assert!(r.is_expired(2001, 0));
    }

    #[test]
    fn test_expired_by_idle() {
        let mut r = record(1000, None);
        assert!(!r.is_expired(1_000_000, 0));
        assert!(!r.is_expired(3000, 2));
        assert!(r.is_expired(3001, 2));

        // Access resets idleness, but not the absolute expiration.
        r.touch(3000);
        assert!(!r.is_expired(5000, 2));
        assert_eq!(r.access_hit_count(), 1);

        let mut r = record(1000, Some(3));
        r.touch(3500);
        assert!(r.is_expired(4001, 10));
    }

    #[test]
    fn test_huge_lifetimes_saturate() {
        let r = record(1000, Some(u64::MAX));
        assert_eq!(r.expiration_time(), Some(u64::MAX));
        assert!(!r.is_expired(u64::MAX, 0));
        assert!(!r.is_expired(u64::MAX, u64::MAX));

        let r = record(u64::MAX - 1, Some(u64::MAX / 1000 + 1));
        assert!(!r.is_expired(u64::MAX, 0));
    }

    #[test]
    fn test_publish_restarts_lifetime() {
        let mut r: Record<u64> = Record::reserved(1000, Some(1), ReservationId(7));
        assert!(r.value().is_none());
        assert_eq!(r.state(), RecordState::Reserved(ReservationId(7)));

        r.publish(StoredValue::Object(42), 5000);
        assert_eq!(r.state(), RecordState::Readable);
        assert_eq!(r.creation_time(), 5000);
        assert_eq!(r.expiration_time(), Some(6000));
        assert_eq!(r.value().unwrap().decode().unwrap(), 42);
    }

    #[test]
    fn test_binary_value() {
        let v = StoredValue::new(&"hello".to_string(), InMemoryFormat::Binary).unwrap();
        assert!(matches!(v, StoredValue::Binary(_)));
        assert_eq!(v.decode().unwrap(), "hello");
    }
}
