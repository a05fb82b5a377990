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

use std::{fmt::Debug, future::Future, marker::PhantomData, sync::Arc};

use nearsync_common::{
    code::{self, Key, Value},
    error::{Error, ErrorKind, Result},
};
use nearsync_memory::{RecordStore, ReservationId, Statistics};
use nearsync_repair::RepairingHandler;

/// Reservation of a pending read-through.
///
/// Releases the placeholder on drop if it is still held, so a failed or cancelled fetch does not leave the key
/// reserved. Published records are left alone.
struct Reservation<'a, V>
where
    V: Value,
{
    store: &'a RecordStore<V>,
    key: &'a [u8],
    id: Option<ReservationId>,
}

impl<V> Drop for Reservation<'_, V>
where
    V: Value,
{
    fn drop(&mut self) {
        if let Some(id) = self.id {
            if self.store.release_reserved(self.key, id) {
                tracing::trace!("[near cache]: released abandoned reservation {id:?}");
            }
        }
    }
}

/// Typed near cache of a distributed object.
///
/// Keys are cached by their serialized form. Cloning a [`NearCache`] is cheap and shares the record store.
pub struct NearCache<K, V> {
    name: Arc<str>,
    store: Arc<RecordStore<V>>,
    handler: Option<Arc<RepairingHandler>>,
    _marker: PhantomData<K>,
}

impl<K, V> Clone for NearCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            store: self.store.clone(),
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> Debug for NearCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NearCache")
            .field("name", &self.name)
            .field("store", &self.store)
            .field("handler", &self.handler)
            .finish()
    }
}

impl<K, V> NearCache<K, V>
where
    K: Key,
    V: Value,
{
    pub(crate) fn new(name: Arc<str>, store: Arc<RecordStore<V>>, handler: Option<Arc<RepairingHandler>>) -> Self {
        Self {
            name,
            store,
            handler,
            _marker: PhantomData,
        }
    }

    /// Name of the near-cached object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the cached value of `key`.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let key = code::key_data(key)?;
        self.store.get(&key)
    }

    /// Cache `value` for `key` with the configured time-to-live.
    pub fn put(&self, key: &K, value: &V) -> Result<()> {
        let key = code::key_data(key)?;
        self.store.put(key, value, None)
    }

    /// Cache `value` for `key`, expiring after `ttl_seconds`.
    pub fn put_with_ttl(&self, key: &K, value: &V, ttl_seconds: u64) -> Result<()> {
        let key = code::key_data(key)?;
        self.store.put(key, value, Some(ttl_seconds))
    }

    /// Get the cached value of `key`, or fetch it from the cluster and cache it.
    ///
    /// The fetched value is not cached if `key` is invalidated while it is fetched, or if another read-through of
    /// `key` is in progress. It is returned either way.
    pub async fn get_or_fetch<F, FU>(&self, key: &K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> FU,
        FU: Future<Output = anyhow::Result<V>>,
    {
        let key = code::key_data(key)?;
        if let Some(value) = self.store.get(&key)? {
            return Ok(value);
        }

        let reservation = Reservation {
            store: &self.store,
            key: &key,
            id: self.store.try_reserve_for_update(key.clone()),
        };
        let value = fetch().await.map_err(|e| {
            Error::new(ErrorKind::External, "fetch from cluster failed")
                .with_context("name", &self.name)
                .with_source(e)
        })?;

        let Some(id) = reservation.id else {
            return Ok(value);
        };
        match self.store.try_publish_reserved(&key, &value, id)? {
            Some(cached) => Ok(cached),
            None => {
                tracing::trace!("[near cache]: {} key invalidated during read-through, not cached", self.name);
                Ok(value)
            }
        }
    }

    /// Remove the cached value of `key`.
    pub fn invalidate(&self, key: &K) -> Result<()> {
        let key = code::key_data(key)?;
        self.store.invalidate(&key);
        Ok(())
    }

    /// Remove all cached values.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Statistics of the near cache.
    pub fn statistics(&self) -> Statistics {
        self.store.statistics()
    }

    /// Count of cached records.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Whether the cluster invalidates this near cache on changes.
    pub fn is_invalidated_on_change(&self) -> bool {
        self.store.config().invalidate_on_change
    }

    /// Record store of the near cache.
    pub fn store(&self) -> &Arc<RecordStore<V>> {
        &self.store
    }

    /// Repairing handler of the near cache, present iff it is invalidated on change.
    pub fn handler(&self) -> Option<&Arc<RepairingHandler>> {
        self.handler.as_ref()
    }
}
