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

use std::{
    any::{Any, TypeId},
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use hashbrown::HashMap;
use nearsync_common::{
    clock::{Clock, SystemClock},
    code::{Key, Value},
    config::NearCacheConfig,
    error::{Error, ErrorKind, Result},
};
use nearsync_memory::{Invalidate, RecordStore};
use nearsync_repair::{MetadataFetcher, RepairingHandler, RepairingTask};
use parking_lot::Mutex;

use crate::cache::NearCache;

type CreationLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Creation lock of one near cache name, dropped from the table by its last holder.
struct CreationSlot<'a> {
    locks: &'a CreationLocks,
    name: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> CreationSlot<'a> {
    fn new(locks: &'a CreationLocks, name: &'a str) -> Self {
        let lock = locks.lock().entry(name.to_string()).or_default().clone();
        Self { locks, name, lock }
    }
}

impl Drop for CreationSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // Only the table and this slot hold the lock, so no creation of the name is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(self.name);
        }
    }
}

struct CacheEntry {
    name: Arc<str>,
    key_type: TypeId,
    store: Arc<dyn Any + Send + Sync>,
    invalidate: Arc<dyn Invalidate>,
    handler: Option<Arc<RepairingHandler>>,
}

impl CacheEntry {
    fn new<K, V>(name: Arc<str>, store: Arc<RecordStore<V>>, handler: Option<Arc<RepairingHandler>>) -> Self
    where
        K: Key,
        V: Value,
    {
        Self {
            name,
            key_type: TypeId::of::<K>(),
            store: store.clone(),
            invalidate: store,
            handler,
        }
    }

    fn cache<K, V>(&self) -> Result<NearCache<K, V>>
    where
        K: Key,
        V: Value,
    {
        let mismatch = || {
            Error::new(ErrorKind::TypeMismatch, "near cache exists with other key or value types")
                .with_context("name", &self.name)
        };
        if self.key_type != TypeId::of::<K>() {
            return Err(mismatch());
        }
        let store = self
            .store
            .clone()
            .downcast::<RecordStore<V>>()
            .map_err(|_| mismatch())?;
        Ok(NearCache::new(self.name.clone(), store, self.handler.clone()))
    }
}

/// Near caches of a client.
///
/// Creates one near cache per distributed object and wires the ones invalidated on change to the repairing task.
pub struct NearCacheManager<F> {
    task: Arc<RepairingTask<F>>,
    clock: Arc<dyn Clock>,

    caches: Mutex<HashMap<String, CacheEntry>>,
    // Serializes creations per name, which await the initial metadata fetch.
    creating: CreationLocks,
    closed: AtomicBool,
}

impl<F> Debug for NearCacheManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NearCacheManager")
            .field("task", &self.task)
            .field("caches", &self.caches.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<F> NearCacheManager<F>
where
    F: MetadataFetcher,
{
    /// Create a manager whose near caches are repaired by `task`.
    pub fn new(task: Arc<RepairingTask<F>>) -> Self {
        Self {
            task,
            clock: Arc::new(SystemClock),
            caches: Mutex::new(HashMap::new()),
            creating: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Set the clock of the record stores created afterwards.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Repairing task of the client.
    pub fn task(&self) -> &Arc<RepairingTask<F>> {
        &self.task
    }

    /// Get the near cache of `name`, creating it with `config` on first use.
    ///
    /// `config` is ignored if the near cache exists. Requesting an existing near cache with other key or value
    /// types fails with [`ErrorKind::TypeMismatch`].
    ///
    /// Concurrent creations of the same name wait for each other; other names are created independently.
    pub async fn get_or_create<K, V>(&self, name: &str, config: NearCacheConfig) -> Result<NearCache<K, V>>
    where
        K: Key,
        V: Value,
    {
        if let Some(cache) = self.get(name)? {
            return Ok(cache);
        }

        let slot = CreationSlot::new(&self.creating, name);
        let _creating = slot.lock.lock().await;
        if let Some(cache) = self.get(name)? {
            return Ok(cache);
        }

        let store = Arc::new(RecordStore::<V>::with_clock(config, self.clock.clone())?);
        let handler = if store.config().invalidate_on_change {
            let handler = self.task.register_and_get_handler(name, store.clone()).await?;
            store.set_stale_read_detector(handler.stale_read_detector());
            Some(handler)
        } else {
            None
        };

        let entry = CacheEntry::new::<K, V>(name.into(), store, handler);
        let cache = entry.cache()?;
        self.caches.lock().insert(name.to_string(), entry);
        tracing::debug!(
            "[near cache manager]: created near cache {name}, invalidate on change: {}",
            cache.is_invalidated_on_change()
        );
        Ok(cache)
    }

    fn get<K, V>(&self, name: &str) -> Result<Option<NearCache<K, V>>>
    where
        K: Key,
        V: Value,
    {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::closed("near cache manager"));
        }
        self.caches.lock().get(name).map(|entry| entry.cache()).transpose()
    }

    /// Destroy the near cache of `name`, dropping its records and its repairing handler.
    pub fn destroy(&self, name: &str) {
        let Some(entry) = self.caches.lock().remove(name) else {
            return;
        };
        entry.invalidate.clear();
        if entry.handler.is_some() {
            self.task.deregister_handler(name);
        }
        tracing::debug!("[near cache manager]: destroyed near cache {name}");
    }

    /// Names of the near caches.
    pub fn names(&self) -> Vec<String> {
        self.caches.lock().keys().cloned().collect()
    }

    /// Destroy all near caches and stop the repairing task.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let entries = self.caches.lock().drain().collect::<Vec<_>>();
        for (_, entry) in entries {
            entry.invalidate.clear();
        }
        self.task.shutdown().await;
    }
}
