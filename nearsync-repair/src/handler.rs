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

use nearsync_common::{cluster::PartitionService, code::KeyData};
use nearsync_memory::{Invalidate, StaleReadDetector};
use uuid::Uuid;

use crate::{
    metadata::{MetadataContainer, MetadataTable},
    stale::MetadataStaleReadDetector,
};

/// An invalidation event pushed by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    /// Invalidated key, `None` if the whole object was invalidated.
    pub key: Option<KeyData>,
    /// Client that caused the invalidation.
    pub source_client_id: Uuid,
    /// Authority of the partition that emitted the event.
    pub source_id: Uuid,
    /// Sequence of the event in its partition.
    pub sequence: u64,
}

/// Applies invalidations of one near-cached object to its record store and partition metadata.
pub struct RepairingHandler {
    name: String,
    local_id: Uuid,
    store: Arc<dyn Invalidate>,
    table: Arc<MetadataTable>,
}

impl Debug for RepairingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairingHandler")
            .field("name", &self.name)
            .field("local_id", &self.local_id)
            .field("partitions", &self.table.len())
            .finish()
    }
}

impl RepairingHandler {
    /// Create a handler with zeroed metadata for every partition.
    ///
    /// `local_id` is the identity of this client. Invalidations caused by this client are not applied to the store.
    pub fn new(
        name: impl Into<String>,
        local_id: Uuid,
        store: Arc<dyn Invalidate>,
        partitions: Arc<dyn PartitionService>,
    ) -> Self {
        Self {
            name: name.into(),
            local_id,
            store,
            table: Arc::new(MetadataTable::new(partitions)),
        }
    }

    /// Name of the near-cached object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metadata of every partition.
    pub fn table(&self) -> &Arc<MetadataTable> {
        &self.table
    }

    /// Copy of the metadata of `partition_id`.
    pub fn metadata(&self, partition_id: usize) -> Option<MetadataContainer> {
        self.table.get(partition_id)
    }

    /// Stale read detector to install in the record store of the object.
    pub fn stale_read_detector(&self) -> Arc<dyn StaleReadDetector> {
        Arc::new(MetadataStaleReadDetector::new(self.table.clone()))
    }

    /// Seed the authority of a partition from a snapshot.
    pub fn init_uuid(&self, partition_id: usize, source_id: Uuid) {
        self.table.with(partition_id, |c| c.set_source_id(source_id));
    }

    /// Seed the sequence of a partition from a snapshot.
    pub fn init_sequence(&self, partition_id: usize, sequence: u64) {
        self.table.with(partition_id, |c| c.set_sequence(sequence));
    }

    /// Apply one invalidation event.
    ///
    /// `key` of `None` invalidates the whole object.
    pub fn handle(&self, key: Option<&[u8]>, source_client_id: Uuid, source_id: Uuid, sequence: u64) {
        // Own writes already updated the local store.
        if source_client_id != self.local_id {
            match key {
                Some(key) => self.store.invalidate(key),
                None => self.store.clear(),
            }
        }

        let partition_id = self.table.partition_id(key.unwrap_or(self.name.as_bytes()));
        self.check_or_repair_sequence(partition_id, sequence, false);
        self.check_or_repair_uuid(partition_id, source_id);
    }

    /// Apply a batch of invalidation events in arrival order.
    pub fn handle_batch(&self, invalidations: &[Invalidation]) {
        for invalidation in invalidations {
            self.handle(
                invalidation.key.as_deref(),
                invalidation.source_client_id,
                invalidation.source_id,
                invalidation.sequence,
            );
        }
    }

    /// Advance the sequence of a partition to `next`, accounting skipped sequences as missed.
    ///
    /// Events skip the sequence they carry, so they account `next - current - 1`. Anti-entropy snapshots account
    /// the whole difference.
    pub fn check_or_repair_sequence(&self, partition_id: usize, next: u64, via_anti_entropy: bool) {
        let name = &self.name;
        self.table.with(partition_id, |c| {
            let current = c.sequence();
            if current >= next {
                return;
            }
            let missed = if via_anti_entropy {
                next - current
            } else {
                next - current - 1
            };
            if missed > 0 {
                c.add_missed_sequence_count(missed);
                tracing::trace!(
                    "[repairing handler]: {name} partition {partition_id} missed {missed} invalidations, sequence {current} -> {next}"
                );
            }
            c.set_sequence(next);
        });
    }

    /// Adopt a new authority of a partition, resetting its counters if it changed.
    pub fn check_or_repair_uuid(&self, partition_id: usize, source_id: Uuid) {
        let name = &self.name;
        self.table.with(partition_id, |c| {
            if c.source_id() == Some(source_id) {
                return;
            }
            tracing::debug!(
                "[repairing handler]: {name} partition {partition_id} authority changed from {:?} to {source_id}",
                c.source_id()
            );
            c.set_source_id(source_id);
            c.reset();
        });
    }

    /// Raise the stale boundary of a partition to its current sequence.
    pub fn update_last_known_stale_sequence(&self, partition_id: usize) {
        self.table.with(partition_id, |c| c.widen_stale_sequence(c.sequence()));
    }

    /// Missed invalidations summed over all partitions.
    pub fn missed_sequence_count(&self) -> u64 {
        let mut sum = 0;
        self.table.for_each(|_, c| sum += c.missed_sequence_count());
        sum
    }

    /// Distrust every record cached before now if at least `max_tolerated_miss_count` invalidations were missed.
    ///
    /// Returns whether the stale boundaries were raised.
    pub fn fix_sequence_gaps(&self, max_tolerated_miss_count: u64) -> bool {
        let missed = self.missed_sequence_count();
        if missed < max_tolerated_miss_count {
            return false;
        }
        tracing::debug!(
            "[repairing handler]: {} missed {missed} invalidations, raising stale boundaries",
            self.name
        );
        self.table.for_each(|_, c| {
            c.widen_stale_sequence(c.sequence());
            c.reset_missed_sequence_count();
        });
        true
    }
}
