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

use std::sync::Arc;

use nearsync_common::cluster::PartitionService;
use nearsync_memory::InvalidationStamp;
use parking_lot::Mutex;
use uuid::Uuid;

/// Invalidation metadata of one partition, as observed by one near-cached object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataContainer {
    sequence: u64,
    stale_sequence: u64,
    missed_sequence_count: u64,
    source_id: Option<Uuid>,
}

impl MetadataContainer {
    /// Last applied invalidation sequence.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Set the last applied invalidation sequence.
    pub fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Sequence below which cached records are not trusted.
    pub fn stale_sequence(&self) -> u64 {
        self.stale_sequence
    }

    /// Raise the stale boundary up to `sequence`. The boundary never moves back.
    pub fn widen_stale_sequence(&mut self, sequence: u64) {
        self.stale_sequence = self.stale_sequence.max(sequence);
    }

    /// Invalidations known to be lost since the last reset.
    pub fn missed_sequence_count(&self) -> u64 {
        self.missed_sequence_count
    }

    /// Account `count` more lost invalidations.
    pub fn add_missed_sequence_count(&mut self, count: u64) {
        self.missed_sequence_count += count;
    }

    /// Forget the lost invalidations.
    pub fn reset_missed_sequence_count(&mut self) {
        self.missed_sequence_count = 0;
    }

    /// Authority of the partition.
    pub fn source_id(&self) -> Option<Uuid> {
        self.source_id
    }

    /// Set the authority of the partition.
    pub fn set_source_id(&mut self, source_id: Uuid) {
        self.source_id = Some(source_id);
    }

    /// Zero all counters. Used when the authority changes.
    pub fn reset(&mut self) {
        self.sequence = 0;
        self.stale_sequence = 0;
        self.missed_sequence_count = 0;
    }

    /// Metadata to stamp on records created now.
    pub fn stamp(&self) -> InvalidationStamp {
        InvalidationStamp {
            sequence: self.sequence,
            source_id: self.source_id,
        }
    }
}

/// Dense per-partition metadata of one near-cached object.
///
/// Shared by the repairing handler, which mutates it, and the stale read detector installed in the record store,
/// which reads it.
#[derive(Debug)]
pub struct MetadataTable {
    partitions: Arc<dyn PartitionService>,
    containers: Vec<Mutex<MetadataContainer>>,
}

impl MetadataTable {
    /// Create a table with one zeroed container per partition.
    pub fn new(partitions: Arc<dyn PartitionService>) -> Self {
        let containers = (0..partitions.partition_count())
            .map(|_| Mutex::new(MetadataContainer::default()))
            .collect();
        Self { partitions, containers }
    }

    /// Partition count.
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Whether the table has no partitions.
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Partition of a serialized key or object name.
    pub fn partition_id(&self, data: &[u8]) -> usize {
        self.partitions.partition_id(data)
    }

    /// Run `f` on the container of `partition_id`.
    ///
    /// Returns `None` for partitions the table does not know.
    pub fn with<T>(&self, partition_id: usize, f: impl FnOnce(&mut MetadataContainer) -> T) -> Option<T> {
        let container = self.containers.get(partition_id)?;
        let mut container = container.lock();
        Some(f(&mut container))
    }

    /// Copy of the container of `partition_id`.
    pub fn get(&self, partition_id: usize) -> Option<MetadataContainer> {
        self.with(partition_id, |c| c.clone())
    }

    /// Run `f` on every container, in partition order.
    pub fn for_each(&self, mut f: impl FnMut(usize, &mut MetadataContainer)) {
        for (partition_id, container) in self.containers.iter().enumerate() {
            f(partition_id, &mut container.lock());
        }
    }
}
