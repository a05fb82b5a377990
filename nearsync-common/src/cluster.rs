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

//! Narrow interfaces to the cluster services the near cache depends on.

use std::fmt::Debug;

use twox_hash::XxHash64;

/// Partition table of the cluster.
pub trait PartitionService: Send + Sync + Debug + 'static {
    /// Total partition count of the cluster.
    fn partition_count(&self) -> usize;

    /// Partition that owns the serialized key or object name.
    fn partition_id(&self, data: &[u8]) -> usize {
        let count = self.partition_count().max(1) as u64;
        (hash(data) % count) as usize
    }
}

/// Lifecycle of the owning client.
pub trait Lifecycle: Send + Sync + Debug + 'static {
    /// Whether the client is still running.
    fn is_running(&self) -> bool;
}

/// Hash used for partitioning.
pub fn hash(data: &[u8]) -> u64 {
    XxHash64::oneshot(0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Partitions(usize);

    impl PartitionService for Partitions {
        fn partition_count(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_partition_id_in_range() {
        let partitions = Partitions(271);
        for i in 0..1000u32 {
            let pid = partitions.partition_id(&i.to_le_bytes());
            assert!(pid < 271);
            assert_eq!(pid, partitions.partition_id(&i.to_le_bytes()));
        }
    }

    #[test]
    fn test_zero_partitions() {
        assert_eq!(Partitions(0).partition_id(b"name"), 0);
    }
}
