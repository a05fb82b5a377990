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

use std::{future::Future, sync::Arc};

use nearsync_common::{
    code::key_data,
    config::{NearCacheConfig, RepairingConfig},
    error::Result,
    test_utils::StaticPartitionService,
};
use nearsync_memory::RecordStore;
use nearsync_repair::{MemberMetadata, MetadataFetcher, RepairingTaskBuilder};
use parking_lot::Mutex;
use uuid::Uuid;

const NAME: &str = "orders";

/// A single-member, single-partition cluster.
#[derive(Debug, Clone)]
struct Cluster {
    state: Arc<Mutex<(Uuid, u64)>>,
}

impl Cluster {
    fn new(owner: Uuid) -> Self {
        Self {
            state: Arc::new(Mutex::new((owner, 0))),
        }
    }

    /// Mutate the partition without delivering the invalidation.
    fn lose_invalidations(&self, count: u64) {
        self.state.lock().1 += count;
    }

    fn migrate(&self, owner: Uuid) {
        self.state.lock().0 = owner;
    }

    fn sequence(&self) -> u64 {
        self.state.lock().1
    }
}

impl MetadataFetcher for Cluster {
    fn fetch(&self, names: &[String]) -> impl Future<Output = Vec<Result<MemberMetadata>>> + Send {
        let (owner, sequence) = *self.state.lock();
        let mut metadata = MemberMetadata::default();
        for name in names {
            metadata.partition_uuids.insert(name.clone(), vec![(0, owner)]);
            metadata.partition_sequences.insert(name.clone(), vec![(0, sequence)]);
        }
        async move { vec![Ok(metadata)] }
    }
}

#[test_log::test(tokio::test)]
async fn test_lost_invalidations_mark_records_stale() {
    let m1 = Uuid::new_v4();
    let cluster = Cluster::new(m1);
    let task = RepairingTaskBuilder::new(cluster.clone(), Arc::new(StaticPartitionService::new(1)))
        .with_config(
            RepairingConfig::default()
                .with_reconciliation_interval_seconds(0)
                .with_max_tolerated_miss_count(3),
        )
        .build()
        .unwrap();

    let store = Arc::new(RecordStore::<u64>::new(NearCacheConfig::default().with_check_stale_reads(true)).unwrap());
    let handler = task.register_and_get_handler(NAME, store.clone()).await.unwrap();
    store.set_stale_read_detector(handler.stale_read_detector());

    let key = key_data(&"o-1").unwrap();
    store.put(key.clone(), &42, None).unwrap();
    assert_eq!(store.get(&key).unwrap(), Some(42));

    // Gaps below the tolerance only show up in the metadata.
    cluster.lose_invalidations(5);
    task.reconcile().await;
    assert_eq!(handler.metadata(0).unwrap().missed_sequence_count(), 5);
    assert_eq!(store.get(&key).unwrap(), Some(42));

    // The next round distrusts everything cached so far.
    task.reconcile().await;
    assert_eq!(handler.metadata(0).unwrap().stale_sequence(), cluster.sequence());
    assert_eq!(store.get(&key).unwrap(), None);
    assert!(!store.contains(&key));

    // Records cached after the repair are trusted.
    store.put(key.clone(), &43, None).unwrap();
    assert_eq!(store.get(&key).unwrap(), Some(43));

    // A new authority invalidates every record cached under the old one.
    cluster.migrate(Uuid::new_v4());
    task.reconcile().await;
    assert_eq!(store.get(&key).unwrap(), None);

    let stats = store.statistics();
    assert_eq!(stats.hit_count, 3);
    assert_eq!(stats.miss_count, 2);
}

#[test_log::test(tokio::test)]
async fn test_remote_invalidation_events() {
    let local_id = Uuid::new_v4();
    let m1 = Uuid::new_v4();
    let cluster = Cluster::new(m1);
    let task = RepairingTaskBuilder::new(cluster.clone(), Arc::new(StaticPartitionService::new(1)))
        .with_config(RepairingConfig::default().with_reconciliation_interval_seconds(0))
        .with_local_id(local_id)
        .build()
        .unwrap();

    let store = Arc::new(RecordStore::<String>::new(NearCacheConfig::default()).unwrap());
    let handler = task.register_and_get_handler(NAME, store.clone()).await.unwrap();

    let key = key_data(&"o-1").unwrap();
    store.put(key.clone(), &"v1".to_string(), None).unwrap();

    handler.handle(Some(&key[..]), local_id, m1, 1);
    assert!(store.contains(&key));

    handler.handle(Some(&key[..]), Uuid::new_v4(), m1, 2);
    assert!(!store.contains(&key));

    // Sequence 3 never arrives.
    handler.handle(None, Uuid::new_v4(), m1, 4);
    let metadata = handler.metadata(0).unwrap();
    assert_eq!(metadata.sequence(), 4);
    assert_eq!(metadata.missed_sequence_count(), 1);
}
