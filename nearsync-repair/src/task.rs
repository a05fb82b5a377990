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
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use hashbrown::HashMap;
use itertools::Itertools;
use nearsync_common::{
    cluster::{Lifecycle, PartitionService},
    config::RepairingConfig,
    error::{Error, Result},
    spawn::Spawner,
};
use nearsync_memory::Invalidate;
use parking_lot::Mutex;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    fetcher::{MemberMetadata, MetadataFetcher},
    handler::RepairingHandler,
};

/// Builder of [`RepairingTask`].
pub struct RepairingTaskBuilder<F> {
    fetcher: F,
    partitions: Arc<dyn PartitionService>,
    config: RepairingConfig,
    local_id: Option<Uuid>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    spawner: Option<Spawner>,
}

impl<F> RepairingTaskBuilder<F>
where
    F: MetadataFetcher,
{
    /// Create a builder fetching metadata with `fetcher` for a cluster partitioned by `partitions`.
    pub fn new(fetcher: F, partitions: Arc<dyn PartitionService>) -> Self {
        Self {
            fetcher,
            partitions,
            config: RepairingConfig::default(),
            local_id: None,
            lifecycle: None,
            spawner: None,
        }
    }

    /// Set the repairing config.
    pub fn with_config(mut self, config: RepairingConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the identity of this client. A random identity is used if not set.
    pub fn with_local_id(mut self, local_id: Uuid) -> Self {
        self.local_id = Some(local_id);
        self
    }

    /// Set the client lifecycle. Reconciliation stops at the first tick after the client stops.
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Set the spawner of the reconciliation timer. The current runtime is used if not set.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Build the repairing task.
    ///
    /// Fails if the reconciliation interval is below the configured floor, or if the reconciliation timer needs a
    /// runtime and none is available.
    pub fn build(self) -> Result<RepairingTask<F>> {
        let interval = self.config.reconciliation_interval()?;
        let spawner = match (interval, self.spawner) {
            (_, Some(spawner)) => Some(spawner),
            (None, None) => None,
            (Some(_), None) => Some(Spawner::try_current().ok_or_else(|| {
                Error::config("reconciliation requires a tokio runtime or an explicit spawner")
            })?),
        };
        let local_id = self.local_id.unwrap_or_else(Uuid::new_v4);

        match interval {
            Some(interval) => tracing::info!(
                "[repairing task]: local id {local_id}, reconciliation interval {interval:?}, max tolerated miss count {}",
                self.config.max_tolerated_miss_count
            ),
            None => tracing::info!("[repairing task]: local id {local_id}, reconciliation disabled"),
        }

        let inner = RepairingTaskInner {
            config: self.config,
            local_id,
            partitions: self.partitions,
            lifecycle: self.lifecycle,
            fetcher: self.fetcher,
            handlers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        };
        Ok(RepairingTask {
            inner: Arc::new(inner),
            interval,
            spawner,
            runner: Mutex::new(None),
        })
    }
}

struct RepairingTaskInner<F> {
    config: RepairingConfig,
    local_id: Uuid,
    partitions: Arc<dyn PartitionService>,
    lifecycle: Option<Arc<dyn Lifecycle>>,
    fetcher: F,

    handlers: Mutex<HashMap<String, Arc<RepairingHandler>>>,
    closed: AtomicBool,
}

impl<F> RepairingTaskInner<F>
where
    F: MetadataFetcher,
{
    fn is_client_running(&self) -> bool {
        self.lifecycle.as_ref().is_none_or(|lifecycle| lifecycle.is_running())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn handler(&self, name: &str) -> Option<Arc<RepairingHandler>> {
        self.handlers.lock().get(name).cloned()
    }

    async fn initialize(&self, handler: &RepairingHandler) {
        let names = vec![handler.name().to_string()];
        for response in self.fetcher.fetch(&names).await {
            let metadata = match response {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::warn!(
                        "[repairing task]: failed to fetch initial invalidation metadata of {}: {e}",
                        handler.name()
                    );
                    continue;
                }
            };
            if let Some(uuids) = metadata.partition_uuids.get(handler.name()) {
                for &(partition_id, source_id) in uuids {
                    handler.init_uuid(partition_id, source_id);
                }
            }
            if let Some(sequences) = metadata.partition_sequences.get(handler.name()) {
                for &(partition_id, sequence) in sequences {
                    handler.init_sequence(partition_id, sequence);
                }
            }
        }
    }

    async fn reconcile(&self) {
        let handlers = self.handlers.lock().values().cloned().collect_vec();
        if handlers.is_empty() {
            return;
        }

        for handler in handlers.iter() {
            handler.fix_sequence_gaps(self.config.max_tolerated_miss_count);
        }

        let names = handlers.iter().map(|handler| handler.name().to_string()).collect_vec();
        tracing::debug!("[repairing task]: reconciling {} near-cached objects", names.len());
        let responses = self.fetcher.fetch(&names).await;

        if self.is_closed() {
            tracing::debug!("[repairing task]: discard invalidation metadata fetched after shutdown");
            return;
        }
        for response in responses {
            match response {
                Ok(metadata) => self.repair(&metadata),
                Err(e) => tracing::warn!("[repairing task]: failed to fetch invalidation metadata: {e}"),
            }
        }
    }

    fn repair(&self, metadata: &MemberMetadata) {
        for (name, uuids) in metadata.partition_uuids.iter() {
            let Some(handler) = self.handler(name) else {
                continue;
            };
            for &(partition_id, source_id) in uuids {
                handler.check_or_repair_uuid(partition_id, source_id);
            }
        }
        for (name, sequences) in metadata.partition_sequences.iter() {
            let Some(handler) = self.handler(name) else {
                continue;
            };
            for &(partition_id, sequence) in sequences {
                handler.check_or_repair_sequence(partition_id, sequence, true);
            }
        }
    }
}

struct RunnerHandle {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Anti-entropy task of a client.
///
/// Owns the [`RepairingHandler`] of every near-cached object and periodically reconciles their partition metadata
/// with the metadata fetched from the cluster. Dropping the task stops the reconciliation timer.
pub struct RepairingTask<F> {
    inner: Arc<RepairingTaskInner<F>>,
    interval: Option<Duration>,
    spawner: Option<Spawner>,
    runner: Mutex<Option<RunnerHandle>>,
}

impl<F> Debug for RepairingTask<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairingTask")
            .field("local_id", &self.inner.local_id)
            .field("config", &self.inner.config)
            .field("handlers", &self.inner.handlers.lock().len())
            .finish()
    }
}

impl<F> RepairingTask<F>
where
    F: MetadataFetcher,
{
    /// Identity of this client.
    pub fn local_id(&self) -> Uuid {
        self.inner.local_id
    }

    /// Repairing config.
    pub fn config(&self) -> &RepairingConfig {
        &self.inner.config
    }

    /// Get the handler of `name`, creating it on first use.
    ///
    /// A new handler is seeded with the metadata fetched from the cluster before it is returned, and the
    /// reconciliation timer starts with the first handler.
    pub async fn register_and_get_handler(
        &self,
        name: &str,
        store: Arc<dyn Invalidate>,
    ) -> Result<Arc<RepairingHandler>> {
        if self.inner.is_closed() {
            return Err(Error::closed("repairing task"));
        }
        if let Some(handler) = self.inner.handler(name) {
            return Ok(handler);
        }

        let handler = Arc::new(RepairingHandler::new(
            name,
            self.inner.local_id,
            store,
            self.inner.partitions.clone(),
        ));
        self.inner.initialize(&handler).await;

        if self.inner.is_closed() {
            return Err(Error::closed("repairing task"));
        }
        // A concurrent registration of the same name wins if it finished first.
        let handler = self
            .inner
            .handlers
            .lock()
            .entry(name.to_string())
            .or_insert(handler)
            .clone();
        tracing::debug!("[repairing task]: registered handler of {name}");

        self.start_reconciliation();
        Ok(handler)
    }

    /// Remove the handler of `name`. Reconciliation goes on for the other handlers.
    pub fn deregister_handler(&self, name: &str) {
        if self.inner.handlers.lock().remove(name).is_some() {
            tracing::debug!("[repairing task]: deregistered handler of {name}");
        }
    }

    /// Get the handler of `name` if registered.
    pub fn handler(&self, name: &str) -> Option<Arc<RepairingHandler>> {
        self.inner.handler(name)
    }

    /// Run one reconciliation immediately.
    pub async fn reconcile(&self) {
        self.inner.reconcile().await
    }

    /// Whether the reconciliation timer is running.
    pub fn is_reconciling(&self) -> bool {
        self.runner
            .lock()
            .as_ref()
            .is_some_and(|runner| !runner.handle.is_finished())
    }

    /// Stop reconciliation and drop all handlers.
    ///
    /// Metadata fetched by an in-flight reconciliation is discarded.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.handlers.lock().clear();

        let runner = self.runner.lock().take();
        if let Some(RunnerHandle { stop_tx, handle }) = runner {
            let _ = stop_tx.send(());
            if let Err(e) = handle.await {
                tracing::warn!("[repairing task]: reconciliation runner exits abnormally: {e}");
            }
        }
        tracing::debug!("[repairing task]: shutdown");
    }

    fn start_reconciliation(&self) {
        let (Some(interval), Some(spawner)) = (self.interval, self.spawner.as_ref()) else {
            return;
        };
        let mut runner = self.runner.lock();
        if runner.is_some() {
            return;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let reconciler = ReconcileRunner {
            inner: self.inner.clone(),
            interval,
            stop_rx,
        };
        let handle = spawner.spawn(async move { reconciler.run().await });
        *runner = Some(RunnerHandle { stop_tx, handle });
        tracing::debug!("[repairing task]: reconciliation started");
    }
}

struct ReconcileRunner<F> {
    inner: Arc<RepairingTaskInner<F>>,
    interval: Duration,
    stop_rx: oneshot::Receiver<()>,
}

impl<F> ReconcileRunner<F>
where
    F: MetadataFetcher,
{
    async fn run(mut self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut self.stop_rx => {
                    tracing::debug!("[repairing task]: reconciliation stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if !self.inner.is_client_running() {
                        tracing::debug!("[repairing task]: client is not running, cancel reconciliation");
                        return;
                    }
                    tokio::select! {
                        biased;
                        _ = &mut self.stop_rx => {
                            tracing::debug!("[repairing task]: reconciliation stopped, discard in-flight fetch");
                            return;
                        }
                        _ = self.inner.reconcile() => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use nearsync_common::{
        config::NearCacheConfig,
        error::ErrorKind,
        test_utils::{StaticPartitionService, SwitchLifecycle},
    };
    use nearsync_memory::RecordStore;

    use super::*;
    use crate::test_utils::MockMetadataFetcher;

    const NAME: &str = "map";

    fn builder(fetcher: &MockMetadataFetcher) -> RepairingTaskBuilder<MockMetadataFetcher> {
        RepairingTaskBuilder::new(fetcher.clone(), Arc::new(StaticPartitionService::new(4)))
            .with_config(RepairingConfig::default().with_reconciliation_interval_seconds(0))
    }

    fn timed(fetcher: &MockMetadataFetcher) -> RepairingTaskBuilder<MockMetadataFetcher> {
        builder(fetcher).with_config(
            RepairingConfig::default()
                .with_reconciliation_interval_seconds(1)
                .with_min_reconciliation_interval_seconds(1),
        )
    }

    fn store() -> Arc<RecordStore<String>> {
        Arc::new(RecordStore::new(NearCacheConfig::default()).unwrap())
    }

    #[test]
    fn test_interval_below_floor() {
        let fetcher = MockMetadataFetcher::new(1);
        let err = builder(&fetcher)
            .with_config(RepairingConfig::default().with_reconciliation_interval_seconds(10))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_disabled_reconciliation_without_runtime() {
        let fetcher = MockMetadataFetcher::new(1);
        let task = builder(&fetcher).build().unwrap();
        assert!(!task.is_reconciling());
    }

    #[test_log::test(tokio::test)]
    async fn test_register_initializes_handler() {
        let fetcher = MockMetadataFetcher::new(2);
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        fetcher.set_partition_uuid(0, NAME, 0, m1);
        fetcher.set_partition_sequence(0, NAME, 0, 5);
        fetcher.set_partition_uuid(1, NAME, 1, m2);
        fetcher.set_partition_sequence(1, NAME, 1, 7);
        fetcher.set_partition_sequence(1, "other", 1, 100);

        let task = builder(&fetcher).build().unwrap();
        let handler = task.register_and_get_handler(NAME, store()).await.unwrap();

        let c = handler.metadata(0).unwrap();
        assert_eq!((c.source_id(), c.sequence()), (Some(m1), 5));
        let c = handler.metadata(1).unwrap();
        assert_eq!((c.source_id(), c.sequence()), (Some(m2), 7));

        let again = task.register_and_get_handler(NAME, store()).await.unwrap();
        assert!(Arc::ptr_eq(&handler, &again));
        assert_eq!(fetcher.requests(), vec![vec![NAME.to_string()]]);
    }

    #[test_log::test(tokio::test)]
    async fn test_initial_fetch_failure_tolerated() {
        let fetcher = MockMetadataFetcher::new(2);
        fetcher.set_partition_sequence(0, NAME, 0, 5);
        fetcher.set_partition_sequence(1, NAME, 1, 7);
        fetcher.fail(0, true);

        let task = builder(&fetcher).build().unwrap();
        let handler = task.register_and_get_handler(NAME, store()).await.unwrap();
        assert_eq!(handler.metadata(0).unwrap().sequence(), 0);
        assert_eq!(handler.metadata(1).unwrap().sequence(), 7);
    }

    #[test_log::test(tokio::test)]
    async fn test_reconcile_repairs() {
        let fetcher = MockMetadataFetcher::new(1);
        let m1 = Uuid::new_v4();
        let m2 = Uuid::new_v4();
        fetcher.set_partition_uuid(0, NAME, 0, m1);
        fetcher.set_partition_sequence(0, NAME, 0, 5);

        let task = builder(&fetcher).build().unwrap();
        let handler = task.register_and_get_handler(NAME, store()).await.unwrap();

        fetcher.set_partition_sequence(0, NAME, 0, 8);
        task.reconcile().await;
        let c = handler.metadata(0).unwrap();
        assert_eq!(c.sequence(), 8);
        assert_eq!(c.missed_sequence_count(), 3);

        fetcher.set_partition_uuid(0, NAME, 0, m2);
        fetcher.set_partition_sequence(0, NAME, 0, 2);
        task.reconcile().await;
        let c = handler.metadata(0).unwrap();
        assert_eq!(c.source_id(), Some(m2));
        assert_eq!(c.sequence(), 2);
        assert_eq!(c.missed_sequence_count(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_reconcile_tolerates_member_failure() {
        let fetcher = MockMetadataFetcher::new(2);
        let task = builder(&fetcher).build().unwrap();
        let handler = task.register_and_get_handler(NAME, store()).await.unwrap();

        fetcher.fail(0, true);
        fetcher.set_partition_sequence(0, NAME, 0, 3);
        fetcher.set_partition_sequence(1, NAME, 1, 4);
        task.reconcile().await;
        assert_eq!(handler.metadata(0).unwrap().sequence(), 0);
        assert_eq!(handler.metadata(1).unwrap().sequence(), 4);

        fetcher.fail(0, false);
        task.reconcile().await;
        assert_eq!(handler.metadata(0).unwrap().sequence(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_tolerated_miss_count() {
        let fetcher = MockMetadataFetcher::new(1);
        let task = builder(&fetcher).build().unwrap();
        let handler = task.register_and_get_handler(NAME, store()).await.unwrap();

        handler.check_or_repair_sequence(0, 10, false);
        task.reconcile().await;
        let c = handler.metadata(0).unwrap();
        assert_eq!(c.stale_sequence(), 0);
        assert_eq!(c.missed_sequence_count(), 9);

        handler.check_or_repair_sequence(1, 2, false);
        task.reconcile().await;
        for pid in 0..4 {
            let c = handler.metadata(pid).unwrap();
            assert_eq!(c.stale_sequence(), c.sequence());
            assert_eq!(c.missed_sequence_count(), 0);
        }
        assert_eq!(handler.metadata(0).unwrap().stale_sequence(), 10);
        assert_eq!(handler.metadata(1).unwrap().stale_sequence(), 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_deregister() {
        let fetcher = MockMetadataFetcher::new(1);
        let task = builder(&fetcher).build().unwrap();
        task.register_and_get_handler(NAME, store()).await.unwrap();
        task.register_and_get_handler("other", store()).await.unwrap();

        task.deregister_handler(NAME);
        assert!(task.handler(NAME).is_none());

        task.reconcile().await;
        assert_eq!(fetcher.requests().last().unwrap(), &vec!["other".to_string()]);

        task.deregister_handler("other");
        let requests = fetcher.requests().len();
        task.reconcile().await;
        assert_eq!(fetcher.requests().len(), requests);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_timer_reconciles() {
        let fetcher = MockMetadataFetcher::new(1);
        let task = timed(&fetcher).build().unwrap();
        assert!(!task.is_reconciling());

        let handler = task.register_and_get_handler(NAME, store()).await.unwrap();
        assert!(task.is_reconciling());

        fetcher.set_partition_sequence(0, NAME, 0, 3);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(handler.metadata(0).unwrap().sequence(), 3);

        fetcher.set_partition_sequence(0, NAME, 0, 6);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(handler.metadata(0).unwrap().sequence(), 6);

        task.shutdown().await;
        assert!(!task.is_reconciling());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_stopped_client_cancels_timer() {
        let fetcher = MockMetadataFetcher::new(1);
        let lifecycle = SwitchLifecycle::default();
        let task = timed(&fetcher)
            .with_lifecycle(Arc::new(lifecycle.clone()))
            .build()
            .unwrap();
        task.register_and_get_handler(NAME, store()).await.unwrap();

        lifecycle.stop();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!task.is_reconciling());
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_shutdown_discards_in_flight_fetch() {
        let fetcher = MockMetadataFetcher::new(1);
        let task = timed(&fetcher).build().unwrap();
        let handler = task.register_and_get_handler(NAME, store()).await.unwrap();

        fetcher.set_delay(Duration::from_secs(10));
        fetcher.set_partition_sequence(0, NAME, 0, 9);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(fetcher.requests().len(), 2);

        task.shutdown().await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(handler.metadata(0).unwrap().sequence(), 0);

        let err = task.register_and_get_handler(NAME, store()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
    }
}
