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

//! Utilities for testing.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use crate::{
    clock::Clock,
    cluster::{Lifecycle, PartitionService},
};

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

impl ManualClock {
    /// Create a manual clock starting at `millis`.
    pub fn new(millis: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(millis)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Partition service with a fixed partition count.
#[derive(Debug, Clone, Copy)]
pub struct StaticPartitionService {
    partition_count: usize,
}

impl StaticPartitionService {
    /// Create a partition service with `partition_count` partitions.
    pub fn new(partition_count: usize) -> Self {
        Self { partition_count }
    }
}

impl PartitionService for StaticPartitionService {
    fn partition_count(&self) -> usize {
        self.partition_count
    }
}

/// Lifecycle that can be switched off by tests.
#[derive(Debug, Clone)]
pub struct SwitchLifecycle {
    running: Arc<AtomicBool>,
}

impl Default for SwitchLifecycle {
    fn default() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl SwitchLifecycle {
    /// Mark the client as stopped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Lifecycle for SwitchLifecycle {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
