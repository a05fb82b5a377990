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

use std::{future::Future, sync::Arc, time::Duration};

use itertools::Itertools;
use nearsync_common::error::{Error, ErrorKind, Result};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::fetcher::{MemberMetadata, MetadataFetcher};

#[derive(Debug, Default)]
struct MockMember {
    metadata: MemberMetadata,
    failing: bool,
}

#[derive(Debug, Default)]
struct MockState {
    members: Vec<MockMember>,
    requests: Vec<Vec<String>>,
    delay: Option<Duration>,
}

/// Metadata fetcher serving metadata set by tests, one entry per simulated member.
#[derive(Debug, Clone, Default)]
pub struct MockMetadataFetcher {
    state: Arc<Mutex<MockState>>,
}

fn upsert<T>(entries: &mut Vec<(usize, T)>, partition_id: usize, value: T) {
    match entries.iter_mut().find(|(pid, _)| *pid == partition_id) {
        Some(entry) => entry.1 = value,
        None => entries.push((partition_id, value)),
    }
}

impl MockMetadataFetcher {
    /// Create a fetcher simulating `members` members without metadata.
    pub fn new(members: usize) -> Self {
        let state = MockState {
            members: (0..members).map(|_| MockMember::default()).collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Report `source_id` as the authority of `partition_id` of `name` from `member`.
    pub fn set_partition_uuid(&self, member: usize, name: &str, partition_id: usize, source_id: Uuid) {
        let mut state = self.state.lock();
        let entries = state.members[member]
            .metadata
            .partition_uuids
            .entry(name.to_string())
            .or_default();
        upsert(entries, partition_id, source_id);
    }

    /// Report `sequence` as the latest sequence of `partition_id` of `name` from `member`.
    pub fn set_partition_sequence(&self, member: usize, name: &str, partition_id: usize, sequence: u64) {
        let mut state = self.state.lock();
        let entries = state.members[member]
            .metadata
            .partition_sequences
            .entry(name.to_string())
            .or_default();
        upsert(entries, partition_id, sequence);
    }

    /// Make fetches from `member` fail or succeed again.
    pub fn fail(&self, member: usize, failing: bool) {
        self.state.lock().members[member].failing = failing;
    }

    /// Delay the responses of subsequent fetches.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Names requested by each fetch so far.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.state.lock().requests.clone()
    }
}

impl MetadataFetcher for MockMetadataFetcher {
    fn fetch(&self, names: &[String]) -> impl Future<Output = Vec<Result<MemberMetadata>>> + Send {
        let mut state = self.state.lock();
        state.requests.push(names.to_vec());
        let responses = state
            .members
            .iter()
            .enumerate()
            .map(|(i, member)| {
                if member.failing {
                    return Err(Error::new(ErrorKind::Fetch, "member unreachable").with_context("member", i));
                }
                let mut metadata = member.metadata.clone();
                metadata.retain_names(names);
                Ok(metadata)
            })
            .collect_vec();
        let delay = state.delay;

        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            responses
        }
    }
}
