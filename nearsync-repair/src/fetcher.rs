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

use std::{fmt::Debug, future::Future};

use hashbrown::HashMap;
use nearsync_common::error::Result;
use uuid::Uuid;

/// Invalidation metadata reported by one cluster member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberMetadata {
    /// Authority of each partition the member reports, by object name.
    pub partition_uuids: HashMap<String, Vec<(usize, Uuid)>>,
    /// Latest invalidation sequence of each partition the member reports, by object name.
    pub partition_sequences: HashMap<String, Vec<(usize, u64)>>,
}

impl MemberMetadata {
    /// Keep only the metadata of `names`.
    pub fn retain_names(&mut self, names: &[String]) {
        self.partition_uuids.retain(|name, _| names.contains(name));
        self.partition_sequences.retain(|name, _| names.contains(name));
    }
}

/// Fetches authoritative invalidation metadata from the cluster.
pub trait MetadataFetcher: Send + Sync + Debug + 'static {
    /// Fetch the metadata of `names` from every member.
    ///
    /// Returns one result per member. A failed member does not fail the others.
    fn fetch(&self, names: &[String]) -> impl Future<Output = Vec<Result<MemberMetadata>>> + Send;
}
