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

use std::fmt::Debug;

use uuid::Uuid;

/// Invalidation metadata of a record's partition, captured when the record was cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationStamp {
    /// Last applied invalidation sequence of the partition.
    pub sequence: u64,
    /// Authority of the partition.
    pub source_id: Option<Uuid>,
}

/// Bridge between a record store and the invalidation metadata of its object.
///
/// A store without a detector considers every read fresh.
pub trait StaleReadDetector: Send + Sync + Debug + 'static {
    /// Metadata to stamp on a record created for `key`.
    fn stamp(&self, key: &[u8]) -> InvalidationStamp;

    /// Whether a record for `key` cached with `stamp` can no longer be trusted.
    fn is_stale_read(&self, key: &[u8], stamp: &InvalidationStamp) -> bool;
}
