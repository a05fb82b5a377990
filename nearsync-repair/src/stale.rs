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

use nearsync_memory::{InvalidationStamp, StaleReadDetector};

use crate::metadata::{MetadataContainer, MetadataTable};

/// Whether a record stamped with `stamp` is stale according to its partition's metadata.
///
/// A record is stale if it was cached under another authority, or before the stale boundary.
pub fn is_stale(stamp: &InvalidationStamp, container: &MetadataContainer) -> bool {
    stamp.source_id != container.source_id() || stamp.sequence < container.stale_sequence()
}

/// [`StaleReadDetector`] backed by the metadata table of a repairing handler.
#[derive(Debug, Clone)]
pub struct MetadataStaleReadDetector {
    table: Arc<MetadataTable>,
}

impl MetadataStaleReadDetector {
    /// Create a detector reading `table`.
    pub fn new(table: Arc<MetadataTable>) -> Self {
        Self { table }
    }
}

impl StaleReadDetector for MetadataStaleReadDetector {
    fn stamp(&self, key: &[u8]) -> InvalidationStamp {
        let partition_id = self.table.partition_id(key);
        self.table.with(partition_id, |c| c.stamp()).unwrap_or_default()
    }

    fn is_stale_read(&self, key: &[u8], stamp: &InvalidationStamp) -> bool {
        let partition_id = self.table.partition_id(key);
        self.table
            .with(partition_id, |c| is_stale(stamp, c))
            .unwrap_or(false)
    }
}
