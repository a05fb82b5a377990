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

pub use crate::{
    cache::NearCache,
    common::{
        clock::{Clock, SystemClock},
        cluster::{Lifecycle, PartitionService},
        code::{Key, KeyData, Value},
        config::{EvictionPolicy, InMemoryFormat, NearCacheConfig, RepairingConfig},
        error::{Error, ErrorKind, Result},
        spawn::Spawner,
    },
    manager::NearCacheManager,
    memory::{InvalidationStamp, RecordStore, Statistics},
    repair::{
        Invalidation, MemberMetadata, MetadataContainer, MetadataFetcher, RepairingHandler, RepairingTask,
        RepairingTaskBuilder,
    },
};
