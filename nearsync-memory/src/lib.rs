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

//! Record store of nearsync.
//!
//! A [`RecordStore`] keeps the records of one near cache by their key data. Records expire by TTL and idle time,
//! and a sampled eviction keeps the store within the configured bound. A [`StaleReadDetector`] installed by the
//! repairing layer stamps new records with the invalidation metadata of their partition.

mod eviction;
mod prelude;
mod record;
mod stale;
mod statistics;
mod store;

pub use prelude::*;
