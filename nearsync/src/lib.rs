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

//! nearsync - near cache consistency engine for Rust.
//!
//! A near cache keeps entries of a remote distributed object in client memory. nearsync bounds the records with
//! sampled eviction and expiration, applies the invalidations pushed by the cluster, and runs an anti-entropy task
//! that detects lost invalidations and distrusts the records they may have left stale.
//!
//! Start from a [`RepairingTaskBuilder`] and a [`NearCacheManager`]:
//!
//! ```ignore
//! let task = RepairingTaskBuilder::new(fetcher, partitions).build()?;
//! let manager = NearCacheManager::new(Arc::new(task));
//! let cache = manager.get_or_create::<String, Order>("orders", NearCacheConfig::default()).await?;
//! ```

mod cache;
mod manager;
/// Re-exports of the commonly used types.
pub mod prelude;

pub use nearsync_common as common;
pub use nearsync_memory as memory;
pub use nearsync_repair as repair;
pub use prelude::*;
