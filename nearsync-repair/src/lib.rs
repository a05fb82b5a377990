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

//! Invalidation repair for nearsync.
//!
//! Each near-cached object gets a [`RepairingHandler`] that applies invalidation events to its record store and
//! tracks per-partition invalidation metadata. The [`RepairingTask`] owns the handlers of a client and periodically
//! reconciles their metadata with the cluster, so lost invalidations eventually mark the affected records stale.

mod fetcher;
mod handler;
mod metadata;
mod prelude;
mod stale;
mod task;

/// Utilities for testing.
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use prelude::*;
