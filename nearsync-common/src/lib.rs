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

//! Shared components and utils for nearsync.

/// Wall-clock abstraction.
pub mod clock;
/// Interfaces to cluster services.
pub mod cluster;
/// Key and value coding.
pub mod code;
/// Near cache and repairing task configs.
pub mod config;
/// The error type of nearsync.
pub mod error;
/// Spawner for background tasks.
pub mod spawn;
/// Utilities for testing.
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
