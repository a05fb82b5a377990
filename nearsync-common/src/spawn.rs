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

use std::{fmt::Debug, future::Future, mem::ManuallyDrop, sync::Arc};

use tokio::{
    runtime::{Builder, Handle, Runtime},
    task::JoinHandle,
};

use crate::error::{Error, Result};

/// Runtime owned by nearsync, shut down in the background on drop.
///
/// A runtime cannot be dropped from within another runtime, which is where the last reference usually goes.
pub struct DedicatedRuntime {
    runtime: ManuallyDrop<Runtime>,
}

impl Debug for DedicatedRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedicatedRuntime").finish_non_exhaustive()
    }
}

impl Drop for DedicatedRuntime {
    fn drop(&mut self) {
        // Safety: `runtime` is never touched after drop.
        let runtime = unsafe { ManuallyDrop::take(&mut self.runtime) };
        runtime.shutdown_background();
    }
}

impl From<Runtime> for DedicatedRuntime {
    fn from(runtime: Runtime) -> Self {
        Self {
            runtime: ManuallyDrop::new(runtime),
        }
    }
}

/// Where nearsync spawns its background tasks.
#[derive(Debug, Clone)]
pub enum Spawner {
    /// A runtime owned by nearsync.
    Dedicated(Arc<DedicatedRuntime>),
    /// A runtime owned by the application.
    Handle(Handle),
}

impl From<Runtime> for Spawner {
    fn from(runtime: Runtime) -> Self {
        Self::Dedicated(Arc::new(runtime.into()))
    }
}

impl From<Handle> for Spawner {
    fn from(handle: Handle) -> Self {
        Self::Handle(handle)
    }
}

impl Spawner {
    /// Build a dedicated multi-thread runtime with `worker_threads` workers named `thread_name`.
    pub fn dedicated(worker_threads: usize, thread_name: &str) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name(thread_name)
            .enable_all()
            .build()
            .map_err(|e| Error::config("failed to build dedicated runtime").with_source(e))?;
        Ok(runtime.into())
    }

    /// Spawner of the runtime the caller runs on, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::Handle)
    }

    /// Spawn `future` on the runtime.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        match self {
            Self::Dedicated(runtime) => runtime.runtime.spawn(future),
            Self::Handle(handle) => handle.spawn(future),
        }
    }
}
