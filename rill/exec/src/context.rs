// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! [`ExecContext`], the bundle of host capabilities operators run against

use std::sync::Arc;

use crate::blob::{BlobStore, InMemoryBlobStore};
use crate::collation::{BuiltinCollator, Collator};
use crate::scheduler::{NoopScheduler, Scheduler};
use crate::sort::{InMemorySortSpace, SortSpace};

/// Default number of absorb-loop iterations between voluntary yields.
pub const DEFAULT_QUANTUM: u32 = 100;

/// Everything an operator needs from its host: external sorting,
/// large-object storage, collation, and cooperative scheduling, plus the
/// scheduling quantum.
///
/// The defaults are the in-memory capability implementations, which are
/// enough for embedding and for tests.
#[derive(Debug)]
pub struct ExecContext {
    sorts: Arc<dyn SortSpace>,
    blobs: Arc<dyn BlobStore>,
    collator: Arc<dyn Collator>,
    scheduler: Arc<dyn Scheduler>,
    quantum: u32,
}

impl Default for ExecContext {
    fn default() -> Self {
        ExecContext::new(
            Arc::new(InMemorySortSpace::new()),
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(BuiltinCollator),
            Arc::new(NoopScheduler),
        )
    }
}

impl ExecContext {
    pub fn new(
        sorts: Arc<dyn SortSpace>,
        blobs: Arc<dyn BlobStore>,
        collator: Arc<dyn Collator>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        ExecContext {
            sorts,
            blobs,
            collator,
            scheduler,
            quantum: DEFAULT_QUANTUM,
        }
    }

    pub fn with_quantum(mut self, quantum: u32) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn sorts(&self) -> &Arc<dyn SortSpace> {
        &self.sorts
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn collator(&self) -> &Arc<dyn Collator> {
        &self.collator
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn quantum(&self) -> u32 {
        self.quantum
    }
}
