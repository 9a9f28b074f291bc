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

//! Large-object streaming writer capability

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use rill_common::{BlobId, Result, RillError};

/// Host capability for creating and reading large objects.
pub trait BlobStore: Debug + Send + Sync {
    /// Open a streaming writer for a new large object.
    fn create(&self) -> Result<Box<dyn BlobWriter>>;

    /// The full content of a committed large object.
    fn read(&self, id: BlobId) -> Result<Vec<u8>>;
}

/// A streaming writer. `close` commits the object and yields its handle;
/// dropping the writer without closing discards everything written.
pub trait BlobWriter: Send {
    fn put(&mut self, data: &[u8]) -> Result<()>;

    fn close(self: Box<Self>) -> Result<BlobId>;
}

#[derive(Debug, Default)]
struct BlobStoreState {
    blobs: HashMap<u64, Vec<u8>>,
    next_id: u64,
}

/// A heap-backed [`BlobStore`]. The count of writers created but not yet
/// dropped is observable, which the operator tests use to assert cleanup
/// invariants.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    state: Arc<Mutex<BlobStoreState>>,
    open_writers: Arc<AtomicUsize>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writers created but not yet dropped.
    pub fn open_writers(&self) -> usize {
        self.open_writers.load(AtomicOrdering::SeqCst)
    }

    /// Number of committed blobs.
    pub fn blob_count(&self) -> usize {
        self.state.lock().blobs.len()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn create(&self) -> Result<Box<dyn BlobWriter>> {
        self.open_writers.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(InMemoryBlobWriter {
            buffer: Vec::new(),
            state: Arc::clone(&self.state),
            open_writers: Arc::clone(&self.open_writers),
        }))
    }

    fn read(&self, id: BlobId) -> Result<Vec<u8>> {
        self.state
            .lock()
            .blobs
            .get(&id.0)
            .cloned()
            .ok_or_else(|| RillError::Internal(format!("unknown blob {}", id.0)))
    }
}

struct InMemoryBlobWriter {
    buffer: Vec<u8>,
    state: Arc<Mutex<BlobStoreState>>,
    open_writers: Arc<AtomicUsize>,
}

impl BlobWriter for InMemoryBlobWriter {
    fn put(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<BlobId> {
        let content = std::mem::take(&mut self.buffer);
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.blobs.insert(id, content);
        Ok(BlobId(id))
    }
}

impl Drop for InMemoryBlobWriter {
    fn drop(&mut self) {
        self.open_writers.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}
