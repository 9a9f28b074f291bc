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

//! External sort capability with duplicate rejection
//!
//! The interface mirrors a classic database sort module: the caller
//! declares a fixed record length and a set of byte-range keys up front,
//! feeds records, triggers the sort, then reads records back in key order.
//! Ordering uses all keys; duplicate rejection compares only the first
//! `unique_keys` keys, so a collation key prefix can dedup case-insensitively
//! while the trailing payload keeps replay deterministic.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use rill_common::{Result, RillError};

/// One sort key: a byte range of the record, compared ascending bytewise.
#[derive(Debug, Clone)]
pub struct SortKeyDef {
    pub offset: usize,
    pub length: usize,
}

/// Configuration for one sort run.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Fixed length of every record fed to the run.
    pub record_length: usize,
    /// Keys in major-to-minor order.
    pub keys: Vec<SortKeyDef>,
    /// Records whose first `unique_keys` keys compare equal are duplicates;
    /// all but the first are discarded by `sort`.
    pub unique_keys: usize,
}

/// Host capability that creates sort runs.
pub trait SortSpace: Debug + Send + Sync {
    fn init(&self, config: SortConfig) -> Result<Box<dyn SortRun>>;
}

/// One open sort: fed, sorted, then drained. Dropping the run releases
/// everything it holds.
pub trait SortRun: Send {
    /// Append one record. The record must be exactly `record_length` bytes.
    fn put(&mut self, record: &[u8]) -> Result<()>;

    /// Sort the fed records and discard duplicates.
    fn sort(&mut self) -> Result<()>;

    /// The next record in key order, or `None` when drained.
    /// May only be called after `sort`.
    fn get(&mut self) -> Result<Option<&[u8]>>;
}

/// A heap-backed [`SortSpace`], optionally capped by a byte budget shared
/// across its runs. The count of currently open runs is observable, which
/// the operator tests use to assert cleanup invariants.
#[derive(Debug, Default)]
pub struct InMemorySortSpace {
    budget: Option<Arc<Mutex<usize>>>,
    open_runs: Arc<AtomicUsize>,
}

impl InMemorySortSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A space whose runs may hold at most `bytes` of record data in total;
    /// exceeding the budget fails `put` with `ResourcesExhausted`.
    pub fn with_byte_budget(bytes: usize) -> Self {
        InMemorySortSpace {
            budget: Some(Arc::new(Mutex::new(bytes))),
            open_runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of runs created but not yet dropped.
    pub fn open_runs(&self) -> usize {
        self.open_runs.load(AtomicOrdering::SeqCst)
    }
}

impl SortSpace for InMemorySortSpace {
    fn init(&self, config: SortConfig) -> Result<Box<dyn SortRun>> {
        if config.record_length == 0 || config.keys.is_empty() {
            return Err(RillError::Internal(
                "sort run needs a record length and at least one key".to_string(),
            ));
        }
        if config.unique_keys > config.keys.len() {
            return Err(RillError::Internal(format!(
                "unique key count {} exceeds key count {}",
                config.unique_keys,
                config.keys.len()
            )));
        }
        for key in &config.keys {
            if key.offset + key.length > config.record_length {
                return Err(RillError::Internal(format!(
                    "sort key {}..{} outside record of length {}",
                    key.offset,
                    key.offset + key.length,
                    config.record_length
                )));
            }
        }
        self.open_runs.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(Box::new(InMemorySortRun {
            config,
            records: Vec::new(),
            sorted: false,
            cursor: 0,
            charged: 0,
            budget: self.budget.clone(),
            open_runs: Arc::clone(&self.open_runs),
        }))
    }
}

struct InMemorySortRun {
    config: SortConfig,
    records: Vec<Vec<u8>>,
    sorted: bool,
    cursor: usize,
    charged: usize,
    budget: Option<Arc<Mutex<usize>>>,
    open_runs: Arc<AtomicUsize>,
}

fn compare_keys(keys: &[SortKeyDef], a: &[u8], b: &[u8]) -> Ordering {
    for key in keys {
        let range = key.offset..key.offset + key.length;
        match a[range.clone()].cmp(&b[range]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

impl SortRun for InMemorySortRun {
    fn put(&mut self, record: &[u8]) -> Result<()> {
        if record.len() != self.config.record_length {
            return Err(RillError::Internal(format!(
                "sort record of {} bytes fed to a run expecting {}",
                record.len(),
                self.config.record_length
            )));
        }
        if let Some(budget) = &self.budget {
            let mut remaining = budget.lock();
            if *remaining < record.len() {
                return Err(RillError::ResourcesExhausted(
                    "sort byte budget exceeded".to_string(),
                ));
            }
            *remaining -= record.len();
            self.charged += record.len();
        }
        self.records.push(record.to_vec());
        Ok(())
    }

    fn sort(&mut self) -> Result<()> {
        let InMemorySortRun {
            config, records, ..
        } = self;
        records.sort_unstable_by(|a, b| compare_keys(&config.keys, a, b));
        records.dedup_by(|a, b| {
            compare_keys(&config.keys[..config.unique_keys], a, b) == Ordering::Equal
        });
        self.sorted = true;
        self.cursor = 0;
        Ok(())
    }

    fn get(&mut self) -> Result<Option<&[u8]>> {
        if !self.sorted {
            return Err(RillError::Internal(
                "sort run read before being sorted".to_string(),
            ));
        }
        if self.cursor >= self.records.len() {
            return Ok(None);
        }
        let index = self.cursor;
        self.cursor += 1;
        Ok(Some(&self.records[index]))
    }
}

impl Drop for InMemorySortRun {
    fn drop(&mut self) {
        self.open_runs.fetch_sub(1, AtomicOrdering::SeqCst);
        if let Some(budget) = &self.budget {
            *budget.lock() += self.charged;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_key_config(length: usize) -> SortConfig {
        SortConfig {
            record_length: length,
            keys: vec![SortKeyDef { offset: 0, length }],
            unique_keys: 1,
        }
    }

    #[test]
    fn sorts_and_rejects_duplicates() {
        let space = InMemorySortSpace::new();
        let mut run = space.init(one_key_config(2)).unwrap();
        for record in [[2u8, 0], [1, 1], [2, 0], [0, 9]] {
            run.put(&record).unwrap();
        }
        run.sort().unwrap();

        let mut seen = Vec::new();
        while let Some(record) = run.get().unwrap() {
            seen.push(record.to_vec());
        }
        assert_eq!(seen, vec![vec![0, 9], vec![1, 1], vec![2, 0]]);
    }

    #[test]
    fn unique_prefix_keeps_first_in_key_order() {
        // Major key is the first byte only; the second byte orders ties.
        let space = InMemorySortSpace::new();
        let mut run = space
            .init(SortConfig {
                record_length: 2,
                keys: vec![
                    SortKeyDef {
                        offset: 0,
                        length: 1,
                    },
                    SortKeyDef {
                        offset: 1,
                        length: 1,
                    },
                ],
                unique_keys: 1,
            })
            .unwrap();
        for record in [[5u8, 2], [5, 1], [3, 7]] {
            run.put(&record).unwrap();
        }
        run.sort().unwrap();

        let mut seen = Vec::new();
        while let Some(record) = run.get().unwrap() {
            seen.push(record.to_vec());
        }
        assert_eq!(seen, vec![vec![3, 7], vec![5, 1]]);
    }

    #[test]
    fn budget_is_enforced_and_returned() {
        let space = InMemorySortSpace::with_byte_budget(4);
        let mut run = space.init(one_key_config(2)).unwrap();
        run.put(&[0, 1]).unwrap();
        run.put(&[2, 3]).unwrap();
        assert!(matches!(
            run.put(&[4, 5]),
            Err(RillError::ResourcesExhausted(_))
        ));
        drop(run);

        // the budget is available again after the run is released
        let mut run = space.init(one_key_config(2)).unwrap();
        run.put(&[0, 1]).unwrap();
        run.put(&[2, 3]).unwrap();
        assert_eq!(space.open_runs(), 1);
        drop(run);
        assert_eq!(space.open_runs(), 0);
    }

    #[test]
    fn misuse_is_rejected() {
        let space = InMemorySortSpace::new();
        assert!(space.init(one_key_config(0)).is_err());
        assert!(space
            .init(SortConfig {
                record_length: 2,
                keys: vec![SortKeyDef {
                    offset: 1,
                    length: 2
                }],
                unique_keys: 1,
            })
            .is_err());

        let mut run = space.init(one_key_config(2)).unwrap();
        assert!(run.put(&[1]).is_err());
        assert!(run.get().is_err());
    }
}
