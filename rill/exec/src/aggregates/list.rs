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

//! LIST accumulators
//!
//! `LIST` concatenates the text rendering of its non-null inputs into a
//! streamed large object, separated by the delimiter expression. The blob
//! is created lazily on the first value, so the subtype of the result can
//! follow the data. A delimiter that evaluates to NULL taints the result
//! to NULL for the rest of the group; the half-written blob is discarded
//! on the spot and later inputs are ignored.

use std::fmt;
use std::sync::Arc;

use rill_common::{CollationId, Result, RillError, Row, Value};

use crate::aggregates::distinct::DistinctSet;
use crate::aggregates::Accumulator;
use crate::blob::{BlobStore, BlobWriter};
use crate::expr::ScalarExpr;

enum ListState {
    /// No value seen yet, no blob open.
    Idle,
    /// Streaming values into an open blob.
    Open {
        writer: Box<dyn BlobWriter>,
        collation: CollationId,
    },
    /// A NULL delimiter poisoned the group; the result is NULL.
    Tainted,
}

impl fmt::Debug for ListState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListState::Idle => f.write_str("Idle"),
            ListState::Open { collation, .. } => f
                .debug_struct("Open")
                .field("collation", collation)
                .finish_non_exhaustive(),
            ListState::Tainted => f.write_str("Tainted"),
        }
    }
}

/// `LIST(expr, delimiter)` and `LIST(DISTINCT expr, delimiter)`.
#[derive(Debug)]
pub(crate) struct ListAccumulator {
    arg: Arc<dyn ScalarExpr>,
    delimiter: Arc<dyn ScalarExpr>,
    target: usize,
    distinct: Option<DistinctSet>,
    blobs: Arc<dyn BlobStore>,
    state: ListState,
    appended: u64,
    /// For the distinct variant: the most recently evaluated delimiter,
    /// replayed between unique values at finalize time. `Some(None)` is an
    /// observed NULL delimiter.
    stashed_delimiter: Option<Option<String>>,
}

impl ListAccumulator {
    pub(crate) fn new(
        arg: Arc<dyn ScalarExpr>,
        delimiter: Arc<dyn ScalarExpr>,
        target: usize,
        distinct: Option<DistinctSet>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        ListAccumulator {
            arg,
            delimiter,
            target,
            distinct,
            blobs,
            state: ListState::Idle,
            appended: 0,
            stashed_delimiter: None,
        }
    }

    fn ensure_writer(&mut self, value: &Value) -> Result<()> {
        if matches!(self.state, ListState::Idle) {
            let writer = self.blobs.create()?;
            self.state = ListState::Open {
                writer,
                collation: value.text_collation(),
            };
        }
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            ListState::Open { writer, .. } => writer.put(data),
            _ => Err(RillError::Internal(
                "list append without an open large object".to_string(),
            )),
        }
    }

    /// The update rule for one non-null value, used directly by the plain
    /// variant and per unique value by the distinct replay. The delimiter
    /// has already been evaluated by the caller.
    fn push_value(&mut self, value: &Value, delimiter: Option<&str>) -> Result<()> {
        if matches!(self.state, ListState::Tainted) {
            return Ok(());
        }
        self.ensure_writer(value)?;
        if self.appended > 0 {
            match delimiter {
                None => {
                    // dropping the writer discards the half-built blob
                    self.state = ListState::Tainted;
                    return Ok(());
                }
                Some(sep) => self.append(sep.as_bytes())?,
            }
        }
        let text = value.to_text()?;
        self.append(text.as_bytes())?;
        self.appended += 1;
        Ok(())
    }
}

impl Accumulator for ListAccumulator {
    fn begin_group(&mut self) -> Result<()> {
        self.state = ListState::Idle;
        self.appended = 0;
        self.stashed_delimiter = None;
        if let Some(set) = &mut self.distinct {
            set.open()?;
        }
        Ok(())
    }

    fn absorb(&mut self, row: &Row) -> Result<()> {
        let value = match self.arg.evaluate(row)? {
            None => return Ok(()),
            Some(value) => value,
        };
        if let Some(set) = &mut self.distinct {
            set.put(&value)?;
            self.stashed_delimiter = Some(match self.delimiter.evaluate(row)? {
                None => None,
                Some(delimiter) => Some(delimiter.to_text()?),
            });
            return Ok(());
        }
        if matches!(self.state, ListState::Tainted) {
            return Ok(());
        }
        let delimiter = if self.appended > 0 {
            match self.delimiter.evaluate(row)? {
                None => None,
                Some(delimiter) => Some(delimiter.to_text()?),
            }
        } else {
            // not needed before the second value
            Some(String::new())
        };
        self.push_value(&value, delimiter.as_deref())
    }

    fn finalize(&mut self, output: &mut Row) -> Result<()> {
        if let Some(mut set) = self.distinct.take() {
            let stashed = self.stashed_delimiter.clone().unwrap_or(None);
            let replayed = set.finalize(&mut |value| {
                self.push_value(&value, stashed.as_deref())
            });
            self.distinct = Some(set);
            replayed?;
        }
        let result = match std::mem::replace(&mut self.state, ListState::Idle) {
            ListState::Open { writer, collation } => {
                let id = writer.close()?;
                Some(Value::Blob { id, collation })
            }
            ListState::Idle | ListState::Tainted => None,
        };
        output.set(self.target, result);
        Ok(())
    }

    fn release(&mut self) {
        self.state = ListState::Idle;
        self.stashed_delimiter = None;
        if let Some(set) = &mut self.distinct {
            set.reset();
        }
    }
}
