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

//! [`AggregateCursor`], the streaming aggregation operator

use std::cmp::Ordering;
use std::mem;
use std::sync::Arc;

use log::{debug, trace};
use rill_common::{Result, Row, Value};

use crate::aggregates::{create_accumulators, Accumulator, AggregateSpec, GroupExpr};
use crate::collation::compare_values;
use crate::context::ExecContext;
use crate::cursor::RecordCursor;

/// Tracks where the cursor is between `next` calls.
#[derive(Debug)]
enum CursorState {
    /// Child iteration not yet started.
    Init,
    /// Holding a row that belongs to the next group.
    Pending(Row),
    /// Child exhausted or abandoned; a final `next` returns end of stream.
    Drained,
    /// All output emitted, or a terminal error occurred.
    Done,
}

/// Aggregates a child cursor whose rows arrive sorted on the grouping key.
///
/// Each `next` call drains one maximal run of equal-keyed child rows
/// through the accumulator bank and emits one output row. With no grouping
/// columns the whole input is one group and a single row is emitted even
/// for empty input; with grouping columns, empty input produces no rows.
///
/// A row whose key differs from the running group is held in the `Pending`
/// state and becomes the first row of the next group on the following call.
/// Any error tears down all transient per-group state (distinct sorts,
/// large-object writers) before it is returned, and leaves the cursor
/// terminal.
#[derive(Debug)]
pub struct AggregateCursor {
    child: Box<dyn RecordCursor>,
    group_by: Vec<GroupExpr>,
    accumulators: Vec<Box<dyn Accumulator>>,
    output_width: usize,
    ctx: Arc<ExecContext>,
    state: CursorState,
    /// Key values of the group currently being absorbed.
    key_cache: Vec<Option<Value>>,
    /// True when some aggregate is index-mapped and every group is complete
    /// after its first row.
    single_row_groups: bool,
    /// Absorb-loop iterations left before the next voluntary yield.
    ticks: u32,
}

impl AggregateCursor {
    pub fn try_new(
        child: Box<dyn RecordCursor>,
        group_by: Vec<GroupExpr>,
        aggregates: Vec<AggregateSpec>,
        output_width: usize,
        ctx: Arc<ExecContext>,
    ) -> Result<Self> {
        for group in &group_by {
            if let Some(slot) = group.output {
                check_slot(slot, output_width)?;
            }
        }
        for spec in &aggregates {
            check_slot(spec.target, output_width)?;
        }
        let accumulators = create_accumulators(&aggregates, &ctx)?;
        let single_row_groups = accumulators.iter().any(|a| a.index_optimized());
        let key_cache = vec![None; group_by.len()];
        let ticks = ctx.quantum();
        Ok(AggregateCursor {
            child,
            group_by,
            accumulators,
            output_width,
            ctx,
            state: CursorState::Init,
            key_cache,
            single_row_groups,
            ticks,
        })
    }

    fn advance(&mut self) -> Result<Option<Row>> {
        let first = match mem::replace(&mut self.state, CursorState::Done) {
            CursorState::Done | CursorState::Drained => return Ok(None),
            CursorState::Init => {
                self.begin_group()?;
                self.child.open()?;
                match self.child.next()? {
                    Some(row) => row,
                    None => {
                        if !self.group_by.is_empty() {
                            // grouped aggregation over no rows yields no groups
                            self.release_group_state();
                            return Ok(None);
                        }
                        // a single group over no rows still yields its identity row
                        let mut output = Row::new(self.output_width);
                        self.finalize_group(&mut output)?;
                        self.state = CursorState::Drained;
                        return Ok(Some(output));
                    }
                }
            }
            CursorState::Pending(row) => {
                self.begin_group()?;
                row
            }
        };
        let output = self.fill_group(first)?;
        Ok(Some(output))
    }

    /// Absorb `first` and every following child row with the same group
    /// key, then finalize the accumulators into the output row.
    fn fill_group(&mut self, first: Row) -> Result<Row> {
        let mut output = Row::new(self.output_width);

        let keys = self.evaluate_keys(&first)?;
        self.key_cache = keys.clone();
        self.project_group_keys(&keys, &mut output);
        self.absorb(&first)?;

        loop {
            if self.ticks == 0 {
                self.ctx.scheduler().reschedule();
                self.ticks = self.ctx.quantum();
            } else {
                self.ticks -= 1;
            }

            if self.single_row_groups {
                // an index-mapped MIN/MAX already has its result; the rest
                // of the child stream is abandoned
                self.state = CursorState::Drained;
                break;
            }

            let row = match self.child.next()? {
                None => {
                    self.state = CursorState::Drained;
                    break;
                }
                Some(row) => row,
            };
            let keys = self.evaluate_keys(&row)?;
            if self.key_changed(&keys)? {
                self.state = CursorState::Pending(row);
                break;
            }
            self.project_group_keys(&keys, &mut output);
            self.absorb(&row)?;
        }

        self.finalize_group(&mut output)?;
        trace!("emitted one aggregate group");
        Ok(output)
    }

    fn evaluate_keys(&self, row: &Row) -> Result<Vec<Option<Value>>> {
        self.group_by
            .iter()
            .map(|group| group.expr.evaluate(row))
            .collect()
    }

    /// Compare the new key values against the cached ones, refreshing the
    /// cache as it goes, and report whether any column changed. Two NULLs
    /// are equal, NULL never equals a value, and text compares under its
    /// collation. On a change the remaining cache entries keep their old
    /// values; the next group re-caches all of them.
    fn key_changed(&mut self, keys: &[Option<Value>]) -> Result<bool> {
        for (cached, new) in self.key_cache.iter_mut().zip(keys) {
            let previous = mem::replace(cached, new.clone());
            let changed = match (&previous, new) {
                (None, None) => false,
                (None, Some(_)) | (Some(_), None) => true,
                (Some(a), Some(b)) => {
                    compare_values(a, b, self.ctx.collator().as_ref())? != Ordering::Equal
                }
            };
            if changed {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn project_group_keys(&self, keys: &[Option<Value>], output: &mut Row) {
        for (group, value) in self.group_by.iter().zip(keys) {
            if let Some(slot) = group.output {
                output.set(slot, value.clone());
            }
        }
    }

    fn begin_group(&mut self) -> Result<()> {
        for accumulator in &mut self.accumulators {
            accumulator.begin_group()?;
        }
        Ok(())
    }

    fn absorb(&mut self, row: &Row) -> Result<()> {
        for accumulator in &mut self.accumulators {
            accumulator.absorb(row)?;
        }
        Ok(())
    }

    fn finalize_group(&mut self, output: &mut Row) -> Result<()> {
        for accumulator in &mut self.accumulators {
            accumulator.finalize(output)?;
        }
        Ok(())
    }

    fn release_group_state(&mut self) {
        for accumulator in &mut self.accumulators {
            accumulator.release();
        }
    }
}

impl RecordCursor for AggregateCursor {
    fn open(&mut self) -> Result<()> {
        debug!(
            "opening aggregate cursor: {} grouping columns, {} aggregates",
            self.group_by.len(),
            self.accumulators.len()
        );
        self.release_group_state();
        self.state = CursorState::Init;
        self.key_cache = vec![None; self.group_by.len()];
        self.ticks = self.ctx.quantum();
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        match self.advance() {
            Ok(row) => Ok(row),
            Err(e) => {
                self.release_group_state();
                self.state = CursorState::Done;
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        debug!("closing aggregate cursor");
        self.release_group_state();
        self.child.close();
        self.state = CursorState::Done;
    }

    fn invalidate(&mut self) {
        self.child.invalidate();
    }
}

fn check_slot(slot: usize, output_width: usize) -> Result<()> {
    if slot >= output_width {
        return Err(rill_common::RillError::Internal(format!(
            "output slot {slot} out of range for a row of width {output_width}"
        )));
    }
    Ok(())
}
