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

//! MIN and MAX accumulators

use std::cmp::Ordering;
use std::sync::Arc;

use rill_common::{Result, Row, Value};

use crate::aggregates::Accumulator;
use crate::collation::{compare_values, Collator};
use crate::expr::ScalarExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MinMax {
    Min,
    Max,
}

/// `MIN(expr)` / `MAX(expr)`, including the index-mapped variants.
///
/// The running value stays uninitialized until the first non-null input;
/// comparison is collation-aware for text. For the index-mapped variants
/// the planner guarantees the first row of each group carries the
/// extremum, and the group cursor cuts the group off after one row.
#[derive(Debug)]
pub(crate) struct MinMaxAccumulator {
    arg: Arc<dyn ScalarExpr>,
    target: usize,
    direction: MinMax,
    indexed: bool,
    collator: Arc<dyn Collator>,
    current: Option<Value>,
}

impl MinMaxAccumulator {
    pub(crate) fn new(
        arg: Arc<dyn ScalarExpr>,
        target: usize,
        direction: MinMax,
        indexed: bool,
        collator: Arc<dyn Collator>,
    ) -> Self {
        MinMaxAccumulator {
            arg,
            target,
            direction,
            indexed,
            collator,
            current: None,
        }
    }
}

impl Accumulator for MinMaxAccumulator {
    fn begin_group(&mut self) -> Result<()> {
        self.current = None;
        Ok(())
    }

    fn absorb(&mut self, row: &Row) -> Result<()> {
        let value = match self.arg.evaluate(row)? {
            None => return Ok(()),
            Some(value) => value,
        };
        match &self.current {
            None => self.current = Some(value),
            Some(best) => {
                let ordering = compare_values(&value, best, self.collator.as_ref())?;
                let replace = match self.direction {
                    MinMax::Max => ordering == Ordering::Greater,
                    MinMax::Min => ordering == Ordering::Less,
                };
                if replace {
                    self.current = Some(value);
                }
            }
        }
        Ok(())
    }

    fn finalize(&mut self, output: &mut Row) -> Result<()> {
        output.set(self.target, self.current.take());
        Ok(())
    }

    fn release(&mut self) {}

    fn index_optimized(&self) -> bool {
        self.indexed
    }
}
