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

//! SUM and AVG accumulators

use std::sync::Arc;

use rill_common::{rescale_int, Result, Row, Value};

use crate::aggregates::distinct::DistinctSet;
use crate::aggregates::Accumulator;
use crate::expr::ScalarExpr;

/// Whether a sum runs over scaled integers or doubles.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NumericMode {
    Int { scale: i8 },
    Float,
}

/// The running value of a numeric sum.
///
/// An integer sum holds an `i64` at its declared decimal scale for as long
/// as it can: a float input, or overflow while rescaling or adding, promotes
/// it to a double for the remainder of the group.
#[derive(Debug)]
pub(crate) enum NumericSum {
    Int { value: i64, scale: i8 },
    Float(f64),
}

impl NumericSum {
    fn identity(mode: NumericMode) -> Self {
        match mode {
            NumericMode::Int { scale } => NumericSum::Int { value: 0, scale },
            NumericMode::Float => NumericSum::Float(0.0),
        }
    }

    fn add(&mut self, value: &Value) -> Result<()> {
        match self {
            NumericSum::Int {
                value: acc,
                scale,
            } => match value {
                Value::Int64 {
                    value: v,
                    scale: vscale,
                } => {
                    let summed =
                        rescale_int(*v, *vscale, *scale).and_then(|r| acc.checked_add(r));
                    match summed {
                        Some(sum) => *acc = sum,
                        None => {
                            let current = Value::int64_scaled(*acc, *scale).to_f64()?;
                            *self = NumericSum::Float(current + value.to_f64()?);
                        }
                    }
                }
                _ => {
                    let current = Value::int64_scaled(*acc, *scale).to_f64()?;
                    *self = NumericSum::Float(current + value.to_f64()?);
                }
            },
            NumericSum::Float(acc) => *acc += value.to_f64()?,
        }
        Ok(())
    }

    fn value(&self) -> Value {
        match self {
            NumericSum::Int { value, scale } => Value::int64_scaled(*value, *scale),
            NumericSum::Float(f) => Value::Double(*f),
        }
    }

    /// `sum / count`, with integer division while unpromoted.
    fn average(&self, count: u64) -> Value {
        match self {
            NumericSum::Int { value, scale } => {
                Value::int64_scaled(value / count as i64, *scale)
            }
            NumericSum::Float(f) => Value::Double(f / count as f64),
        }
    }
}

/// `SUM(expr)` and `SUM(DISTINCT expr)` over either numeric mode.
#[derive(Debug)]
pub(crate) struct SumAccumulator {
    arg: Arc<dyn ScalarExpr>,
    target: usize,
    mode: NumericMode,
    distinct: Option<DistinctSet>,
    sum: NumericSum,
    nonnull_count: u64,
}

impl SumAccumulator {
    pub(crate) fn new(
        arg: Arc<dyn ScalarExpr>,
        target: usize,
        mode: NumericMode,
        distinct: Option<DistinctSet>,
    ) -> Self {
        SumAccumulator {
            arg,
            target,
            mode,
            distinct,
            sum: NumericSum::identity(mode),
            nonnull_count: 0,
        }
    }
}

impl Accumulator for SumAccumulator {
    fn begin_group(&mut self) -> Result<()> {
        self.sum = NumericSum::identity(self.mode);
        self.nonnull_count = 0;
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
        match &mut self.distinct {
            Some(set) => set.put(&value),
            None => {
                self.nonnull_count += 1;
                self.sum.add(&value)
            }
        }
    }

    fn finalize(&mut self, output: &mut Row) -> Result<()> {
        let SumAccumulator {
            distinct,
            sum,
            nonnull_count,
            ..
        } = self;
        if let Some(set) = distinct {
            set.finalize(&mut |value| {
                *nonnull_count += 1;
                sum.add(&value)
            })?;
        }
        let result = if self.nonnull_count == 0 {
            None
        } else {
            Some(self.sum.value())
        };
        output.set(self.target, result);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(set) = &mut self.distinct {
            set.reset();
        }
    }
}

/// `AVG(expr)` and `AVG(DISTINCT expr)`: a sum plus the non-null count as
/// divisor. An unpromoted integer average yields an integer quotient at the
/// declared scale, truncated toward zero.
#[derive(Debug)]
pub(crate) struct AvgAccumulator {
    arg: Arc<dyn ScalarExpr>,
    target: usize,
    mode: NumericMode,
    distinct: Option<DistinctSet>,
    sum: NumericSum,
    nonnull_count: u64,
}

impl AvgAccumulator {
    pub(crate) fn new(
        arg: Arc<dyn ScalarExpr>,
        target: usize,
        mode: NumericMode,
        distinct: Option<DistinctSet>,
    ) -> Self {
        AvgAccumulator {
            arg,
            target,
            mode,
            distinct,
            sum: NumericSum::identity(mode),
            nonnull_count: 0,
        }
    }
}

impl Accumulator for AvgAccumulator {
    fn begin_group(&mut self) -> Result<()> {
        self.sum = NumericSum::identity(self.mode);
        self.nonnull_count = 0;
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
        match &mut self.distinct {
            Some(set) => set.put(&value),
            None => {
                self.nonnull_count += 1;
                self.sum.add(&value)
            }
        }
    }

    fn finalize(&mut self, output: &mut Row) -> Result<()> {
        let AvgAccumulator {
            distinct,
            sum,
            nonnull_count,
            ..
        } = self;
        if let Some(set) = distinct {
            set.finalize(&mut |value| {
                *nonnull_count += 1;
                sum.add(&value)
            })?;
        }
        let result = if self.nonnull_count == 0 {
            None
        } else {
            Some(self.sum.average(self.nonnull_count))
        };
        output.set(self.target, result);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(set) = &mut self.distinct {
            set.reset();
        }
    }
}
