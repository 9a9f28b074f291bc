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

//! Streaming aggregation
//!
//! [`AggregateCursor`] consumes a child cursor whose rows arrive sorted on
//! the grouping key (or form a single group) and emits one row per group.
//! Each aggregate is described by an [`AggregateSpec`] and computed by an
//! [`Accumulator`]; `DISTINCT` variants run their inputs through a
//! sort-backed [`DistinctSet`](distinct::DistinctSet) before applying the
//! underlying update rule.

mod count;
pub mod cursor;
pub mod distinct;
mod list;
mod min_max;
mod sum;

use std::fmt::Debug;
use std::sync::Arc;

use itertools::Itertools;
use rill_common::{Result, RillError, Row};

use crate::aggregates::count::CountAccumulator;
use crate::aggregates::distinct::{DistinctKeyDesc, DistinctSet};
use crate::aggregates::list::ListAccumulator;
use crate::aggregates::min_max::{MinMax, MinMaxAccumulator};
use crate::aggregates::sum::{AvgAccumulator, NumericMode, SumAccumulator};
use crate::context::ExecContext;
use crate::expr::ScalarExpr;

pub use crate::aggregates::cursor::AggregateCursor;
pub use crate::aggregates::distinct::PayloadKind;

/// The aggregate functions the engine computes.
///
/// `Int` sums and averages run over 64-bit integers at a fixed decimal
/// scale, `Float` ones over doubles. The `Indexed` MIN/MAX variants are
/// produced by the planner when the child is ordered so that the first row
/// of each group already carries the extremum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    CountAll,
    Count,
    CountDistinct,
    SumInt,
    SumIntDistinct,
    SumFloat,
    SumFloatDistinct,
    AvgInt,
    AvgIntDistinct,
    AvgFloat,
    AvgFloatDistinct,
    Min,
    Max,
    MinIndexed,
    MaxIndexed,
    List,
    ListDistinct,
}

impl AggregateKind {
    /// True for the `DISTINCT` variants, which require a
    /// [`DistinctKeyDesc`] on their spec.
    pub fn is_distinct(&self) -> bool {
        matches!(
            self,
            AggregateKind::CountDistinct
                | AggregateKind::SumIntDistinct
                | AggregateKind::SumFloatDistinct
                | AggregateKind::AvgIntDistinct
                | AggregateKind::AvgFloatDistinct
                | AggregateKind::ListDistinct
        )
    }

    /// Every kind except `COUNT(*)` takes an argument expression.
    pub fn takes_argument(&self) -> bool {
        !matches!(self, AggregateKind::CountAll)
    }

    /// True for the `LIST` kinds, which require a delimiter expression.
    pub fn is_list(&self) -> bool {
        matches!(self, AggregateKind::List | AggregateKind::ListDistinct)
    }
}

/// Plan-time description of one aggregate: what to compute, over which
/// argument, and into which output slot.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub kind: AggregateKind,
    /// Argument expression; `None` only for `COUNT(*)`.
    pub arg: Option<Arc<dyn ScalarExpr>>,
    /// Separator expression, `LIST` kinds only.
    pub delimiter: Option<Arc<dyn ScalarExpr>>,
    /// Output slot the finalized value is written to.
    pub target: usize,
    /// Decimal scale of the running value for integer SUM/AVG.
    pub scale: i8,
    /// Key layout for the deduplicating sort, `DISTINCT` kinds only.
    pub distinct_key: Option<DistinctKeyDesc>,
}

impl AggregateSpec {
    pub fn new(kind: AggregateKind, arg: Option<Arc<dyn ScalarExpr>>, target: usize) -> Self {
        AggregateSpec {
            kind,
            arg,
            delimiter: None,
            target,
            scale: 0,
            distinct_key: None,
        }
    }

    pub fn with_scale(mut self, scale: i8) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_delimiter(mut self, delimiter: Arc<dyn ScalarExpr>) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_distinct_key(mut self, distinct_key: DistinctKeyDesc) -> Self {
        self.distinct_key = Some(distinct_key);
        self
    }
}

/// One grouping column: the expression whose value change marks a group
/// boundary, optionally copied through to an output slot.
#[derive(Debug, Clone)]
pub struct GroupExpr {
    pub expr: Arc<dyn ScalarExpr>,
    pub output: Option<usize>,
}

impl GroupExpr {
    pub fn new(expr: Arc<dyn ScalarExpr>) -> Self {
        GroupExpr { expr, output: None }
    }

    pub fn with_output(mut self, slot: usize) -> Self {
        self.output = Some(slot);
        self
    }
}

/// Per-group running state for one aggregate.
///
/// An accumulator lives for the whole scan; `begin_group` resets it to the
/// aggregate's identity before each group, `absorb` folds in one input row,
/// and `finalize` writes the group result (or NULL) into the target slot.
/// `release` drops transient resources without producing a result and is
/// invoked on every error path.
pub trait Accumulator: Debug + Send {
    fn begin_group(&mut self) -> Result<()>;

    fn absorb(&mut self, row: &Row) -> Result<()>;

    fn finalize(&mut self, output: &mut Row) -> Result<()>;

    fn release(&mut self);

    /// True when the planner mapped this aggregate to an index so that the
    /// first row of every group already carries the result.
    fn index_optimized(&self) -> bool {
        false
    }
}

fn validate(spec: &AggregateSpec) -> Result<()> {
    if spec.kind.takes_argument() != spec.arg.is_some() {
        return Err(RillError::Internal(format!(
            "{:?} {} an argument expression",
            spec.kind,
            if spec.kind.takes_argument() {
                "requires"
            } else {
                "does not take"
            }
        )));
    }
    if spec.kind.is_list() != spec.delimiter.is_some() {
        return Err(RillError::Internal(format!(
            "{:?} {} a delimiter expression",
            spec.kind,
            if spec.kind.is_list() {
                "requires"
            } else {
                "does not take"
            }
        )));
    }
    if spec.kind.is_distinct() != spec.distinct_key.is_some() {
        return Err(RillError::Internal(format!(
            "{:?} {} a distinct key layout",
            spec.kind,
            if spec.kind.is_distinct() {
                "requires"
            } else {
                "does not take"
            }
        )));
    }
    Ok(())
}

/// Build the accumulator for one spec.
pub fn create_accumulator(
    spec: &AggregateSpec,
    ctx: &Arc<ExecContext>,
) -> Result<Box<dyn Accumulator>> {
    validate(spec)?;

    let distinct = spec.distinct_key.clone().map(|desc| {
        DistinctSet::new(desc, Arc::clone(ctx.sorts()), Arc::clone(ctx.collator()))
    });

    if let AggregateKind::CountAll | AggregateKind::Count | AggregateKind::CountDistinct =
        spec.kind
    {
        return Ok(Box::new(CountAccumulator::new(
            spec.arg.clone(),
            spec.target,
            distinct,
        )));
    }

    let arg = match spec.arg.clone() {
        Some(arg) => arg,
        // just checked by validate()
        None => unreachable!(),
    };

    Ok(match spec.kind {
        AggregateKind::SumInt | AggregateKind::SumIntDistinct => Box::new(SumAccumulator::new(
            arg,
            spec.target,
            NumericMode::Int { scale: spec.scale },
            distinct,
        )),
        AggregateKind::SumFloat | AggregateKind::SumFloatDistinct => Box::new(
            SumAccumulator::new(arg, spec.target, NumericMode::Float, distinct),
        ),
        AggregateKind::AvgInt | AggregateKind::AvgIntDistinct => Box::new(AvgAccumulator::new(
            arg,
            spec.target,
            NumericMode::Int { scale: spec.scale },
            distinct,
        )),
        AggregateKind::AvgFloat | AggregateKind::AvgFloatDistinct => Box::new(
            AvgAccumulator::new(arg, spec.target, NumericMode::Float, distinct),
        ),
        AggregateKind::Min | AggregateKind::MinIndexed => Box::new(MinMaxAccumulator::new(
            arg,
            spec.target,
            MinMax::Min,
            spec.kind == AggregateKind::MinIndexed,
            Arc::clone(ctx.collator()),
        )),
        AggregateKind::Max | AggregateKind::MaxIndexed => Box::new(MinMaxAccumulator::new(
            arg,
            spec.target,
            MinMax::Max,
            spec.kind == AggregateKind::MaxIndexed,
            Arc::clone(ctx.collator()),
        )),
        AggregateKind::List | AggregateKind::ListDistinct => {
            let delimiter = match spec.delimiter.clone() {
                Some(delimiter) => delimiter,
                // just checked by validate()
                None => unreachable!(),
            };
            Box::new(ListAccumulator::new(
                arg,
                delimiter,
                spec.target,
                distinct,
                Arc::clone(ctx.blobs()),
            ))
        }
        AggregateKind::CountAll | AggregateKind::Count | AggregateKind::CountDistinct => {
            // handled above
            unreachable!()
        }
    })
}

/// Build the accumulators for a bank of specs.
pub fn create_accumulators(
    specs: &[AggregateSpec],
    ctx: &Arc<ExecContext>,
) -> Result<Vec<Box<dyn Accumulator>>> {
    specs
        .iter()
        .map(|spec| create_accumulator(spec, ctx))
        .try_collect()
}
