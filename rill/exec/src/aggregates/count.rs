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

//! COUNT accumulators

use std::sync::Arc;

use rill_common::{Result, Row, Value};

use crate::aggregates::distinct::DistinctSet;
use crate::aggregates::Accumulator;
use crate::expr::ScalarExpr;

/// `COUNT(*)`, `COUNT(expr)`, and `COUNT(DISTINCT expr)`.
///
/// Without an argument every row counts; with one, only rows where the
/// argument is non-null. COUNT is the one family that finalizes to zero
/// rather than NULL for an empty group.
#[derive(Debug)]
pub(crate) struct CountAccumulator {
    arg: Option<Arc<dyn ScalarExpr>>,
    target: usize,
    distinct: Option<DistinctSet>,
    count: i64,
}

impl CountAccumulator {
    pub(crate) fn new(
        arg: Option<Arc<dyn ScalarExpr>>,
        target: usize,
        distinct: Option<DistinctSet>,
    ) -> Self {
        CountAccumulator {
            arg,
            target,
            distinct,
            count: 0,
        }
    }
}

impl Accumulator for CountAccumulator {
    fn begin_group(&mut self) -> Result<()> {
        self.count = 0;
        if let Some(set) = &mut self.distinct {
            set.open()?;
        }
        Ok(())
    }

    fn absorb(&mut self, row: &Row) -> Result<()> {
        let expr = match &self.arg {
            None => {
                self.count += 1;
                return Ok(());
            }
            Some(expr) => expr,
        };
        let value = match expr.evaluate(row)? {
            None => return Ok(()),
            Some(value) => value,
        };
        match &mut self.distinct {
            Some(set) => set.put(&value),
            None => {
                self.count += 1;
                Ok(())
            }
        }
    }

    fn finalize(&mut self, output: &mut Row) -> Result<()> {
        let CountAccumulator {
            distinct, count, ..
        } = self;
        if let Some(set) = distinct {
            set.finalize(&mut |_value| {
                *count += 1;
                Ok(())
            })?;
        }
        output.set(self.target, Some(Value::int64(self.count)));
        Ok(())
    }

    fn release(&mut self) {
        if let Some(set) = &mut self.distinct {
            set.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::aggregates::distinct::{DistinctKeyDesc, PayloadKind};
    use crate::collation::BuiltinCollator;
    use crate::expr::Column;
    use crate::sort::InMemorySortSpace;

    use super::*;

    fn rows(values: &[Option<i64>]) -> Vec<Row> {
        values
            .iter()
            .map(|v| Row::from_values(vec![v.map(Value::int64)]))
            .collect()
    }

    fn run(mut acc: CountAccumulator, input: &[Option<i64>]) -> Option<Value> {
        acc.begin_group().unwrap();
        for row in rows(input) {
            acc.absorb(&row).unwrap();
        }
        let mut out = Row::new(1);
        acc.finalize(&mut out).unwrap();
        out.get(0).clone()
    }

    #[test]
    fn count_all_counts_every_row() {
        let acc = CountAccumulator::new(None, 0, None);
        assert_eq!(
            run(acc, &[Some(1), None, Some(1)]),
            Some(Value::int64(3))
        );
    }

    #[test]
    fn count_skips_nulls() {
        let acc = CountAccumulator::new(Some(Arc::new(Column::new(0))), 0, None);
        assert_eq!(
            run(acc, &[Some(1), None, Some(1)]),
            Some(Value::int64(2))
        );
    }

    #[test]
    fn count_of_empty_group_is_zero() {
        let acc = CountAccumulator::new(Some(Arc::new(Column::new(0))), 0, None);
        assert_eq!(run(acc, &[]), Some(Value::int64(0)));
    }

    #[test]
    fn count_distinct_counts_unique_values() {
        let set = DistinctSet::new(
            DistinctKeyDesc::new(PayloadKind::Int64 { scale: 0 }),
            Arc::new(InMemorySortSpace::new()),
            Arc::new(BuiltinCollator),
        );
        let acc = CountAccumulator::new(Some(Arc::new(Column::new(0))), 0, Some(set));
        assert_eq!(
            run(acc, &[Some(1), Some(2), Some(2), None, Some(3), Some(1)]),
            Some(Value::int64(3))
        );
    }
}
