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

//! End-to-end tests for the streaming aggregation operator

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use rill_common::{CollationId, Result, RillError, Row, Value};
use rill_exec::aggregates::{
    distinct::DistinctKeyDesc, AggregateCursor, AggregateKind, AggregateSpec, GroupExpr,
    PayloadKind,
};
use rill_exec::blob::{BlobStore, InMemoryBlobStore};
use rill_exec::collation::BuiltinCollator;
use rill_exec::cursor::{MemoryCursor, RecordCursor};
use rill_exec::expr::{Column, Literal};
use rill_exec::scheduler::{NoopScheduler, Scheduler};
use rill_exec::sort::{InMemorySortSpace, SortSpace};
use rill_exec::ExecContext;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn int_rows(rows: &[&[Option<i64>]]) -> Vec<Row> {
    rows.iter()
        .map(|row| Row::from_values(row.iter().map(|v| v.map(Value::int64)).collect()))
        .collect()
}

fn drain(cursor: &mut AggregateCursor) -> Vec<Vec<Option<Value>>> {
    let mut out = Vec::new();
    while let Some(row) = cursor.next().unwrap() {
        out.push(row.into_values());
    }
    out
}

/// An execution context whose in-memory capabilities stay observable.
struct Harness {
    sorts: Arc<InMemorySortSpace>,
    blobs: Arc<InMemoryBlobStore>,
    ctx: Arc<ExecContext>,
}

impl Harness {
    fn new() -> Self {
        Harness::with_sorts(Arc::new(InMemorySortSpace::new()))
    }

    fn with_sorts(sorts: Arc<InMemorySortSpace>) -> Self {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let ctx = Arc::new(ExecContext::new(
            Arc::clone(&sorts) as Arc<dyn SortSpace>,
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            Arc::new(BuiltinCollator),
            Arc::new(NoopScheduler),
        ));
        Harness { sorts, blobs, ctx }
    }

    fn assert_clean(&self) {
        assert_eq!(self.sorts.open_runs(), 0, "distinct sort left open");
        assert_eq!(self.blobs.open_writers(), 0, "blob writer left open");
    }
}

fn int_distinct_key() -> DistinctKeyDesc {
    DistinctKeyDesc::new(PayloadKind::Int64 { scale: 0 })
}

#[test]
fn empty_input_without_grouping_emits_identity_row() -> Result<()> {
    init_logs();
    let harness = Harness::new();
    let mut cursor = AggregateCursor::try_new(
        Box::new(MemoryCursor::new(Vec::new())),
        Vec::new(),
        vec![
            AggregateSpec::new(AggregateKind::CountAll, None, 0),
            AggregateSpec::new(AggregateKind::SumInt, Some(Arc::new(Column::new(0))), 1),
            AggregateSpec::new(AggregateKind::Min, Some(Arc::new(Column::new(0))), 2),
        ],
        3,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    let row = cursor.next()?.expect("one identity row");
    assert_eq!(row.values(), &[Some(Value::int64(0)), None, None]);
    assert!(cursor.next()?.is_none());
    assert!(cursor.next()?.is_none());
    cursor.close();
    harness.assert_clean();
    Ok(())
}

#[test]
fn empty_input_with_grouping_emits_nothing() -> Result<()> {
    let harness = Harness::new();
    let mut cursor = AggregateCursor::try_new(
        Box::new(MemoryCursor::new(Vec::new())),
        vec![GroupExpr::new(Arc::new(Column::new(0))).with_output(0)],
        vec![AggregateSpec::new(
            AggregateKind::CountDistinct,
            Some(Arc::new(Column::new(0))),
            1,
        )
        .with_distinct_key(int_distinct_key())],
        2,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    assert!(cursor.next()?.is_none());
    // the distinct sort opened for the first group must be gone again
    harness.assert_clean();
    cursor.close();
    Ok(())
}

#[test]
fn single_group_with_mixed_nulls() -> Result<()> {
    let harness = Harness::new();
    let child = MemoryCursor::new(int_rows(&[
        &[Some(1), Some(10)],
        &[Some(1), None],
        &[Some(1), Some(30)],
    ]));
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        vec![GroupExpr::new(Arc::new(Column::new(0))).with_output(0)],
        vec![
            AggregateSpec::new(AggregateKind::Count, Some(Arc::new(Column::new(1))), 1),
            AggregateSpec::new(AggregateKind::SumInt, Some(Arc::new(Column::new(1))), 2),
            AggregateSpec::new(AggregateKind::AvgInt, Some(Arc::new(Column::new(1))), 3),
        ],
        4,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    assert_eq!(
        drain(&mut cursor),
        vec![vec![
            Some(Value::int64(1)),
            Some(Value::int64(2)),
            Some(Value::int64(40)),
            Some(Value::int64(20)),
        ]]
    );
    cursor.close();
    harness.assert_clean();
    Ok(())
}

#[test]
fn multiple_groups_including_an_all_null_one() -> Result<()> {
    let harness = Harness::new();
    let child = MemoryCursor::new(int_rows(&[
        &[Some(1), Some(5)],
        &[Some(1), Some(7)],
        &[Some(2), Some(3)],
        &[Some(2), Some(3)],
        &[Some(3), None],
    ]));
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        vec![GroupExpr::new(Arc::new(Column::new(0))).with_output(0)],
        vec![
            AggregateSpec::new(AggregateKind::Count, Some(Arc::new(Column::new(1))), 1),
            AggregateSpec::new(AggregateKind::SumInt, Some(Arc::new(Column::new(1))), 2),
        ],
        3,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    assert_eq!(
        drain(&mut cursor),
        vec![
            vec![
                Some(Value::int64(1)),
                Some(Value::int64(2)),
                Some(Value::int64(12))
            ],
            vec![
                Some(Value::int64(2)),
                Some(Value::int64(2)),
                Some(Value::int64(6))
            ],
            vec![Some(Value::int64(3)), Some(Value::int64(0)), None],
        ]
    );
    cursor.close();
    harness.assert_clean();
    Ok(())
}

#[test]
fn distinct_aggregates_over_a_single_group() -> Result<()> {
    let harness = Harness::new();
    let child = MemoryCursor::new(int_rows(&[
        &[Some(1)],
        &[Some(2)],
        &[Some(2)],
        &[Some(3)],
        &[Some(1)],
    ]));
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        Vec::new(),
        vec![
            AggregateSpec::new(
                AggregateKind::SumIntDistinct,
                Some(Arc::new(Column::new(0))),
                0,
            )
            .with_distinct_key(int_distinct_key()),
            AggregateSpec::new(
                AggregateKind::CountDistinct,
                Some(Arc::new(Column::new(0))),
                1,
            )
            .with_distinct_key(int_distinct_key()),
        ],
        2,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    assert_eq!(
        drain(&mut cursor),
        vec![vec![Some(Value::int64(6)), Some(Value::int64(3))]]
    );
    cursor.close();
    harness.assert_clean();
    Ok(())
}

#[test]
fn distinct_average_per_group() -> Result<()> {
    let harness = Harness::new();
    let child = MemoryCursor::new(int_rows(&[
        &[Some(1), Some(10)],
        &[Some(1), Some(10)],
        &[Some(1), Some(40)],
        &[Some(2), None],
    ]));
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        vec![GroupExpr::new(Arc::new(Column::new(0))).with_output(0)],
        vec![AggregateSpec::new(
            AggregateKind::AvgIntDistinct,
            Some(Arc::new(Column::new(1))),
            1,
        )
        .with_distinct_key(int_distinct_key())],
        2,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    assert_eq!(
        drain(&mut cursor),
        vec![
            // (10 + 40) / 2 unique values
            vec![Some(Value::int64(1)), Some(Value::int64(25))],
            vec![Some(Value::int64(2)), None],
        ]
    );
    cursor.close();
    harness.assert_clean();
    Ok(())
}

#[test]
fn list_aggregate_builds_a_blob() -> Result<()> {
    let harness = Harness::new();
    let child = MemoryCursor::new(vec![
        Row::from_values(vec![Some(Value::text("a"))]),
        Row::from_values(vec![Some(Value::text("b"))]),
        Row::from_values(vec![None]),
        Row::from_values(vec![Some(Value::text("c"))]),
    ]);
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        Vec::new(),
        vec![AggregateSpec::new(
            AggregateKind::List,
            Some(Arc::new(Column::new(0))),
            0,
        )
        .with_delimiter(Arc::new(Literal::new(Some(Value::text(", ")))))],
        1,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    let rows = drain(&mut cursor);
    let blob = match &rows[0][0] {
        Some(Value::Blob { id, .. }) => harness.blobs.read(*id)?,
        other => panic!("expected a blob, got {other:?}"),
    };
    assert_eq!(blob, b"a, b, c");
    cursor.close();
    harness.assert_clean();
    Ok(())
}

#[test]
fn list_with_null_delimiter_taints_to_null() -> Result<()> {
    let harness = Harness::new();
    // the delimiter is a column: "-" on the first row, NULL on the second
    let child = MemoryCursor::new(vec![
        Row::from_values(vec![Some(Value::text("a")), Some(Value::text("-"))]),
        Row::from_values(vec![Some(Value::text("b")), None]),
    ]);
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        Vec::new(),
        vec![AggregateSpec::new(
            AggregateKind::List,
            Some(Arc::new(Column::new(0))),
            0,
        )
        .with_delimiter(Arc::new(Column::new(1)))],
        1,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    assert_eq!(drain(&mut cursor), vec![vec![None]]);
    assert_eq!(harness.blobs.blob_count(), 0);
    cursor.close();
    harness.assert_clean();
    Ok(())
}

#[test]
fn distinct_list_dedups_case_insensitively() -> Result<()> {
    let harness = Harness::new();
    let rows = ["b", "A", "a", "b"]
        .iter()
        .map(|v| {
            Row::from_values(vec![Some(Value::text_with_collation(
                *v,
                CollationId::CASE_INSENSITIVE,
            ))])
        })
        .collect();
    let mut cursor = AggregateCursor::try_new(
        Box::new(MemoryCursor::new(rows)),
        Vec::new(),
        vec![AggregateSpec::new(
            AggregateKind::ListDistinct,
            Some(Arc::new(Column::new(0))),
            0,
        )
        .with_delimiter(Arc::new(Literal::new(Some(Value::text(",")))))
        .with_distinct_key(
            DistinctKeyDesc::new(PayloadKind::Text {
                max_len: 4,
                collation: CollationId::CASE_INSENSITIVE,
            })
            .with_collation_key(),
        )],
        1,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    let rows = drain(&mut cursor);
    let blob = match &rows[0][0] {
        Some(Value::Blob { id, .. }) => harness.blobs.read(*id)?,
        other => panic!("expected a blob, got {other:?}"),
    };
    assert_eq!(blob, b"A,b");
    cursor.close();
    harness.assert_clean();
    Ok(())
}

#[test]
fn case_insensitive_keys_share_a_group() -> Result<()> {
    let harness = Harness::new();
    let rows = ["a", "A", "b"]
        .iter()
        .map(|v| {
            Row::from_values(vec![Some(Value::text_with_collation(
                *v,
                CollationId::CASE_INSENSITIVE,
            ))])
        })
        .collect();
    let mut cursor = AggregateCursor::try_new(
        Box::new(MemoryCursor::new(rows)),
        vec![GroupExpr::new(Arc::new(Column::new(0))).with_output(0)],
        vec![AggregateSpec::new(AggregateKind::CountAll, None, 1)],
        2,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    assert_eq!(
        drain(&mut cursor),
        vec![
            // the projected key follows the last absorbed row of the group
            vec![
                Some(Value::text_with_collation("A", CollationId::CASE_INSENSITIVE)),
                Some(Value::int64(2)),
            ],
            vec![
                Some(Value::text_with_collation("b", CollationId::CASE_INSENSITIVE)),
                Some(Value::int64(1)),
            ],
        ]
    );
    cursor.close();
    Ok(())
}

/// A child that yields a few rows, then fails.
#[derive(Debug)]
struct FailingCursor {
    rows: Vec<Row>,
    position: usize,
}

impl RecordCursor for FailingCursor {
    fn open(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        match self.rows.get(self.position) {
            Some(row) => {
                self.position += 1;
                Ok(Some(row.clone()))
            }
            None => Err(RillError::Upstream(Box::new(std::io::Error::other(
                "simulated child failure",
            )))),
        }
    }

    fn close(&mut self) {}

    fn invalidate(&mut self) {}
}

#[test]
fn child_error_releases_every_resource() -> Result<()> {
    init_logs();
    let harness = Harness::new();
    let child = FailingCursor {
        rows: vec![
            Row::from_values(vec![Some(Value::int64(1)), Some(Value::text("x"))]),
            Row::from_values(vec![Some(Value::int64(1)), Some(Value::text("y"))]),
        ],
        position: 0,
    };
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        vec![GroupExpr::new(Arc::new(Column::new(0))).with_output(0)],
        vec![
            AggregateSpec::new(
                AggregateKind::CountDistinct,
                Some(Arc::new(Column::new(1))),
                1,
            )
            .with_distinct_key(DistinctKeyDesc::new(PayloadKind::Text {
                max_len: 8,
                collation: CollationId::BINARY,
            })),
            AggregateSpec::new(AggregateKind::List, Some(Arc::new(Column::new(1))), 2)
                .with_delimiter(Arc::new(Literal::new(Some(Value::text("-"))))),
        ],
        3,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    // mid-group, the distinct sort and the blob writer are live; the child
    // error must tear both down before it surfaces
    let err = cursor.next().unwrap_err();
    assert!(matches!(err, RillError::Upstream(_)));
    harness.assert_clean();
    assert_eq!(harness.blobs.blob_count(), 0);

    // the cursor is terminal now
    assert!(cursor.next()?.is_none());
    cursor.close();
    Ok(())
}

#[test]
fn exhausted_sort_budget_surfaces_and_cleans_up() -> Result<()> {
    let harness = Harness::with_sorts(Arc::new(InMemorySortSpace::with_byte_budget(8)));
    let child = MemoryCursor::new(int_rows(&[&[Some(1)], &[Some(2)]]));
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        Vec::new(),
        vec![AggregateSpec::new(
            AggregateKind::SumIntDistinct,
            Some(Arc::new(Column::new(0))),
            0,
        )
        .with_distinct_key(int_distinct_key())],
        1,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    let err = cursor.next().unwrap_err();
    assert!(matches!(err, RillError::ResourcesExhausted(_)));
    harness.assert_clean();
    cursor.close();
    Ok(())
}

#[test]
fn close_is_idempotent() -> Result<()> {
    let harness = Harness::new();
    let child = MemoryCursor::new(int_rows(&[&[Some(1)], &[Some(1)]]));
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        vec![GroupExpr::new(Arc::new(Column::new(0))).with_output(0)],
        vec![AggregateSpec::new(
            AggregateKind::CountDistinct,
            Some(Arc::new(Column::new(0))),
            1,
        )
        .with_distinct_key(int_distinct_key())],
        2,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    let _ = cursor.next()?;
    cursor.close();
    cursor.close();
    harness.assert_clean();
    assert!(cursor.next()?.is_none());
    Ok(())
}

/// A child that counts how many rows were pulled from it.
#[derive(Debug)]
struct CountingCursor {
    inner: MemoryCursor,
    fetches: Arc<AtomicUsize>,
}

impl RecordCursor for CountingCursor {
    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.next()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn invalidate(&mut self) {
        self.inner.invalidate();
    }
}

#[test]
fn indexed_min_reads_exactly_one_row() -> Result<()> {
    let harness = Harness::new();
    let fetches = Arc::new(AtomicUsize::new(0));
    let child = CountingCursor {
        inner: MemoryCursor::new(int_rows(&[&[Some(1)], &[Some(5)], &[Some(9)]])),
        fetches: Arc::clone(&fetches),
    };
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        Vec::new(),
        vec![AggregateSpec::new(
            AggregateKind::MinIndexed,
            Some(Arc::new(Column::new(0))),
            0,
        )],
        1,
        Arc::clone(&harness.ctx),
    )?;

    cursor.open()?;
    assert_eq!(drain(&mut cursor), vec![vec![Some(Value::int64(1))]]);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    cursor.close();
    Ok(())
}

#[derive(Debug, Default)]
struct CountingScheduler {
    yields: AtomicUsize,
}

impl Scheduler for CountingScheduler {
    fn reschedule(&self) {
        self.yields.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn absorb_loop_yields_every_quantum() -> Result<()> {
    let scheduler = Arc::new(CountingScheduler::default());
    let ctx = Arc::new(
        ExecContext::new(
            Arc::new(InMemorySortSpace::new()),
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(BuiltinCollator),
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
        )
        .with_quantum(2),
    );
    let rows: Vec<&[Option<i64>]> = vec![&[Some(7)]; 10];
    let child = MemoryCursor::new(int_rows(&rows));
    let mut cursor = AggregateCursor::try_new(
        Box::new(child),
        Vec::new(),
        vec![AggregateSpec::new(AggregateKind::CountAll, None, 0)],
        1,
        ctx,
    )?;

    cursor.open()?;
    assert_eq!(drain(&mut cursor), vec![vec![Some(Value::int64(10))]]);
    // ten loop entries with a quantum of two yield on the 3rd, 6th and 9th
    assert_eq!(scheduler.yields.load(Ordering::SeqCst), 3);
    cursor.close();
    Ok(())
}

#[test]
fn randomized_groups_agree_with_a_naive_fold() -> Result<()> {
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let group_count = rng.gen_range(1..=6);
        let mut rows: Vec<Vec<Option<i64>>> = Vec::new();
        let mut expected = Vec::new();
        for key in 0..group_count {
            let size = rng.gen_range(1..=5);
            let mut values = Vec::new();
            for _ in 0..size {
                let value = if rng.gen_bool(0.25) {
                    None
                } else {
                    Some(rng.gen_range(-50i64..50))
                };
                values.push(value);
                rows.push(vec![Some(key), value]);
            }
            let present: Vec<i64> = values.iter().flatten().copied().collect();
            let count = present.len() as i64;
            let sum = present.iter().sum::<i64>();
            expected.push(vec![
                Some(Value::int64(key)),
                Some(Value::int64(count)),
                (count > 0).then(|| Value::int64(sum)),
                (count > 0).then(|| Value::int64(sum / count)),
                present.iter().min().map(|v| Value::int64(*v)),
                present.iter().max().map(|v| Value::int64(*v)),
            ]);
        }

        let child = MemoryCursor::new(
            rows.iter()
                .map(|row| Row::from_values(row.iter().map(|v| v.map(Value::int64)).collect()))
                .collect(),
        );
        let arg = || -> Arc<dyn rill_exec::expr::ScalarExpr> { Arc::new(Column::new(1)) };
        let mut cursor = AggregateCursor::try_new(
            Box::new(child),
            vec![GroupExpr::new(Arc::new(Column::new(0))).with_output(0)],
            vec![
                AggregateSpec::new(AggregateKind::Count, Some(arg()), 1),
                AggregateSpec::new(AggregateKind::SumInt, Some(arg()), 2),
                AggregateSpec::new(AggregateKind::AvgInt, Some(arg()), 3),
                AggregateSpec::new(AggregateKind::Min, Some(arg()), 4),
                AggregateSpec::new(AggregateKind::Max, Some(arg()), 5),
            ],
            6,
            Arc::new(ExecContext::default()),
        )?;

        cursor.open()?;
        assert_eq!(drain(&mut cursor), expected);
        cursor.close();
    }
    Ok(())
}
