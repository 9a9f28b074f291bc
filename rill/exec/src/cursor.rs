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

//! The pull-based record cursor contract shared by all operators

use std::fmt::Debug;

use rill_common::{Result, Row};

/// A pull-based iterator over records.
///
/// Cursors are re-runnable: `open` resets the cursor to its initial position
/// and may be called again after `close`. `next` returns `Ok(None)` at end
/// of stream; once it has returned an error the cursor is terminal and every
/// further `next` returns `Ok(None)`.
pub trait RecordCursor: Debug + Send {
    /// Prepare the cursor for iteration, resetting any prior position.
    fn open(&mut self) -> Result<()>;

    /// Fetch the next record, or `None` at end of stream.
    fn next(&mut self) -> Result<Option<Row>>;

    /// Release all resources held by the cursor. Idempotent.
    fn close(&mut self);

    /// Invalidate positional bookmarks held by this cursor and,
    /// recursively, by its children, forcing the next fetch to re-read.
    fn invalidate(&mut self);
}

/// A cursor over an in-memory set of rows, mainly useful for embedding
/// small relations and for tests.
#[derive(Debug, Clone)]
pub struct MemoryCursor {
    rows: Vec<Row>,
    position: usize,
}

impl MemoryCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        MemoryCursor { rows, position: 0 }
    }
}

impl RecordCursor for MemoryCursor {
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
            None => Ok(None),
        }
    }

    fn close(&mut self) {}

    fn invalidate(&mut self) {}
}

#[cfg(test)]
mod tests {
    use rill_common::Value;

    use super::*;

    #[test]
    fn memory_cursor_replays_on_reopen() {
        let mut cursor = MemoryCursor::new(vec![
            Row::from_values(vec![Some(Value::int64(1))]),
            Row::from_values(vec![Some(Value::int64(2))]),
        ]);

        cursor.open().unwrap();
        assert_eq!(
            cursor.next().unwrap().unwrap().get(0),
            &Some(Value::int64(1))
        );
        assert_eq!(
            cursor.next().unwrap().unwrap().get(0),
            &Some(Value::int64(2))
        );
        assert!(cursor.next().unwrap().is_none());

        cursor.open().unwrap();
        assert_eq!(
            cursor.next().unwrap().unwrap().get(0),
            &Some(Value::int64(1))
        );
    }
}
