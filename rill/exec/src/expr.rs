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

//! Scalar expressions evaluated against a single row

use std::fmt::Debug;

use rill_common::{Result, RillError, Row, Value};

/// A scalar expression evaluated against one row at a time.
///
/// `Ok(None)` is SQL NULL. Planning and type derivation live with the host;
/// the engine only ever evaluates.
pub trait ScalarExpr: Debug + Send + Sync {
    fn evaluate(&self, row: &Row) -> Result<Option<Value>>;
}

/// A reference to one input slot.
#[derive(Debug, Clone)]
pub struct Column {
    index: usize,
}

impl Column {
    pub fn new(index: usize) -> Self {
        Column { index }
    }
}

impl ScalarExpr for Column {
    fn evaluate(&self, row: &Row) -> Result<Option<Value>> {
        if self.index >= row.width() {
            return Err(RillError::Internal(format!(
                "column {} out of range for row of width {}",
                self.index,
                row.width()
            )));
        }
        Ok(row.get(self.index).clone())
    }
}

/// A constant value, including the NULL constant.
#[derive(Debug, Clone)]
pub struct Literal {
    value: Option<Value>,
}

impl Literal {
    pub fn new(value: Option<Value>) -> Self {
        Literal { value }
    }
}

impl ScalarExpr for Literal {
    fn evaluate(&self, _row: &Row) -> Result<Option<Value>> {
        Ok(self.value.clone())
    }
}
