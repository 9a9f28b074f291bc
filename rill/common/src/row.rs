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

//! [`Row`], an owned record of nullable values

use crate::value::Value;

/// An owned record: a fixed-width vector of nullable values.
///
/// Slot indices are validated by the operators at plan time; out-of-range
/// access panics like slice indexing does.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Option<Value>>,
}

impl Row {
    /// A row of `width` NULL slots.
    pub fn new(width: usize) -> Self {
        Row {
            values: vec![None; width],
        }
    }

    /// A row over the given slot values.
    pub fn from_values(values: Vec<Option<Value>>) -> Self {
        Row { values }
    }

    /// Number of slots.
    pub fn width(&self) -> usize {
        self.values.len()
    }

    /// The value in a slot, `None` when the slot is NULL.
    pub fn get(&self, index: usize) -> &Option<Value> {
        &self.values[index]
    }

    /// Store a value (or NULL) into a slot.
    pub fn set(&mut self, index: usize, value: Option<Value>) {
        self.values[index] = value;
    }

    /// All slots in order.
    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    /// Consume the row, yielding its slots.
    pub fn into_values(self) -> Vec<Option<Value>> {
        self.values
    }
}
