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

//! Execution layer of the Rill query engine.
//!
//! Operators are pull-based [`RecordCursor`](cursor::RecordCursor)s over
//! [`Row`](rill_common::Row)s. The host supplies external sorting,
//! large-object storage, collation, and cooperative scheduling as narrow
//! capabilities bundled in an [`ExecContext`]; in-memory implementations of
//! each are provided for embedding and tests.
//!
//! The aggregation operator lives in [`aggregates`].

pub mod aggregates;
pub mod blob;
pub mod collation;
pub mod context;
pub mod cursor;
pub mod expr;
pub mod scheduler;
pub mod sort;

pub use context::ExecContext;
