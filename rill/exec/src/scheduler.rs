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

//! Cooperative scheduling capability

use std::fmt::Debug;

/// Host capability invoked when an operator exhausts its scheduling quantum.
///
/// Operators call this at well-defined suspension points where all of their
/// state is consistent; the host may run other work before returning.
pub trait Scheduler: Debug + Send + Sync {
    fn reschedule(&self);
}

/// A scheduler that never actually yields, for hosts that run one request
/// at a time.
#[derive(Debug, Default)]
pub struct NoopScheduler;

impl Scheduler for NoopScheduler {
    fn reschedule(&self) {}
}
