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

//! Error types for the Rill engine

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::result;

/// Result type for operations that could result in a [RillError]
pub type Result<T, E = RillError> = result::Result<T, E>;

/// Rill error
#[derive(Debug)]
pub enum RillError {
    /// Error raised by a child cursor or an expression evaluator and passed
    /// through without additional context.
    Upstream(Box<dyn Error + Send + Sync>),
    /// A capability ran out of resources: sort initialization, large-object
    /// creation, or memory allocation failed.
    ResourcesExhausted(String),
    /// A value could not be encoded into its declared key layout, typically
    /// because collation key derivation failed.
    InvalidEncoding(String),
    /// An internal invariant was violated.
    /// This error should not happen and signifies a bug.
    Internal(String),
}

impl Display for RillError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            RillError::Upstream(e) => {
                write!(f, "Upstream error: {e}")
            }
            RillError::ResourcesExhausted(ref desc) => {
                write!(f, "Resources exhausted: {desc}")
            }
            RillError::InvalidEncoding(ref desc) => {
                write!(f, "Invalid encoding: {desc}")
            }
            RillError::Internal(ref desc) => {
                write!(
                    f,
                    "Internal error: {desc}.\nThis was likely caused by a bug in \
                     Rill's code and we would welcome that you file a bug report \
                     in our issue tracker"
                )
            }
        }
    }
}

impl Error for RillError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RillError::Upstream(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
