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

//! [`Value`], the single-row value representation of the engine

use std::cmp::Ordering;

use crate::error::{Result, RillError};

/// Identifies the collation of a text value.
///
/// The engine itself only understands [`CollationId::BINARY`]; everything
/// else is resolved by the host's collator capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollationId(pub u16);

impl CollationId {
    /// Bytewise comparison, no key derivation needed.
    pub const BINARY: CollationId = CollationId(0);
    /// ASCII case-insensitive comparison, understood by the built-in collator.
    pub const CASE_INSENSITIVE: CollationId = CollationId(1);
}

/// Opaque handle to a large object minted by the host's blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub u64);

/// A single typed value.
///
/// SQL NULL is represented as `Option<Value>::None` wherever a value crosses
/// an interface; `Value` itself is always a concrete value.
///
/// `Int64` carries a fixed decimal scale: the numeric value is
/// `value * 10^scale`, so `Int64 { value: 1234, scale: -2 }` is `12.34`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit integer with a fixed decimal scale
    Int64 { value: i64, scale: i8 },
    /// Double precision float
    Double(f64),
    /// Text under a collation
    Text { value: String, collation: CollationId },
    /// Handle to a large object
    Blob { id: BlobId, collation: CollationId },
}

impl Value {
    /// An `Int64` at scale zero.
    pub fn int64(value: i64) -> Self {
        Value::Int64 { value, scale: 0 }
    }

    /// An `Int64` at the given decimal scale.
    pub fn int64_scaled(value: i64, scale: i8) -> Self {
        Value::Int64 { value, scale }
    }

    /// A `Double`.
    pub fn double(value: f64) -> Self {
        Value::Double(value)
    }

    /// Binary-collated text.
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text {
            value: value.into(),
            collation: CollationId::BINARY,
        }
    }

    /// Text under the given collation.
    pub fn text_with_collation(value: impl Into<String>, collation: CollationId) -> Self {
        Value::Text {
            value: value.into(),
            collation,
        }
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int64 { .. } => "Int64",
            Value::Double(_) => "Double",
            Value::Text { .. } => "Text",
            Value::Blob { .. } => "Blob",
        }
    }

    /// The collation of a text value, [`CollationId::BINARY`] for anything else.
    pub fn text_collation(&self) -> CollationId {
        match self {
            Value::Text { collation, .. } => *collation,
            _ => CollationId::BINARY,
        }
    }

    /// The numeric value as a double.
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            Value::Int64 { value, scale } => {
                Ok(*value as f64 * 10f64.powi(*scale as i32))
            }
            Value::Double(d) => Ok(*d),
            other => Err(RillError::Internal(format!(
                "expected a numeric value, got {}",
                other.type_name()
            ))),
        }
    }

    /// The numeric value as an integer at the given decimal scale,
    /// truncating toward zero when digits are dropped.
    pub fn to_int64_at_scale(&self, scale: i8) -> Result<i64> {
        match self {
            Value::Int64 { value, scale: from } => {
                rescale_int(*value, *from, scale).ok_or_else(|| {
                    RillError::Internal(format!(
                        "integer overflow rescaling {value} from scale {from} to {scale}"
                    ))
                })
            }
            Value::Double(d) => {
                let scaled = (d * 10f64.powi(-(scale as i32))).round();
                if !scaled.is_finite()
                    || scaled < i64::MIN as f64
                    || scaled > i64::MAX as f64
                {
                    return Err(RillError::Internal(format!(
                        "double {d} out of range for scale {scale}"
                    )));
                }
                Ok(scaled as i64)
            }
            other => Err(RillError::Internal(format!(
                "expected a numeric value, got {}",
                other.type_name()
            ))),
        }
    }

    /// The value rendered as text. Blobs have no inline representation.
    pub fn to_text(&self) -> Result<String> {
        match self {
            Value::Int64 { value, scale } => Ok(format_scaled(*value, *scale)),
            Value::Double(d) => Ok(d.to_string()),
            Value::Text { value, .. } => Ok(value.clone()),
            Value::Blob { .. } => Err(RillError::Internal(
                "a blob handle cannot be rendered as text".to_string(),
            )),
        }
    }
}

/// Change the decimal scale of an integer, truncating toward zero.
/// Returns `None` on overflow.
pub fn rescale_int(value: i64, from: i8, to: i8) -> Option<i64> {
    let shift = from as i32 - to as i32;
    match shift.cmp(&0) {
        Ordering::Equal => Some(value),
        Ordering::Greater => {
            if shift > 18 {
                return if value == 0 { Some(0) } else { None };
            }
            value.checked_mul(10i64.pow(shift as u32))
        }
        Ordering::Less => {
            let shift = (-shift) as u32;
            if shift > 18 {
                return Some(0);
            }
            Some(value / 10i64.pow(shift))
        }
    }
}

/// Render a scaled integer as a decimal string, e.g. `(1234, -2)` as `12.34`.
pub fn format_scaled(value: i64, scale: i8) -> String {
    if scale >= 0 {
        if value == 0 || scale == 0 {
            return value.to_string();
        }
        let mut out = value.to_string();
        out.extend(std::iter::repeat('0').take(scale as usize));
        out
    } else {
        let digits = -(scale as i32) as u32;
        if digits > 18 {
            return (value as f64 * 10f64.powi(scale as i32)).to_string();
        }
        let pow = 10u64.pow(digits);
        let abs = value.unsigned_abs();
        let sign = if value < 0 { "-" } else { "" };
        format!(
            "{sign}{}.{:0width$}",
            abs / pow,
            abs % pow,
            width = digits as usize
        )
    }
}
