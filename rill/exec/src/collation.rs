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

//! Collation-aware text comparison and typed value comparison

use std::cmp::Ordering;
use std::fmt::Debug;

use rill_common::{CollationId, Result, RillError, Value};

/// Host capability for collation-aware text handling.
pub trait Collator: Debug + Send + Sync {
    /// Fill `out` with a fixed-width sort key for `text` such that bytewise
    /// key order equals collation order. The key is zero padded and may be
    /// truncated to `out.len()`.
    fn derive_key(&self, collation: CollationId, text: &str, out: &mut [u8]) -> Result<()>;

    /// Compare two strings under a collation.
    fn compare(&self, collation: CollationId, a: &str, b: &str) -> Result<Ordering>;
}

/// Collator understanding [`CollationId::BINARY`] and
/// [`CollationId::CASE_INSENSITIVE`]; any other id fails key derivation.
#[derive(Debug, Default)]
pub struct BuiltinCollator;

impl BuiltinCollator {
    fn check_known(collation: CollationId) -> Result<()> {
        match collation {
            CollationId::BINARY | CollationId::CASE_INSENSITIVE => Ok(()),
            other => Err(RillError::InvalidEncoding(format!(
                "collation {} is not known to the built-in collator",
                other.0
            ))),
        }
    }
}

impl Collator for BuiltinCollator {
    fn derive_key(&self, collation: CollationId, text: &str, out: &mut [u8]) -> Result<()> {
        Self::check_known(collation)?;
        out.fill(0);
        let n = text.len().min(out.len());
        out[..n].copy_from_slice(&text.as_bytes()[..n]);
        if collation == CollationId::CASE_INSENSITIVE {
            out[..n].make_ascii_uppercase();
        }
        Ok(())
    }

    fn compare(&self, collation: CollationId, a: &str, b: &str) -> Result<Ordering> {
        Self::check_known(collation)?;
        match collation {
            CollationId::CASE_INSENSITIVE => Ok(a
                .bytes()
                .map(|c| c.to_ascii_uppercase())
                .cmp(b.bytes().map(|c| c.to_ascii_uppercase()))),
            _ => Ok(a.as_bytes().cmp(b.as_bytes())),
        }
    }
}

/// Compare two typed values, dispatching on the variant.
///
/// Scaled integers of equal scale compare directly; differing scales widen
/// to i128, falling back to double arithmetic when even that would overflow.
/// Mixed numerics compare under f64 total order, text under the left-hand
/// value's collation. Blobs and mixed text/numeric pairs are not comparable.
pub fn compare_values(a: &Value, b: &Value, collator: &dyn Collator) -> Result<Ordering> {
    match (a, b) {
        (
            Value::Int64 {
                value: av,
                scale: ascale,
            },
            Value::Int64 {
                value: bv,
                scale: bscale,
            },
        ) => {
            if ascale == bscale {
                return Ok(av.cmp(bv));
            }
            let common = (*ascale).min(*bscale);
            let ashift = (*ascale as i32 - common as i32) as u32;
            let bshift = (*bscale as i32 - common as i32) as u32;
            let wide = (|| {
                let aw = (*av as i128).checked_mul(10i128.checked_pow(ashift)?)?;
                let bw = (*bv as i128).checked_mul(10i128.checked_pow(bshift)?)?;
                Some(aw.cmp(&bw))
            })();
            match wide {
                Some(ordering) => Ok(ordering),
                None => Ok(a.to_f64()?.total_cmp(&b.to_f64()?)),
            }
        }
        (Value::Int64 { .. } | Value::Double(_), Value::Int64 { .. } | Value::Double(_)) => {
            Ok(a.to_f64()?.total_cmp(&b.to_f64()?))
        }
        (
            Value::Text {
                value: av,
                collation,
            },
            Value::Text { value: bv, .. },
        ) => collator.compare(*collation, av, bv),
        _ => Err(RillError::Internal(format!(
            "cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}
