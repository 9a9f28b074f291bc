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

//! [`DistinctSet`], the deduplicating buffer behind `DISTINCT` aggregates
//!
//! Values are serialized into fixed-width sort records: an optional
//! collation key prefix, then an order-preserving payload encoding. The
//! backing sort deduplicates on the first key, so a collation-keyed set
//! treats case variants as one value while the payload key keeps the
//! replay order deterministic.

use std::fmt;
use std::sync::Arc;

use rill_common::{CollationId, Result, RillError, Value};

use crate::collation::Collator;
use crate::sort::{SortConfig, SortKeyDef, SortRun, SortSpace};

const SIGN_BIT: u64 = 1 << 63;

/// Shape of the serialized value inside a distinct sort record.
#[derive(Debug, Clone)]
pub enum PayloadKind {
    /// Sign-flipped big-endian integer at a fixed decimal scale.
    Int64 { scale: i8 },
    /// Total-order encoded double.
    Double,
    /// Zero-padded text of at most `max_len` bytes.
    Text { max_len: usize, collation: CollationId },
}

impl PayloadKind {
    fn byte_len(&self) -> usize {
        match self {
            PayloadKind::Int64 { .. } | PayloadKind::Double => 8,
            PayloadKind::Text { max_len, .. } => *max_len,
        }
    }
}

/// Key layout of a distinct sort record: the payload shape plus whether a
/// collation-derived prefix key is prepended for text under a non-binary
/// collation.
#[derive(Debug, Clone)]
pub struct DistinctKeyDesc {
    pub payload: PayloadKind,
    pub intl: bool,
}

impl DistinctKeyDesc {
    pub fn new(payload: PayloadKind) -> Self {
        DistinctKeyDesc {
            payload,
            intl: false,
        }
    }

    /// Prepend a collation key prefix; only meaningful for text payloads.
    pub fn with_collation_key(mut self) -> Self {
        self.intl = true;
        self
    }

    fn payload_offset(&self) -> usize {
        if self.intl {
            self.payload.byte_len()
        } else {
            0
        }
    }

    fn record_length(&self) -> usize {
        self.payload_offset() + self.payload.byte_len()
    }
}

/// A monotonically growing multiset that, on `finalize`, replays its
/// values in sorted order with duplicates suppressed.
///
/// The set is reusable across groups: `open` starts a fresh underlying
/// sort, `finalize` and `reset` both tear it down.
pub struct DistinctSet {
    desc: DistinctKeyDesc,
    sorts: Arc<dyn SortSpace>,
    collator: Arc<dyn Collator>,
    run: Option<Box<dyn SortRun>>,
}

impl fmt::Debug for DistinctSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistinctSet")
            .field("desc", &self.desc)
            .field("open", &self.run.is_some())
            .finish()
    }
}

impl DistinctSet {
    pub fn new(
        desc: DistinctKeyDesc,
        sorts: Arc<dyn SortSpace>,
        collator: Arc<dyn Collator>,
    ) -> Self {
        DistinctSet {
            desc,
            sorts,
            collator,
            run: None,
        }
    }

    /// Start a fresh backing sort, discarding anything fed so far.
    pub fn open(&mut self) -> Result<()> {
        self.run = None;
        if self.desc.intl && !matches!(self.desc.payload, PayloadKind::Text { .. }) {
            return Err(RillError::Internal(
                "collation key prefix requested for a non-text distinct payload".to_string(),
            ));
        }
        let payload_key = SortKeyDef {
            offset: self.desc.payload_offset(),
            length: self.desc.payload.byte_len(),
        };
        let keys = if self.desc.intl {
            vec![
                SortKeyDef {
                    offset: 0,
                    length: self.desc.payload.byte_len(),
                },
                payload_key,
            ]
        } else {
            vec![payload_key]
        };
        self.run = Some(self.sorts.init(SortConfig {
            record_length: self.desc.record_length(),
            keys,
            unique_keys: 1,
        })?);
        Ok(())
    }

    /// Serialize one value into the backing sort.
    pub fn put(&mut self, value: &Value) -> Result<()> {
        let desc = &self.desc;
        let run = self.run.as_mut().ok_or_else(|| {
            RillError::Internal("value fed to a closed distinct set".to_string())
        })?;
        let mut record = vec![0u8; desc.record_length()];
        if desc.intl {
            let collation = match &desc.payload {
                PayloadKind::Text { collation, .. } => *collation,
                _ => CollationId::BINARY,
            };
            let text = value.to_text()?;
            self.collator
                .derive_key(collation, &text, &mut record[..desc.payload_offset()])?;
        }
        encode_payload(&desc.payload, value, &mut record[desc.payload_offset()..])?;
        run.put(&record)
    }

    /// Sort, deduplicate, and replay every unique value through `visitor`.
    /// The backing sort is torn down on both normal and error exits.
    pub fn finalize(&mut self, visitor: &mut dyn FnMut(Value) -> Result<()>) -> Result<()> {
        let mut run = match self.run.take() {
            Some(run) => run,
            None => return Ok(()),
        };
        run.sort()?;
        loop {
            let value = match run.get()? {
                None => break,
                Some(record) => {
                    decode_payload(&self.desc.payload, &record[self.desc.payload_offset()..])?
                }
            };
            visitor(value)?;
        }
        Ok(())
    }

    /// Tear down the backing sort and forget all fed values.
    pub fn reset(&mut self) {
        self.run = None;
    }

    pub fn is_open(&self) -> bool {
        self.run.is_some()
    }
}

fn encode_payload(payload: &PayloadKind, value: &Value, out: &mut [u8]) -> Result<()> {
    match payload {
        PayloadKind::Int64 { scale } => {
            let v = value.to_int64_at_scale(*scale)?;
            out.copy_from_slice(&((v as u64) ^ SIGN_BIT).to_be_bytes());
        }
        PayloadKind::Double => {
            let d = value.to_f64()?;
            // -0.0 and every NaN bit pattern must encode identically
            let d = if d == 0.0 {
                0.0
            } else if d.is_nan() {
                f64::NAN
            } else {
                d
            };
            let bits = d.to_bits();
            let encoded = if bits & SIGN_BIT != 0 {
                !bits
            } else {
                bits ^ SIGN_BIT
            };
            out.copy_from_slice(&encoded.to_be_bytes());
        }
        PayloadKind::Text { max_len, .. } => {
            let text = value.to_text()?;
            if text.len() > *max_len {
                return Err(RillError::InvalidEncoding(format!(
                    "text value of {} bytes exceeds the declared distinct key length {}",
                    text.len(),
                    max_len
                )));
            }
            out[..text.len()].copy_from_slice(text.as_bytes());
        }
    }
    Ok(())
}

fn fixed_word(bytes: &[u8]) -> Result<[u8; 8]> {
    bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| RillError::Internal("distinct record shorter than its payload".to_string()))
}

fn decode_payload(payload: &PayloadKind, bytes: &[u8]) -> Result<Value> {
    match payload {
        PayloadKind::Int64 { scale } => {
            let raw = u64::from_be_bytes(fixed_word(bytes)?) ^ SIGN_BIT;
            Ok(Value::Int64 {
                value: raw as i64,
                scale: *scale,
            })
        }
        PayloadKind::Double => {
            let raw = u64::from_be_bytes(fixed_word(bytes)?);
            let bits = if raw & SIGN_BIT != 0 { raw ^ SIGN_BIT } else { !raw };
            Ok(Value::Double(f64::from_bits(bits)))
        }
        PayloadKind::Text { collation, .. } => {
            let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
            let text = std::str::from_utf8(&bytes[..end]).map_err(|e| {
                RillError::InvalidEncoding(format!("distinct text payload is not UTF-8: {e}"))
            })?;
            Ok(Value::Text {
                value: text.to_string(),
                collation: *collation,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use rill_common::CollationId;

    use crate::collation::BuiltinCollator;
    use crate::sort::InMemorySortSpace;

    use super::*;

    fn int_set(space: &Arc<InMemorySortSpace>) -> DistinctSet {
        DistinctSet::new(
            DistinctKeyDesc::new(PayloadKind::Int64 { scale: 0 }),
            Arc::clone(space) as Arc<dyn SortSpace>,
            Arc::new(BuiltinCollator),
        )
    }

    fn drain(set: &mut DistinctSet) -> Vec<Value> {
        let mut out = Vec::new();
        set.finalize(&mut |value| {
            out.push(value);
            Ok(())
        })
        .unwrap();
        out
    }

    #[test]
    fn deduplicates_integers_in_order() {
        let space = Arc::new(InMemorySortSpace::new());
        let mut set = int_set(&space);
        set.open().unwrap();
        for v in [3i64, -1, 3, 0, -1] {
            set.put(&Value::int64(v)).unwrap();
        }

        let values = drain(&mut set);
        assert_eq!(
            values,
            vec![Value::int64(-1), Value::int64(0), Value::int64(3)]
        );
        assert!(!set.is_open());
        assert_eq!(space.open_runs(), 0);
    }

    #[test]
    fn reopen_discards_previous_values() {
        let space = Arc::new(InMemorySortSpace::new());
        let mut set = int_set(&space);
        set.open().unwrap();
        set.put(&Value::int64(7)).unwrap();
        set.open().unwrap();
        set.put(&Value::int64(9)).unwrap();

        assert_eq!(drain(&mut set), vec![Value::int64(9)]);
    }

    #[test]
    fn put_requires_open() {
        let space = Arc::new(InMemorySortSpace::new());
        let mut set = int_set(&space);
        assert!(set.put(&Value::int64(1)).is_err());

        // finalizing a never-opened set is a no-op
        set.finalize(&mut |_| panic!("no values expected")).unwrap();
    }

    #[test]
    fn doubles_collapse_signed_zero() {
        let space = Arc::new(InMemorySortSpace::new());
        let mut set = DistinctSet::new(
            DistinctKeyDesc::new(PayloadKind::Double),
            Arc::clone(&space) as Arc<dyn SortSpace>,
            Arc::new(BuiltinCollator),
        );
        set.open().unwrap();
        for v in [-1.5f64, 0.0, -0.0, 2.25, -1.5] {
            set.put(&Value::double(v)).unwrap();
        }

        assert_eq!(
            drain(&mut set),
            vec![
                Value::double(-1.5),
                Value::double(0.0),
                Value::double(2.25)
            ]
        );
    }

    #[test]
    fn collation_key_dedups_case_variants() {
        let space = Arc::new(InMemorySortSpace::new());
        let mut set = DistinctSet::new(
            DistinctKeyDesc::new(PayloadKind::Text {
                max_len: 4,
                collation: CollationId::CASE_INSENSITIVE,
            })
            .with_collation_key(),
            Arc::clone(&space) as Arc<dyn SortSpace>,
            Arc::new(BuiltinCollator),
        );
        set.open().unwrap();
        for v in ["b", "A", "a"] {
            set.put(&Value::text_with_collation(v, CollationId::CASE_INSENSITIVE))
                .unwrap();
        }

        let values = drain(&mut set);
        // "A" and "a" share a collation key; the smaller payload survives
        assert_eq!(
            values,
            vec![
                Value::text_with_collation("A", CollationId::CASE_INSENSITIVE),
                Value::text_with_collation("b", CollationId::CASE_INSENSITIVE),
            ]
        );
    }

    #[test]
    fn oversized_text_is_rejected() {
        let space = Arc::new(InMemorySortSpace::new());
        let mut set = DistinctSet::new(
            DistinctKeyDesc::new(PayloadKind::Text {
                max_len: 2,
                collation: CollationId::BINARY,
            }),
            Arc::clone(&space) as Arc<dyn SortSpace>,
            Arc::new(BuiltinCollator),
        );
        set.open().unwrap();
        assert!(matches!(
            set.put(&Value::text("long")),
            Err(RillError::InvalidEncoding(_))
        ));
    }
}
