//! Segment wire framing: `u32 len | u32 crc32 | u8 tag | payload`, where
//! `len` and `crc32` cover `tag` plus `payload`. This is the concrete shape
//! behind spec.md §6's "length-prefixed records with CRC, record type tag".

use tsdb_proto::{InputRecord, RecordTag};

const HEADER_LEN: usize = 4 + 4;

pub fn encode(record: &InputRecord) -> Vec<u8> {
    let mut body = Vec::with_capacity(32);
    body.push(record.tag() as u8);
    match record {
        InputRecord::SeriesDecl { id, canonical_name } => {
            body.extend_from_slice(&id.to_le_bytes());
            let name_bytes = canonical_name.as_bytes();
            body.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
            body.extend_from_slice(name_bytes);
        }
        InputRecord::Write {
            id,
            timestamp,
            value,
        } => {
            body.extend_from_slice(&id.to_le_bytes());
            body.extend_from_slice(&timestamp.to_le_bytes());
            body.extend_from_slice(&value.to_le_bytes());
        }
    }

    let crc = crc32fast::hash(&body);
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&body);
    out
}

pub enum Decoded {
    Record(InputRecord, usize),
    /// Not enough bytes buffered yet for a full record — the tail may
    /// still be written to, or this is a torn write from a crash.
    Incomplete,
    /// Enough bytes were present but the CRC didn't match: a torn write.
    /// `usize` is the number of bytes to skip (the whole framed record).
    Corrupt(usize),
}

pub fn decode_one(buf: &[u8]) -> Decoded {
    if buf.len() < HEADER_LEN {
        return Decoded::Incomplete;
    }
    let len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    let crc = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let total = HEADER_LEN + len;
    if buf.len() < total {
        return Decoded::Incomplete;
    }
    let body = &buf[HEADER_LEN..total];
    if crc32fast::hash(body) != crc {
        return Decoded::Corrupt(total);
    }
    match decode_body(body) {
        Some(record) => Decoded::Record(record, total),
        None => Decoded::Corrupt(total),
    }
}

fn decode_body(body: &[u8]) -> Option<InputRecord> {
    let tag = RecordTag::from_u8(*body.first()?)?;
    let rest = &body[1..];
    match tag {
        RecordTag::SeriesDecl => {
            if rest.len() < 10 {
                return None;
            }
            let id = u64::from_le_bytes(rest[0..8].try_into().ok()?);
            let name_len = u16::from_le_bytes(rest[8..10].try_into().ok()?) as usize;
            let name_bytes = rest.get(10..10 + name_len)?;
            let canonical_name = std::str::from_utf8(name_bytes).ok()?.to_string();
            Some(InputRecord::SeriesDecl { id, canonical_name })
        }
        RecordTag::Write => {
            if rest.len() != 24 {
                return None;
            }
            let id = u64::from_le_bytes(rest[0..8].try_into().ok()?);
            let timestamp = u64::from_le_bytes(rest[8..16].try_into().ok()?);
            let value = f64::from_le_bytes(rest[16..24].try_into().ok()?);
            Some(InputRecord::Write {
                id,
                timestamp,
                value,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trips_series_decl() {
        let rec = InputRecord::SeriesDecl {
            id: 7,
            canonical_name: "cpu host=a".to_string(),
        };
        let bytes = encode(&rec);
        match decode_one(&bytes) {
            Decoded::Record(got, consumed) => {
                assert_eq!(got, rec);
                assert_eq!(consumed, bytes.len());
            }
            _ => panic!("expected a full record"),
        }
    }

    #[test]
    fn round_trips_write() {
        let rec = InputRecord::Write {
            id: 3,
            timestamp: 1000,
            value: 42.5,
        };
        let bytes = encode(&rec);
        match decode_one(&bytes) {
            Decoded::Record(got, consumed) => {
                assert_eq!(got, rec);
                assert_eq!(consumed, bytes.len());
            }
            _ => panic!("expected a full record"),
        }
    }

    #[test]
    fn detects_torn_tail() {
        let rec = InputRecord::Write {
            id: 1,
            timestamp: 1,
            value: 1.0,
        };
        let mut bytes = encode(&rec);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(decode_one(&bytes), Decoded::Incomplete));
    }

    #[test]
    fn detects_corruption() {
        let rec = InputRecord::Write {
            id: 1,
            timestamp: 1,
            value: 1.0,
        };
        let mut bytes = encode(&rec);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(decode_one(&bytes), Decoded::Corrupt(_)));
    }

    proptest::proptest! {
        #[test]
        fn write_record_round_trips(id in any::<u64>(), timestamp in any::<u64>(), value in any::<f64>()) {
            let rec = InputRecord::Write { id, timestamp, value };
            let bytes = encode(&rec);
            match decode_one(&bytes) {
                Decoded::Record(got, consumed) => {
                    prop_assert_eq!(consumed, bytes.len());
                    match got {
                        InputRecord::Write { id: gid, timestamp: gts, value: gval } => {
                            prop_assert_eq!(gid, id);
                            prop_assert_eq!(gts, timestamp);
                            prop_assert!(gval == value || (gval.is_nan() && value.is_nan()));
                        }
                        _ => prop_assert!(false, "expected a Write record"),
                    }
                }
                _ => prop_assert!(false, "expected a full record"),
            }
        }

        #[test]
        fn series_decl_round_trips(id in any::<u64>(), name in "[a-z][a-z0-9 =_]{0,40}") {
            let rec = InputRecord::SeriesDecl { id, canonical_name: name.clone() };
            let bytes = encode(&rec);
            match decode_one(&bytes) {
                Decoded::Record(got, consumed) => {
                    prop_assert_eq!(consumed, bytes.len());
                    prop_assert_eq!(got, InputRecord::SeriesDecl { id, canonical_name: name });
                }
                _ => prop_assert!(false, "expected a full record"),
            }
        }
    }
}
