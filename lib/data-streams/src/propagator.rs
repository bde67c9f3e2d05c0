//! In-band propagation of pathway context through message headers.
//!
//! The binary form is 20 bytes for present-day timestamps: the pathway hash as a little-endian
//! `u64`, followed by the pathway start and edge start as zigzag-varint-encoded milliseconds.
//! Decoding ignores trailing bytes so the format can grow fields without breaking old readers.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;

use crate::pathway::Pathway;

/// Message header carrying the binary pathway context.
pub const PROPAGATION_KEY: &str = "dd-pathway-ctx";

/// Message header carrying the base64-encoded pathway context.
pub const PROPAGATION_KEY_BASE64: &str = "dd-pathway-ctx-base64";

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Maximum number of bytes in a 64-bit varint.
const MAX_VARINT_LEN: usize = 10;

/// Access to message headers, as seen by the propagator.
///
/// Header keys are matched ASCII case-insensitively on read and removal, since message brokers
/// and HTTP intermediaries disagree about header-name casing.
pub trait HeaderCarrier {
    /// Returns the value of the first header matching the key.
    fn get(&self, key: &str) -> Option<&[u8]>;

    /// Removes every header matching the key.
    fn remove(&mut self, key: &str);

    /// Adds a header. Any previous entries for the key have already been removed by the caller.
    fn insert(&mut self, key: &str, value: Vec<u8>);
}

impl HeaderCarrier for HashMap<String, Vec<u8>> {
    fn get(&self, key: &str) -> Option<&[u8]> {
        self.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_slice())
    }

    fn remove(&mut self, key: &str) {
        self.retain(|name, _| !name.eq_ignore_ascii_case(key));
    }

    fn insert(&mut self, key: &str, value: Vec<u8>) {
        HashMap::insert(self, key.to_string(), value);
    }
}

impl HeaderCarrier for Vec<(String, Vec<u8>)> {
    fn get(&self, key: &str) -> Option<&[u8]> {
        self.iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_slice())
    }

    fn remove(&mut self, key: &str) {
        self.retain(|(name, _)| !name.eq_ignore_ascii_case(key));
    }

    fn insert(&mut self, key: &str, value: Vec<u8>) {
        self.push((key.to_string(), value));
    }
}

/// Encodes a pathway into its binary wire form.
pub fn encode(pathway: &Pathway) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    buf.extend_from_slice(&pathway.hash().to_le_bytes());
    encode_time(&mut buf, pathway.pathway_start_ns());
    encode_time(&mut buf, pathway.edge_start_ns());
    buf
}

/// Encodes a pathway into the base64 rendering of its binary wire form.
pub fn encode_base64(pathway: &Pathway) -> String {
    BASE64_STANDARD.encode(encode(pathway))
}

/// Decodes a pathway from its binary wire form.
///
/// Returns `None` for malformed input. Timestamps round-trip at millisecond precision, so the
/// decoded pathway's nanosecond fields are whole milliseconds.
pub fn decode(data: &[u8]) -> Option<Pathway> {
    if data.len() < 8 {
        return None;
    }
    let (hash_bytes, rest) = data.split_at(8);
    let hash = u64::from_le_bytes(hash_bytes.try_into().expect("split at 8"));

    let (pathway_start_ms, rest) = decode_varint(rest)?;
    let (edge_start_ms, _trailing) = decode_varint(rest)?;

    let pathway_start_ns = millis_to_nanos(pathway_start_ms)?;
    let edge_start_ns = millis_to_nanos(edge_start_ms)?;
    Some(Pathway::new(hash, pathway_start_ns, edge_start_ns))
}

/// Decodes a pathway from the base64 rendering of its binary wire form.
pub fn decode_base64(encoded: &[u8]) -> Option<Pathway> {
    let raw = BASE64_STANDARD.decode(encoded).ok()?;
    decode(&raw)
}

/// Writes the pathway context into the carrier, replacing any previous context headers.
pub fn inject<C: HeaderCarrier + ?Sized>(pathway: &Pathway, carrier: &mut C) {
    carrier.remove(PROPAGATION_KEY);
    carrier.remove(PROPAGATION_KEY_BASE64);
    carrier.insert(PROPAGATION_KEY, encode(pathway));
}

/// Reads pathway context from the carrier.
///
/// The binary header wins when both forms are present. Missing or malformed context yields
/// `None`; callers proceed with a fresh pathway.
pub fn extract<C: HeaderCarrier + ?Sized>(carrier: &C) -> Option<Pathway> {
    if let Some(raw) = carrier.get(PROPAGATION_KEY) {
        return decode(raw);
    }
    decode_base64(carrier.get(PROPAGATION_KEY_BASE64)?)
}

fn encode_time(buf: &mut Vec<u8>, ns: u64) {
    let ms = (ns / NANOS_PER_MILLI) as i64;
    let mut zigzag = ((ms << 1) ^ (ms >> 63)) as u64;
    loop {
        let byte = (zigzag & 0x7f) as u8;
        zigzag >>= 7;
        if zigzag == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn decode_varint(data: &[u8]) -> Option<(i64, &[u8])> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= MAX_VARINT_LEN {
            return None;
        }
        value |= u64::from(byte & 0x7f) << (7 * i as u32);
        if byte & 0x80 == 0 {
            let decoded = ((value >> 1) as i64) ^ -((value & 1) as i64);
            return Some((decoded, &data[i + 1..]));
        }
    }
    None
}

fn millis_to_nanos(ms: i64) -> Option<u64> {
    u64::try_from(ms).ok()?.checked_mul(NANOS_PER_MILLI)
}
