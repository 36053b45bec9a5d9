//! The variable-bit-width string decoder shared by every canonicalised
//! call site.
//!
//! [`DECODE_HELPER_SOURCE`] is what gets appended to normalised output;
//! [`decode_helper`] is the same routine in Rust, used to check decoded
//! payloads without running any JavaScript.

use rustc_hash::FxHashMap;

/// JavaScript source of the canonical decoder.
pub const DECODE_HELPER_SOURCE: &str = r#"function decodeHelper(alphabet, seed) {
  var input = "" + (seed || ""), bytes = [], acc = 0, bits = 0, carry = -1;
  for (var i = 0; i < input.length; i++) {
    var idx = alphabet.indexOf(input[i]);
    if (idx === -1) continue;
    if (carry < 0) {
      carry = idx;
    } else {
      carry += idx * 91;
      acc |= carry << bits;
      bits += (carry & 8191) > 88 ? 13 : 14;
      do {
        bytes.push(acc & 255);
        acc >>= 8;
        bits -= 8;
      } while (bits > 7);
      carry = -1;
    }
  }
  if (carry > -1) {
    bytes.push((acc | carry << bits) & 255);
  }
  return bytes;
}
"#;

/// Decode `seed` against `alphabet`.
///
/// Both strings are read as UTF-16 code units and all arithmetic is on
/// 32-bit signed integers, so the result matches the JavaScript routine
/// byte for byte. Characters missing from the alphabet are skipped.
#[must_use]
pub fn decode_helper(alphabet: &str, seed: &str) -> Vec<u8> {
    let mut index: FxHashMap<u16, i32> = FxHashMap::default();
    for (i, unit) in alphabet.encode_utf16().enumerate() {
        index.entry(unit).or_insert(i as i32);
    }

    let mut bytes = Vec::with_capacity(seed.len());
    let mut acc: i32 = 0;
    let mut bits: i32 = 0;
    let mut carry: i32 = -1;
    for unit in seed.encode_utf16() {
        let Some(&idx) = index.get(&unit) else {
            continue;
        };
        if carry < 0 {
            carry = idx;
            continue;
        }
        carry += idx * 91;
        acc |= carry.wrapping_shl(bits as u32);
        bits += if (carry & 8191) > 88 { 13 } else { 14 };
        loop {
            bytes.push((acc & 255) as u8);
            acc >>= 8;
            bits -= 8;
            if bits <= 7 {
                break;
            }
        }
        carry = -1;
    }
    if carry > -1 {
        bytes.push(((acc | carry.wrapping_shl(bits as u32)) & 255) as u8);
    }
    bytes
}
