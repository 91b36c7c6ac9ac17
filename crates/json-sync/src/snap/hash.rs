//! Content digests for nodes.
//!
//! `state = (state << 5) + state + num` over 64-bit wrapping arithmetic,
//! seeded per value type, rendered as unpadded URL-safe base64. Listen
//! requests carry these so the server can skip resending unchanged data.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::leaf::LeafValue;

// ── Type discriminators ────────────────────────────────────────────────────

pub const START_STATE: u64 = 5381;

const TRUE_CONST: u64 = 982453247;
const FALSE_CONST: u64 = 982454243;
const NUMBER_CONST: u64 = 982452259;
const STRING_CONST: u64 = 982453601;
const CHILDREN_CONST: u64 = 982454533;
const PRIORITY_CONST: u64 = 982454837;

// ── Mixing ───────────────────────────────────────────────────────────────

pub fn update_num(state: u64, num: u64) -> u64 {
    state.wrapping_shl(5).wrapping_add(state).wrapping_add(num)
}

pub fn update_str(mut state: u64, s: &str) -> u64 {
    state = update_num(state, STRING_CONST);
    state = update_num(state, s.len() as u64);
    for &b in s.as_bytes() {
        state = update_num(state, u64::from(b));
    }
    state
}

fn update_leaf_value(state: u64, value: &LeafValue) -> u64 {
    match value {
        LeafValue::Bool(true) => update_num(state, TRUE_CONST),
        LeafValue::Bool(false) => update_num(state, FALSE_CONST),
        LeafValue::Number(n) => {
            // 0.0 and -0.0 are the same value
            let bits = if *n == 0.0 { 0 } else { n.to_bits() };
            update_num(update_num(state, NUMBER_CONST), bits)
        }
        LeafValue::String(s) => update_str(state, s),
    }
}

fn update_priority(state: u64, priority: Option<&LeafValue>) -> u64 {
    match priority {
        Some(p) => update_leaf_value(update_num(state, PRIORITY_CONST), p),
        None => state,
    }
}

fn encode(state: u64) -> String {
    URL_SAFE_NO_PAD.encode(state.to_be_bytes())
}

/// Digest of a leaf value and its (leaf) priority.
pub fn leaf_hash(value: &LeafValue, priority: Option<&LeafValue>) -> String {
    let state = update_priority(START_STATE, priority);
    encode(update_leaf_value(state, value))
}

/// Digest of a children collection from its children's names and digests,
/// given in key order. An empty collection without priority digests to `""`.
pub fn children_hash<'a>(
    priority: Option<&LeafValue>,
    children: impl Iterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut state = update_priority(START_STATE, priority);
    let mut any = priority.is_some();
    state = update_num(state, CHILDREN_CONST);
    for (name, hash) in children {
        any = true;
        state = update_str(state, name);
        state = update_str(state, hash);
    }
    if any {
        encode(state)
    } else {
        String::new()
    }
}
