//! Child-name ordering.

use std::cmp::Ordering;

/// Sentinel name sorting before every real child name.
pub const MIN_NAME: &str = "[MIN_NAME]";
/// Sentinel name sorting after every real child name.
pub const MAX_NAME: &str = "[MAX_NAME]";

/// Parses a child name as a 32-bit integer key.
///
/// Any number of leading zeros is accepted, followed by at most ten
/// significant digits; the result must fit in an `i32`.
pub fn try_parse_int(name: &str) -> Option<i64> {
    let digits = name.strip_prefix('-').unwrap_or(name);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let significant = digits.trim_start_matches('0');
    if significant.len() > 10 {
        return None;
    }
    let value: i64 = name.parse().ok()?;
    if value >= i32::MIN as i64 && value <= i32::MAX as i64 {
        Some(value)
    } else {
        None
    }
}

/// Total order over child names.
///
/// `MIN_NAME` sorts first and `MAX_NAME` last. Names that parse as 32-bit
/// integers sort numerically before every other name; equal integers tie
/// break on string length (`"1"` before `"01"`). Everything else compares
/// lexicographically.
pub fn name_compare(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    if a == MIN_NAME || b == MAX_NAME {
        return Ordering::Less;
    }
    if b == MIN_NAME || a == MAX_NAME {
        return Ordering::Greater;
    }
    match (try_parse_int(a), try_parse_int(b)) {
        (Some(x), Some(y)) => match x.cmp(&y) {
            Ordering::Equal => a.len().cmp(&b.len()),
            other => other,
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
