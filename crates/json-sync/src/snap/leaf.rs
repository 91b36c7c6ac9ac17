use std::cmp::Ordering;
use std::sync::OnceLock;

use serde_json::{Number, Value};

use super::hash;
use super::node::Node;

/// Scalar payload of a leaf node. `null` is never a leaf; it is the empty
/// children node.
///
/// Numbers compare with [`f64::total_cmp`] after folding `-0.0` into `0.0`,
/// and equality follows that order, so a NaN built outside JSON import is
/// equal to itself and sorts above every other number.
#[derive(Clone, Debug)]
pub enum LeafValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl LeafValue {
    /// Rank among leaf types: boolean < number < string.
    pub(crate) fn type_rank(&self) -> u8 {
        match self {
            LeafValue::Bool(_) => 1,
            LeafValue::Number(_) => 2,
            LeafValue::String(_) => 3,
        }
    }

    pub fn compare(&self, other: &LeafValue) -> Ordering {
        match (self, other) {
            (LeafValue::Bool(a), LeafValue::Bool(b)) => a.cmp(b),
            (LeafValue::Number(a), LeafValue::Number(b)) => (a + 0.0).total_cmp(&(b + 0.0)),
            (LeafValue::String(a), LeafValue::String(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            LeafValue::Bool(b) => Value::Bool(*b),
            LeafValue::String(s) => Value::String(s.clone()),
            LeafValue::Number(n) => number_to_json(*n),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LeafValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for LeafValue {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

/// Integral values inside the exactly-representable range serialize as
/// JSON integers; everything else as floats.
pub(crate) fn number_to_json(n: f64) -> Value {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl From<bool> for LeafValue {
    fn from(b: bool) -> Self {
        LeafValue::Bool(b)
    }
}

impl From<f64> for LeafValue {
    fn from(n: f64) -> Self {
        LeafValue::Number(n)
    }
}

impl From<i64> for LeafValue {
    fn from(n: i64) -> Self {
        LeafValue::Number(n as f64)
    }
}

impl From<&str> for LeafValue {
    fn from(s: &str) -> Self {
        LeafValue::String(s.to_owned())
    }
}

impl From<String> for LeafValue {
    fn from(s: String) -> Self {
        LeafValue::String(s)
    }
}

/// A scalar value plus its priority.
#[derive(Debug)]
pub struct LeafNode {
    value: LeafValue,
    priority: Node,
    hash: OnceLock<String>,
}

impl LeafNode {
    /// # Panics
    ///
    /// If `priority` is not a valid priority node (see
    /// [`Node::is_valid_priority`]).
    pub fn new(value: LeafValue, priority: Node) -> Self {
        assert!(
            priority.is_valid_priority(),
            "invalid priority node {priority:?}"
        );
        LeafNode { value, priority, hash: OnceLock::new() }
    }

    pub fn value(&self) -> &LeafValue {
        &self.value
    }

    pub fn priority(&self) -> &Node {
        &self.priority
    }

    pub fn hash(&self) -> &str {
        self.hash
            .get_or_init(|| hash::leaf_hash(&self.value, self.priority.leaf_value()))
    }
}
