//! Conversion between plain JSON and [`Node`]s.
//!
//! Objects may carry `.priority` and `.value` pseudo-children: `.value`
//! holds the scalar of a leaf with priority, `.priority` the priority of
//! either kind. Arrays become children keyed `"0"`, `"1"`, ...

use serde_json::{Map, Value};

use crate::util::try_parse_int;

use super::leaf::{LeafNode, LeafValue};
use super::node::Node;

impl Node {
    /// Builds a node from JSON. Empty objects and arrays become the empty
    /// node. A priority that is not a number or string is ignored.
    pub fn from_json(json: &Value) -> Node {
        Self::from_json_with_priority(json, None)
    }

    fn from_json_with_priority(json: &Value, priority: Option<&Value>) -> Node {
        let (json, priority) = match json {
            Value::Object(map) => {
                let priority = priority.or_else(|| map.get(".priority"));
                (map.get(".value").unwrap_or(json), priority)
            }
            _ => (json, priority),
        };
        let priority = priority.map_or_else(Node::empty, priority_from_json);
        match json {
            Value::Null => Node::empty(),
            Value::Bool(b) => Node::from(LeafNode::new(LeafValue::Bool(*b), priority)),
            Value::Number(n) => {
                Node::from(LeafNode::new(LeafValue::Number(n.as_f64().unwrap_or(0.0)), priority))
            }
            Value::String(s) => Node::from(LeafNode::new(LeafValue::String(s.clone()), priority)),
            Value::Array(items) => children_from_entries(
                items.iter().enumerate().map(|(i, v)| (i.to_string(), v)),
                priority,
            ),
            Value::Object(map) => children_from_entries(
                map.iter()
                    .filter(|(k, _)| !k.starts_with('.'))
                    .map(|(k, v)| (k.clone(), v)),
                priority,
            ),
        }
    }

    /// Exports the node as plain JSON.
    ///
    /// With `export` set, priorities are kept through `.priority` (and
    /// `.value` for leaves) so that [`Node::from_json`] round-trips. Without
    /// it, collections whose keys are all small non-negative integers are
    /// rendered as arrays.
    pub fn val(&self, export: bool) -> Value {
        match self {
            Node::Leaf(leaf) => {
                let value = leaf.value().to_json();
                if export && !leaf.priority().is_empty() {
                    let mut map = Map::new();
                    map.insert(".value".to_owned(), value);
                    map.insert(".priority".to_owned(), leaf.priority().val(false));
                    Value::Object(map)
                } else {
                    value
                }
            }
            Node::Children(c) if c.is_empty() => Value::Null,
            Node::Children(c) => {
                let mut map = Map::new();
                let mut max_key: i64 = 0;
                let mut all_integer_keys = true;
                for (name, child) in c.iter_keys() {
                    map.insert(name.clone(), child.val(export));
                    match array_index(name) {
                        Some(i) if all_integer_keys => max_key = max_key.max(i),
                        _ => all_integer_keys = false,
                    }
                }
                if !export && all_integer_keys && (max_key as usize) < 2 * map.len() {
                    let mut items = vec![Value::Null; max_key as usize + 1];
                    for (name, value) in map {
                        if let Some(i) = array_index(&name) {
                            items[i as usize] = value;
                        }
                    }
                    return Value::Array(items);
                }
                let priority = c.priority();
                if export && !priority.is_empty() {
                    map.insert(".priority".to_owned(), priority.val(false));
                }
                Value::Object(map)
            }
        }
    }
}

/// Non-negative canonical integer keys (`"0"`, `"17"`, not `"01"`).
fn array_index(name: &str) -> Option<i64> {
    if name.starts_with('-') || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    try_parse_int(name).filter(|i| *i >= 0)
}

fn priority_from_json(json: &Value) -> Node {
    match json {
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map_or_else(Node::empty, |f| Node::leaf(LeafValue::Number(f))),
        Value::String(s) => Node::leaf(LeafValue::String(s.clone())),
        _ => Node::empty(),
    }
}

fn children_from_entries<'a>(
    entries: impl Iterator<Item = (String, &'a Value)>,
    priority: Node,
) -> Node {
    let mut node = Node::empty();
    let mut any = false;
    for (name, value) in entries {
        let child = Node::from_json(value);
        if !child.is_empty() {
            any = true;
            node = node.update_immediate_child(&name, child);
        }
    }
    if !any {
        return Node::empty();
    }
    node.update_priority(priority)
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::leaf(b)
    }
}

impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Node::leaf(n)
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::leaf(n)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::leaf(s)
    }
}

impl From<&Value> for Node {
    fn from(json: &Value) -> Self {
        Node::from_json(json)
    }
}
