//! Query parameters: ordering, range bounds and limits.
//!
//! Parameters are built with consuming builder methods that validate as
//! they go, so an invalid combination never reaches the sync tree.

use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::path::Path;
use crate::snap::{Index, Node, Post};
use crate::util::{MAX_NAME, MIN_NAME};
use crate::validation;
use crate::view::filter::NodeFilter;

/// One end of a range.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    pub value: Value,
    pub name: Option<String>,
    pub inclusive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewFrom {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limit {
    pub count: u32,
    pub from: ViewFrom,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryParams {
    index: Index,
    order_set: bool,
    start: Option<Bound>,
    end: Option<Bound>,
    limit: Option<Limit>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Builders ─────────────────────────────────────────────────────────

    pub fn order_by(mut self, index: Index) -> Result<Self, SyncError> {
        if self.order_set {
            return Err(SyncError::InvalidQuery("you can't combine multiple order_by calls".into()));
        }
        self.index = index;
        self.order_set = true;
        self.validated()
    }

    pub fn order_by_child(self, path: &str) -> Result<Self, SyncError> {
        match path {
            "$key" => return Err(SyncError::InvalidQuery("use order_by(Index::Key) instead of $key".into())),
            "$priority" => {
                return Err(SyncError::InvalidQuery("use order_by(Index::Priority) instead of $priority".into()))
            }
            "$value" => return Err(SyncError::InvalidQuery("use order_by(Index::Value) instead of $value".into())),
            _ => {}
        }
        validation::validate_path_string(path)?;
        self.order_by(Index::path(Path::new(path)))
    }

    pub fn start_at(self, value: Value, name: Option<&str>) -> Result<Self, SyncError> {
        self.with_start(value, name.map(str::to_owned), true)
    }

    /// Like [`start_at`](Self::start_at) but excludes the bound itself.
    pub fn start_after(self, value: Value, name: Option<&str>) -> Result<Self, SyncError> {
        let name = match name {
            Some(name) => Some(name.to_owned()),
            None if !self.index.is_key() => Some(MAX_NAME.to_owned()),
            None => None,
        };
        self.with_start(value, name, false)
    }

    pub fn end_at(self, value: Value, name: Option<&str>) -> Result<Self, SyncError> {
        self.with_end(value, name.map(str::to_owned), true)
    }

    /// Like [`end_at`](Self::end_at) but excludes the bound itself.
    pub fn end_before(self, value: Value, name: Option<&str>) -> Result<Self, SyncError> {
        let name = match name {
            Some(name) => Some(name.to_owned()),
            None if !self.index.is_key() => Some(MIN_NAME.to_owned()),
            None => None,
        };
        self.with_end(value, name, false)
    }

    pub fn equal_to(self, value: Value, name: Option<&str>) -> Result<Self, SyncError> {
        if self.start.is_some() {
            return Err(SyncError::InvalidQuery("equal_to: start was already set".into()));
        }
        if self.end.is_some() {
            return Err(SyncError::InvalidQuery("equal_to: end was already set".into()));
        }
        self.start_at(value.clone(), name)?.end_at(value, name)
    }

    pub fn limit_to_first(self, count: u32) -> Result<Self, SyncError> {
        self.with_limit(count, ViewFrom::Left)
    }

    pub fn limit_to_last(self, count: u32) -> Result<Self, SyncError> {
        self.with_limit(count, ViewFrom::Right)
    }

    fn with_start(mut self, value: Value, name: Option<String>, inclusive: bool) -> Result<Self, SyncError> {
        if self.start.is_some() {
            return Err(SyncError::InvalidQuery("start was already set".into()));
        }
        check_bound_name(name.as_deref())?;
        self.start = Some(Bound { value, name, inclusive });
        self.validated()
    }

    fn with_end(mut self, value: Value, name: Option<String>, inclusive: bool) -> Result<Self, SyncError> {
        if self.end.is_some() {
            return Err(SyncError::InvalidQuery("end was already set".into()));
        }
        check_bound_name(name.as_deref())?;
        self.end = Some(Bound { value, name, inclusive });
        self.validated()
    }

    fn with_limit(mut self, count: u32, from: ViewFrom) -> Result<Self, SyncError> {
        if count == 0 {
            return Err(SyncError::InvalidQuery("limit must be a positive integer".into()));
        }
        if self.limit.is_some() {
            return Err(SyncError::InvalidQuery("limit was already set".into()));
        }
        self.limit = Some(Limit { count, from });
        Ok(self)
    }

    fn validated(self) -> Result<Self, SyncError> {
        let bounds = [self.start.as_ref(), self.end.as_ref()];
        match &self.index {
            Index::Key => {
                for bound in bounds.into_iter().flatten() {
                    if bound.name.as_deref().is_some_and(|n| n != MIN_NAME && n != MAX_NAME) {
                        return Err(SyncError::InvalidQuery(
                            "when ordering by key, only one argument may be passed to a range bound".into(),
                        ));
                    }
                    if !bound.value.is_string() {
                        return Err(SyncError::InvalidQuery(
                            "when ordering by key, range bounds must be strings".into(),
                        ));
                    }
                }
            }
            Index::Priority => {
                for bound in bounds.into_iter().flatten() {
                    if validation::validate_priority(&bound.value).is_err() {
                        return Err(SyncError::InvalidQuery(
                            "when ordering by priority, range bounds must be valid priorities (null, a number, or a string)"
                                .into(),
                        ));
                    }
                }
            }
            Index::Value | Index::Path(_) => {
                for bound in bounds.into_iter().flatten() {
                    if bound.value.is_object() || bound.value.is_array() {
                        return Err(SyncError::InvalidQuery("range bounds cannot be objects".into()));
                    }
                }
            }
        }
        Ok(self)
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn start(&self) -> Option<&Bound> {
        self.start.as_ref()
    }

    pub fn end(&self) -> Option<&Bound> {
        self.end.as_ref()
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit.map(|l| l.count)
    }

    pub fn is_view_from_left(&self) -> bool {
        match self.limit {
            Some(limit) => limit.from == ViewFrom::Left,
            None => self.start.is_some(),
        }
    }

    pub fn loads_all_data(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.limit.is_none()
    }

    /// Loads all data and orders by priority.
    pub fn is_default(&self) -> bool {
        self.loads_all_data() && self.index == Index::Priority
    }

    pub fn start_post(&self) -> Post {
        match &self.start {
            Some(bound) => {
                let name = bound.name.as_deref().unwrap_or(MIN_NAME);
                Post::At(self.index.make_post(&Node::from_json(&bound.value), name))
            }
            None => Post::Min,
        }
    }

    pub fn end_post(&self) -> Post {
        match &self.end {
            Some(bound) => {
                let name = bound.name.as_deref().unwrap_or(MAX_NAME);
                Post::At(self.index.make_post(&Node::from_json(&bound.value), name))
            }
            None => Post::Max,
        }
    }

    pub fn start_inclusive(&self) -> bool {
        self.start.as_ref().map_or(true, |b| b.inclusive)
    }

    pub fn end_inclusive(&self) -> bool {
        self.end.as_ref().map_or(true, |b| b.inclusive)
    }

    /// The wire form of these parameters, keyed `sp sn ep en l vf i`.
    /// Exclusive bounds add `sin`/`ein` set to `false`.
    pub fn query_object(&self) -> Map<String, Value> {
        let mut obj = Map::new();
        if let Some(start) = &self.start {
            obj.insert("sp".into(), start.value.clone());
            if let Some(name) = &start.name {
                obj.insert("sn".into(), Value::String(name.clone()));
            }
            if !start.inclusive {
                obj.insert("sin".into(), Value::Bool(false));
            }
        }
        if let Some(end) = &self.end {
            obj.insert("ep".into(), end.value.clone());
            if let Some(name) = &end.name {
                obj.insert("en".into(), Value::String(name.clone()));
            }
            if !end.inclusive {
                obj.insert("ein".into(), Value::Bool(false));
            }
        }
        if let Some(limit) = self.limit {
            obj.insert("l".into(), Value::from(limit.count));
            let from = if self.is_view_from_left() { "l" } else { "r" };
            obj.insert("vf".into(), Value::String(from.into()));
        }
        if self.index != Index::Priority {
            obj.insert("i".into(), Value::String(self.index.to_string()));
        }
        obj
    }

    /// Canonical identifier: the wire object with sorted keys, or
    /// `"default"` when there is nothing to say.
    pub fn query_identifier(&self) -> String {
        let obj = self.query_object();
        if obj.is_empty() {
            return "default".to_owned();
        }
        let mut entries: Vec<_> = obj.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let sorted: Map<String, Value> = entries.into_iter().collect();
        Value::Object(sorted).to_string()
    }

    /// The filter that shapes this query's event cache.
    pub fn node_filter(&self) -> NodeFilter {
        if self.loads_all_data() {
            NodeFilter::indexed(self.index.clone())
        } else if self.limit.is_some() {
            NodeFilter::limited(self)
        } else {
            NodeFilter::ranged(self)
        }
    }
}

fn check_bound_name(name: Option<&str>) -> Result<(), SyncError> {
    match name {
        Some(MIN_NAME) | Some(MAX_NAME) | None => Ok(()),
        Some(name) => validation::validate_key(name),
    }
}

/// A location plus the parameters shaping what is observed there.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    path: Path,
    params: QueryParams,
}

impl Query {
    /// The unfiltered query at `path`.
    pub fn new(path: Path) -> Self {
        Query { path, params: QueryParams::default() }
    }

    pub fn with_params(path: Path, params: QueryParams) -> Self {
        Query { path, params }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    pub fn index(&self) -> &Index {
        &self.params.index
    }

    pub fn query_identifier(&self) -> String {
        self.params.query_identifier()
    }

    pub fn loads_all_data(&self) -> bool {
        self.params.loads_all_data()
    }

    pub fn is_default(&self) -> bool {
        self.params.is_default()
    }

    /// The query that is actually listened for upstream: queries loading
    /// all data are served by the plain listen at their path.
    pub fn for_listening(&self) -> Query {
        if self.loads_all_data() && !self.is_default() {
            Query::new(self.path.clone())
        } else {
            self.clone()
        }
    }

    pub(crate) fn key(&self) -> QueryKey {
        QueryKey { path: self.path.clone(), query_id: self.query_identifier() }
    }
}

/// Typed registry key for a query: its location and canonical identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub path: Path,
    pub query_id: String,
}
