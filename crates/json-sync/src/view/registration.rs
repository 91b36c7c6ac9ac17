//! Listener identities and their callbacks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::SyncError;
use crate::path::Path;
use crate::query::Query;

use super::change::{Change, EventType};
use super::event::{CancelEvent, DataEvent, DataSnapshot, Event};

/// Called with the snapshot and, for `child_*` events, the name of the
/// preceding child.
pub type DataCallback = Arc<dyn Fn(&DataSnapshot, Option<&str>) + Send + Sync>;

pub type CancelCallback = Arc<dyn Fn(&SyncError) + Send + Sync>;

/// One listener attached to a query.
///
/// A registration without callbacks is a removal wildcard: it matches every
/// registration of the same shape.
#[derive(Clone)]
pub enum EventRegistration {
    Value {
        callback: Option<DataCallback>,
        cancel: Option<CancelCallback>,
    },
    Child {
        callbacks: Option<BTreeMap<EventType, DataCallback>>,
        cancel: Option<CancelCallback>,
    },
}

impl EventRegistration {
    pub fn value(callback: DataCallback) -> Self {
        EventRegistration::Value { callback: Some(callback), cancel: None }
    }

    /// Listens for the given `child_*` event types.
    ///
    /// # Panics
    ///
    /// If `callbacks` holds a `value` entry.
    pub fn child(callbacks: impl IntoIterator<Item = (EventType, DataCallback)>) -> Self {
        let callbacks: BTreeMap<_, _> = callbacks.into_iter().collect();
        assert!(!callbacks.contains_key(&EventType::Value), "value callbacks belong in a value registration");
        EventRegistration::Child { callbacks: Some(callbacks), cancel: None }
    }

    pub fn with_cancel(self, cancel: CancelCallback) -> Self {
        match self {
            EventRegistration::Value { callback, .. } => EventRegistration::Value { callback, cancel: Some(cancel) },
            EventRegistration::Child { callbacks, .. } => EventRegistration::Child { callbacks, cancel: Some(cancel) },
        }
    }

    /// Matches every value registration on a query.
    pub fn any_value() -> Self {
        EventRegistration::Value { callback: None, cancel: None }
    }

    /// Matches every child registration on a query.
    pub fn any_child() -> Self {
        EventRegistration::Child { callbacks: None, cancel: None }
    }

    pub fn responds_to(&self, event_type: EventType) -> bool {
        match self {
            EventRegistration::Value { .. } => event_type == EventType::Value,
            EventRegistration::Child { callbacks, .. } => {
                callbacks.as_ref().is_some_and(|c| c.contains_key(&event_type))
            }
        }
    }

    /// Identity used for removal. Callbacks compare by pointer; an unset
    /// side matches anything of the same shape.
    pub fn matches(&self, other: &EventRegistration) -> bool {
        match (self, other) {
            (EventRegistration::Value { callback: a, .. }, EventRegistration::Value { callback: b, .. }) => {
                match (a, b) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    _ => true,
                }
            }
            (EventRegistration::Child { callbacks: a, .. }, EventRegistration::Child { callbacks: b, .. }) => {
                match (a, b) {
                    (Some(a), Some(b)) => {
                        a.len() == b.len()
                            && a.iter().all(|(event_type, cb)| b.get(event_type).is_some_and(|other| Arc::ptr_eq(cb, other)))
                    }
                    _ => true,
                }
            }
            _ => false,
        }
    }

    pub fn has_any_callback(&self) -> bool {
        match self {
            EventRegistration::Value { callback, .. } => callback.is_some(),
            EventRegistration::Child { callbacks, .. } => callbacks.is_some(),
        }
    }

    pub fn callback_for(&self, event_type: EventType) -> Option<&DataCallback> {
        match self {
            EventRegistration::Value { callback, .. } if event_type == EventType::Value => callback.as_ref(),
            EventRegistration::Value { .. } => None,
            EventRegistration::Child { callbacks, .. } => callbacks.as_ref()?.get(&event_type),
        }
    }

    pub fn cancel_callback(&self) -> Option<&CancelCallback> {
        match self {
            EventRegistration::Value { cancel, .. } | EventRegistration::Child { cancel, .. } => cancel.as_ref(),
        }
    }

    /// Turns a materialized change into an event for this registration.
    ///
    /// # Panics
    ///
    /// On a `child_*` change without a child name.
    pub fn create_event(self: &Arc<Self>, change: &Change, query: &Query) -> Event {
        let path = match self.as_ref() {
            EventRegistration::Value { .. } => query.path().clone(),
            EventRegistration::Child { .. } => {
                let name = change.child_name.as_deref().expect("child event without a child name");
                query.path().child(name)
            }
        };
        Event::Data(DataEvent {
            event_type: change.event_type,
            registration: Arc::clone(self),
            snapshot: DataSnapshot::new(change.snapshot.clone(), path, query.index().clone()),
            prev_name: change.prev_name.clone(),
        })
    }

    /// `None` unless a cancel callback was supplied.
    pub fn create_cancel_event(self: &Arc<Self>, error: &SyncError, path: &Path) -> Option<Event> {
        self.cancel_callback()?;
        Some(Event::Cancel(CancelEvent { registration: Arc::clone(self), error: error.clone(), path: path.clone() }))
    }
}

impl fmt::Debug for EventRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventRegistration::Value { callback, cancel } => f
                .debug_struct("Value")
                .field("callback", &callback.is_some())
                .field("cancel", &cancel.is_some())
                .finish(),
            EventRegistration::Child { callbacks, cancel } => f
                .debug_struct("Child")
                .field("callbacks", &callbacks.as_ref().map(|c| c.keys().collect::<Vec<_>>()))
                .field("cancel", &cancel.is_some())
                .finish(),
        }
    }
}
