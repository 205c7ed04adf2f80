/// The capability set shared by collections and views.
///
/// Anything implementing `Source` can serve as the base of a
/// `VirtualCollection`, so views compose over collections and over other
/// views alike. Mutations are always addressed to the base: a view forwards
/// them and only changes its own state when the resulting notification
/// comes back.

use crate::error::{Error, Result};
use crate::events::{Event, EventLog, Listener, Subscription};
use crate::record::{Attributes, RecordId, RecordRef};
use crate::value::Value;
use std::rc::Rc;

pub trait Source {
    fn name(&self) -> Option<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at `index` in this source's order
    fn at(&self, index: usize) -> Option<RecordRef>;

    /// Snapshot of all records, in order
    fn records(&self) -> Vec<RecordRef>;

    /// Member lookup by identity
    fn get(&self, id: RecordId) -> Option<RecordRef>;

    fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Identity lookup against the root collection, regardless of membership
    fn lookup(&self, id: RecordId) -> Option<RecordRef>;

    /// Position of a member in this source's order
    fn index_of(&self, id: RecordId) -> Option<usize>;

    fn subscribe(&self, listener: Listener<Event>) -> Subscription;

    /// The collection at the bottom of a stack of views
    fn root(&self) -> Rc<dyn Source>;

    fn add(&self, attributes: Attributes) -> Result<RecordRef>;

    fn add_at(&self, index: usize, attributes: Attributes) -> Result<RecordRef>;

    fn remove(&self, id: RecordId) -> Result<RecordRef>;

    /// Merge `changes` into a record's attributes
    fn update(&self, id: RecordId, changes: Attributes) -> Result<RecordRef>;

    fn unset(&self, id: RecordId, name: &str) -> Result<RecordRef>;

    /// Replace the whole content
    fn reset(&self, records: Vec<Attributes>) -> Result<()>;

    /// Raise a custom notification
    fn trigger(&self, name: &str, record: Option<RecordRef>);

    fn push(&self, attributes: Attributes) -> Result<RecordRef> {
        self.add_at(self.len(), attributes)
    }

    fn pop(&self) -> Result<RecordRef> {
        let last = self
            .len()
            .checked_sub(1)
            .and_then(|i| self.at(i))
            .ok_or(Error::OutOfRange { index: 0, len: 0 })?;
        self.remove(last.id())
    }

    fn unshift(&self, attributes: Attributes) -> Result<RecordRef> {
        self.add_at(0, attributes)
    }

    fn shift(&self) -> Result<RecordRef> {
        let first = self.at(0).ok_or(Error::OutOfRange { index: 0, len: 0 })?;
        self.remove(first.id())
    }

    /// Plain attribute maps of all records, in order
    fn to_vec(&self) -> Vec<Attributes> {
        self.records().iter().map(|r| r.to_attributes()).collect()
    }

    /// JSON array of plain objects, in order
    fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.records().iter().map(|r| r.to_json()).collect())
    }

    /// Value of one attribute for every record, in order
    fn pluck(&self, name: &str) -> Vec<Option<Value>> {
        self.records().iter().map(|r| r.get(name)).collect()
    }

    /// Subscribe with a closure
    fn on<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Event) + 'static,
        Self: Sized,
    {
        self.subscribe(Rc::new(listener))
    }

    /// Start recording this source's notifications
    fn event_log(&self) -> EventLog {
        EventLog::listen(|listener| self.subscribe(listener))
    }
}
