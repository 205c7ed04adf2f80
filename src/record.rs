/// LiveCollection Records
///
/// A Record is an entity with a stable identity and a mutable set of named
/// attributes. Records are owned by a `Collection` and shared by reference
/// (`RecordRef`) with every view over it; views never copy them.

use crate::value::Value;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Named attributes of a record
pub type Attributes = HashMap<String, Value>;

/// Shared handle to a record
pub type RecordRef = Rc<Record>;

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Stable record identity, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

impl RecordId {
    pub(crate) fn next() -> Self {
        RecordId(NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

pub struct Record {
    id: RecordId,
    attributes: RefCell<Attributes>,
}

impl Record {
    pub(crate) fn new(attributes: Attributes) -> RecordRef {
        Rc::new(Record {
            id: RecordId::next(),
            attributes: RefCell::new(attributes),
        })
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Returns the attribute value, or `None` when the attribute is unset.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.attributes.borrow().get(name).cloned()
    }

    /// Returns true if the attribute is set (possibly to `Value::Null`).
    pub fn has(&self, name: &str) -> bool {
        self.attributes.borrow().contains_key(name)
    }

    pub fn attributes(&self) -> Ref<'_, Attributes> {
        self.attributes.borrow()
    }

    /// Plain copy of the attributes
    pub fn to_attributes(&self) -> Attributes {
        self.attributes.borrow().clone()
    }

    /// Plain JSON object of the attributes
    pub fn to_json(&self) -> serde_json::Value {
        let obj: serde_json::Map<String, serde_json::Value> = self
            .attributes
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        serde_json::Value::Object(obj)
    }

    /// Merge `changes` into the attributes.
    /// Returns the names whose value actually changed, sorted.
    pub(crate) fn apply(&self, changes: Attributes) -> Vec<String> {
        let mut attrs = self.attributes.borrow_mut();
        let mut changed = Vec::new();
        for (name, value) in changes {
            if attrs.get(&name) != Some(&value) {
                changed.push(name.clone());
                attrs.insert(name, value);
            }
        }
        changed.sort();
        changed
    }

    /// Remove an attribute. Returns true if it was set.
    pub(crate) fn unset(&self, name: &str) -> bool {
        self.attributes.borrow_mut().remove(name).is_some()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("attributes", &*self.attributes.borrow())
            .finish()
    }
}

/// Build an `Attributes` map from `name => value` pairs.
///
/// ```
/// use livecollection::{attrs, Value};
///
/// let a = attrs! { "type" => "a", "rank" => 3 };
/// assert_eq!(a.get("rank"), Some(&Value::Int32(3)));
/// ```
#[macro_export]
macro_rules! attrs {
    () => { $crate::Attributes::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Attributes::new();
        $( map.insert(($name).to_string(), $crate::Value::from($value)); )+
        map
    }};
}
