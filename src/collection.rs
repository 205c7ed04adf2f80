/// LiveCollection Collection Implementation
///
/// A `Collection` is the root of a stack of views: an ordered list of
/// records it owns, plus the emitter every view ultimately listens to.
/// Handles are cheap to clone and share the same state.
///
/// # Examples
///
/// ```
/// use livecollection::{attrs, Collection, Source};
///
/// let people = Collection::new("people");
/// let alice = people.add(attrs! { "name" => "Alice", "age" => 30 }).unwrap();
/// people.add(attrs! { "name" => "Bob", "age" => 25 }).unwrap();
///
/// assert_eq!(people.len(), 2);
/// assert_eq!(people.index_of(alice.id()), Some(0));
/// assert_eq!(people.at(1).unwrap().get("name").unwrap().as_string(), Some("Bob"));
/// ```

use crate::config::CollectionOptions;
use crate::error::{Error, Result};
use crate::events::{Event, EventOptions, Emitter, Listener, Subscription};
use crate::index::PositionCache;
use crate::ordering::OrderingRule;
use crate::record::{Attributes, Record, RecordId, RecordRef};
use crate::sequence::Sequence;
use crate::source::Source;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

struct CollectionState {
    records: Box<dyn Sequence<RecordRef>>,
    by_id: HashMap<RecordId, RecordRef>,
    positions: PositionCache,
    ordering: Option<OrderingRule>,
}

impl CollectionState {
    fn position_of(&self, id: RecordId) -> Option<usize> {
        if !self.by_id.contains_key(&id) {
            return None;
        }
        self.positions.position(id, self.records.as_ref())
    }

    fn insert(&mut self, index: usize, record: RecordRef) -> Result<()> {
        self.records.insert(index, record.clone())?;
        self.by_id.insert(record.id(), record);
        self.positions.invalidate();
        Ok(())
    }

    fn reload(&mut self, mut records: Vec<RecordRef>) {
        if let Some(rule) = &self.ordering {
            rule.sort(&mut records);
        }
        self.by_id = records.iter().map(|r| (r.id(), r.clone())).collect();
        self.records.reload(records);
        self.positions.invalidate();
    }
}

struct CollectionInner {
    name: Option<String>,
    state: RefCell<CollectionState>,
    emitter: Emitter<Event>,
}

#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(Some(name.into()), CollectionOptions::default())
    }

    pub fn anonymous() -> Self {
        Self::build(None, CollectionOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: CollectionOptions) -> Self {
        Self::build(Some(name.into()), options)
    }

    /// Create a collection pre-filled with `records` (no notifications).
    pub fn from_attributes(name: impl Into<String>, records: Vec<Attributes>) -> Self {
        Self::with_records(name, CollectionOptions::default(), records)
    }

    /// `from_attributes` with explicit options. Records keep the given order.
    pub fn with_records(name: impl Into<String>, options: CollectionOptions, records: Vec<Attributes>) -> Self {
        let collection = Self::with_options(name, options);
        collection
            .inner
            .state
            .borrow_mut()
            .reload(records.into_iter().map(Record::new).collect());
        collection
    }

    fn build(name: Option<String>, options: CollectionOptions) -> Self {
        let state = CollectionState {
            records: options.storage.new_sequence(),
            by_id: HashMap::new(),
            positions: PositionCache::new(),
            ordering: options.ordering,
        };
        Collection {
            inner: Rc::new(CollectionInner {
                name,
                state: RefCell::new(state),
                emitter: Emitter::new(),
            }),
        }
    }

    pub fn ordering(&self) -> Option<OrderingRule> {
        self.inner.state.borrow().ordering.clone()
    }

    /// Re-sort by the collection's ordering rule and announce `sort`.
    ///
    /// Updates never move records by themselves; call this after changing
    /// the attributes the rule depends on.
    pub fn sort(&self) -> Result<()> {
        {
            let mut state = self.inner.state.borrow_mut();
            let rule = state
                .ordering
                .clone()
                .ok_or_else(|| Error::InvalidOperation("cannot sort a collection without an ordering rule".to_string()))?;
            let mut records = state.records.to_vec();
            rule.sort(&mut records);
            state.records.reload(records);
            state.positions.invalidate();
        }
        self.emit(Event::Sort);
        Ok(())
    }

    /// Number of active subscriptions
    pub fn listener_count(&self) -> usize {
        self.inner.emitter.listener_count()
    }

    fn emit(&self, event: Event) {
        log::trace!("{}: emit {:?}", self.label(), crate::events::LoggedEvent::from(&event));
        self.inner.emitter.emit(&event);
    }

    fn label(&self) -> &str {
        self.inner.name.as_deref().unwrap_or("collection")
    }

    fn insert_at(&self, index: Option<usize>, attributes: Attributes) -> Result<RecordRef> {
        let record = Record::new(attributes);
        let position = {
            let mut state = self.inner.state.borrow_mut();
            let position = match (index, &state.ordering) {
                (Some(index), _) => {
                    let len = state.records.len();
                    if index > len {
                        return Err(Error::OutOfRange { index, len });
                    }
                    index
                }
                (None, Some(rule)) => rule.insertion_point(state.records.as_ref(), &record),
                (None, None) => state.records.len(),
            };
            state.insert(position, record.clone())?;
            position
        };
        self.emit(Event::Insert {
            record: record.clone(),
            options: EventOptions::at(position),
        });
        Ok(record)
    }

    fn member(&self, id: RecordId) -> Result<RecordRef> {
        self.get(id).ok_or(Error::UnknownRecord(id))
    }

    fn emit_update(&self, record: &RecordRef, changed: Vec<String>) {
        let index = self.index_of(record.id());
        self.emit(Event::Update {
            record: record.clone(),
            options: Some(EventOptions {
                index,
                previous_index: None,
                changed,
            }),
        });
    }
}

impl Source for Collection {
    fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }

    fn len(&self) -> usize {
        self.inner.state.borrow().records.len()
    }

    fn at(&self, index: usize) -> Option<RecordRef> {
        self.inner.state.borrow().records.get(index).cloned()
    }

    fn records(&self) -> Vec<RecordRef> {
        self.inner.state.borrow().records.to_vec()
    }

    fn get(&self, id: RecordId) -> Option<RecordRef> {
        self.inner.state.borrow().by_id.get(&id).cloned()
    }

    fn lookup(&self, id: RecordId) -> Option<RecordRef> {
        self.get(id)
    }

    fn index_of(&self, id: RecordId) -> Option<usize> {
        self.inner.state.borrow().position_of(id)
    }

    fn subscribe(&self, listener: Listener<Event>) -> Subscription {
        self.inner.emitter.subscribe(listener)
    }

    fn root(&self) -> Rc<dyn Source> {
        Rc::new(self.clone())
    }

    /// Insert in ordering-rule position, or at the end without a rule.
    fn add(&self, attributes: Attributes) -> Result<RecordRef> {
        self.insert_at(None, attributes)
    }

    fn add_at(&self, index: usize, attributes: Attributes) -> Result<RecordRef> {
        self.insert_at(Some(index), attributes)
    }

    fn remove(&self, id: RecordId) -> Result<RecordRef> {
        let (record, position) = {
            let mut state = self.inner.state.borrow_mut();
            let position = state.position_of(id).ok_or(Error::UnknownRecord(id))?;
            let record = state.records.remove(position)?;
            state.by_id.remove(&id);
            state.positions.invalidate();
            (record, position)
        };
        self.emit(Event::Remove {
            record: record.clone(),
            options: EventOptions::at(position),
        });
        Ok(record)
    }

    fn update(&self, id: RecordId, changes: Attributes) -> Result<RecordRef> {
        let record = self.member(id)?;
        let changed = record.apply(changes);
        if !changed.is_empty() {
            self.emit_update(&record, changed);
        }
        Ok(record)
    }

    fn unset(&self, id: RecordId, name: &str) -> Result<RecordRef> {
        let record = self.member(id)?;
        if record.unset(name) {
            self.emit_update(&record, vec![name.to_string()]);
        }
        Ok(record)
    }

    fn reset(&self, records: Vec<Attributes>) -> Result<()> {
        self.inner
            .state
            .borrow_mut()
            .reload(records.into_iter().map(Record::new).collect());
        self.emit(Event::Reset);
        Ok(())
    }

    fn trigger(&self, name: &str, record: Option<RecordRef>) {
        self.emit(Event::Custom {
            name: name.to_string(),
            record,
        });
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs;
    use crate::sequence::StorageHint;

    #[test]
    fn test_add_appends_and_reports_index() {
        let c = Collection::new("people");
        let log = c.event_log();
        c.add(attrs! { "name" => "a" }).unwrap();
        c.add(attrs! { "name" => "b" }).unwrap();
        let events = log.events();
        assert_eq!(log.names(), vec!["insert", "insert"]);
        assert_eq!(events[1].index, Some(1));
    }

    #[test]
    fn test_add_at_and_bounds() {
        let c = Collection::new("people");
        c.add(attrs! { "n" => 1 }).unwrap();
        c.add(attrs! { "n" => 3 }).unwrap();
        let two = c.add_at(1, attrs! { "n" => 2 }).unwrap();
        assert_eq!(c.index_of(two.id()), Some(1));
        assert!(matches!(
            c.add_at(9, attrs! { "n" => 9 }),
            Err(Error::OutOfRange { index: 9, len: 3 })
        ));
    }

    #[test]
    fn test_ordered_collection_inserts_in_order() {
        let options = CollectionOptions::new()
            .ordering(OrderingRule::by_attribute("n"))
            .storage(StorageHint::FastUpdates);
        let c = Collection::with_options("ranked", options);
        for n in [5, 1, 3, 1] {
            c.add(attrs! { "n" => n }).unwrap();
        }
        let ns: Vec<i32> = c.pluck("n").into_iter().map(|v| v.and_then(|v| v.as_i32()).unwrap()).collect();
        assert_eq!(ns, vec![1, 1, 3, 5]);
    }

    #[test]
    fn test_remove_reports_prior_index() {
        let c = Collection::new("people");
        let a = c.add(attrs! { "n" => 1 }).unwrap();
        let b = c.add(attrs! { "n" => 2 }).unwrap();
        let log = c.event_log();
        c.remove(b.id()).unwrap();
        assert_eq!(log.events()[0].index, Some(1));
        assert!(matches!(c.remove(b.id()), Err(Error::UnknownRecord(_))));
        assert_eq!(c.index_of(a.id()), Some(0));
    }

    #[test]
    fn test_update_emits_only_on_change() {
        let c = Collection::new("people");
        let a = c.add(attrs! { "n" => 1 }).unwrap();
        let log = c.event_log();
        c.update(a.id(), attrs! { "n" => 1 }).unwrap();
        assert!(log.is_empty());
        c.update(a.id(), attrs! { "n" => 2, "m" => 0 }).unwrap();
        c.unset(a.id(), "m").unwrap();
        c.unset(a.id(), "m").unwrap();
        assert_eq!(log.names(), vec!["update", "update"]);
        assert!(!a.has("m"));
    }

    #[test]
    fn test_sort_requires_rule() {
        let plain = Collection::new("plain");
        assert!(matches!(plain.sort(), Err(Error::InvalidOperation(_))));

        let ranked = Collection::with_options("ranked", CollectionOptions::new().ordering(OrderingRule::by_attribute("n")));
        let a = ranked.add(attrs! { "n" => 1 }).unwrap();
        ranked.add(attrs! { "n" => 2 }).unwrap();
        ranked.update(a.id(), attrs! { "n" => 3 }).unwrap();
        assert_eq!(ranked.index_of(a.id()), Some(0));

        let log = ranked.event_log();
        ranked.sort().unwrap();
        assert_eq!(log.names(), vec!["sort"]);
        assert_eq!(ranked.index_of(a.id()), Some(1));
    }

    #[test]
    fn test_reset_and_stack_operations() {
        let c = Collection::from_attributes("people", vec![attrs! { "n" => 1 }, attrs! { "n" => 2 }]);
        let log = c.event_log();
        c.reset(vec![attrs! { "n" => 7 }]).unwrap();
        assert_eq!(log.names(), vec!["reset"]);
        assert_eq!(c.len(), 1);

        c.push(attrs! { "n" => 8 }).unwrap();
        c.unshift(attrs! { "n" => 6 }).unwrap();
        assert_eq!(c.shift().unwrap().get("n").unwrap().as_i32(), Some(6));
        assert_eq!(c.pop().unwrap().get("n").unwrap().as_i32(), Some(8));
        c.pop().unwrap();
        assert!(c.pop().is_err());
    }

    #[test]
    fn test_trigger_custom_event() {
        let c = Collection::anonymous();
        let log = c.event_log();
        c.trigger("ping", None);
        assert_eq!(log.names(), vec!["ping"]);
    }
}
