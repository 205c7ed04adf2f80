/// LiveCollection Virtual Collection Implementation
///
/// A `VirtualCollection` is a live, filtered and optionally re-sorted
/// projection of a base `Source`. It keeps an `OrderedIndex` of the base
/// records its filter accepts and patches it from the base's notifications,
/// re-emitting each one in its own coordinates:
///
/// | Base notification | Condition | View emits |
/// |---|---|---|
/// | `insert` | accepted, not yet a member | `insert` at the view position |
/// | `remove` | was a member | `remove` at the prior view position |
/// | `update` | accepted, was a member | `update` |
/// | `update` | accepted, was not a member | `insert` |
/// | `update` | rejected, was a member | `remove` |
/// | `reset` | always | rebuild, then `reset` |
/// | `sort` | no own ordering rule | reorder from base, then `sort` |
///
/// Views implement `Source` themselves, so they stack: a view of a view
/// works exactly like a view of a collection. Mutations made through a view
/// are forwarded to its base; the view only changes when the base reports
/// back.
///
/// # Examples
///
/// ```
/// use livecollection::{attrs, Collection, Source, ViewOptions, VirtualCollection};
///
/// let tasks = Collection::new("tasks");
/// tasks.add(attrs! { "title" => "write", "done" => false }).unwrap();
/// let review = tasks.add(attrs! { "title" => "review", "done" => false }).unwrap();
///
/// let open = VirtualCollection::new(tasks.clone(), ViewOptions::new().matching(attrs! { "done" => false }));
/// assert_eq!(open.len(), 2);
///
/// tasks.update(review.id(), attrs! { "done" => true }).unwrap();
/// assert_eq!(open.len(), 1);
/// ```

use crate::collection::Collection;
use crate::config::{CollectionOptions, ViewConfig, ViewOptions};
use crate::error::{Error, Result};
use crate::events::{Emitter, Event, EventName, EventOptions, Listener, LoggedEvent, Subscription};
use crate::filter::{FilterSpec, MembershipFilter};
use crate::index::OrderedIndex;
use crate::ordering::OrderingRule;
use crate::record::{Attributes, Record, RecordId, RecordRef};
use crate::sequence::StorageHint;
use crate::source::Source;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

struct ViewState {
    filter: MembershipFilter,
    ordering: Option<OrderingRule>,
    storage: StorageHint,
    index: OrderedIndex,
}

struct ViewInner {
    name: Option<String>,
    base: Rc<dyn Source>,
    root: Rc<dyn Source>,
    state: RefCell<ViewState>,
    emitter: Emitter<Event>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl ViewInner {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("view")
    }

    fn emit(&self, event: Event) {
        log::trace!("{}: emit {:?}", self.label(), LoggedEvent::from(&event));
        self.emitter.emit(&event);
    }

    /// Recompute membership, evaluating the filter outside of any borrow.
    fn rebuild(&self) {
        let (filter, ordering, storage) = {
            let state = self.state.borrow();
            (state.filter.clone(), state.ordering.clone(), state.storage)
        };
        let mut index = OrderedIndex::new(storage);
        index.rebuild(self.base.as_ref(), &filter, ordering.as_ref());
        log::debug!(
            "{}: rebuilt with {} of {} records",
            self.label(),
            index.len(),
            self.base.len()
        );
        self.state.borrow_mut().index = index;
    }

    fn handle(&self, event: &Event) {
        match event {
            Event::Insert { record, options } => {
                if !self.is_member(record.id()) && self.accepts(record, options.index) {
                    self.insert_member(record, options);
                }
            }
            Event::Remove { record, options } => self.remove_member(record, options),
            Event::Update {
                record,
                options: Some(options),
            } => self.on_update(record, options),
            Event::Update { record, options: None } => {
                log::debug!("{}: ignoring update of {} without options", self.label(), record.id());
            }
            Event::Reset => {
                self.rebuild();
                self.emit(Event::Reset);
            }
            Event::Sort => self.on_sort(),
            // A base view's filter change reaches us as the reset that follows it
            Event::Filter => {}
            Event::Custom { name, record } => {
                if record.as_ref().map_or(true, |r| self.is_member(r.id())) {
                    self.emit(Event::Custom {
                        name: name.clone(),
                        record: record.clone(),
                    });
                }
            }
        }
    }

    fn is_member(&self, id: RecordId) -> bool {
        self.state.borrow().index.contains(id)
    }

    fn accepts(&self, record: &Record, base_position: Option<usize>) -> bool {
        let filter = self.state.borrow().filter.clone();
        filter.accepts(record, base_position)
    }

    fn insert_member(&self, record: &RecordRef, options: &EventOptions) {
        let position = {
            let mut state = self.state.borrow_mut();
            let ViewState { index, ordering, .. } = &mut *state;
            index.insert(record.clone(), self.base.as_ref(), ordering.as_ref(), options.index)
        };
        if let Some(position) = position {
            self.emit(Event::Insert {
                record: record.clone(),
                options: EventOptions {
                    index: Some(position),
                    previous_index: None,
                    changed: options.changed.clone(),
                },
            });
        }
    }

    fn remove_member(&self, record: &RecordRef, options: &EventOptions) {
        let position = self.state.borrow_mut().index.remove(record.id());
        if let Some(position) = position {
            self.emit(Event::Remove {
                record: record.clone(),
                options: EventOptions {
                    index: Some(position),
                    previous_index: None,
                    changed: options.changed.clone(),
                },
            });
        }
    }

    fn on_update(&self, record: &RecordRef, options: &EventOptions) {
        let was_member = self.is_member(record.id());
        let accepted = self.accepts(record, options.index);
        match (accepted, was_member) {
            (true, true) => {
                let (index, previous_index) = {
                    let mut state = self.state.borrow_mut();
                    let ViewState { index, ordering, .. } = &mut *state;
                    let moved = match ordering {
                        Some(rule) => index.reposition(record.id(), rule, self.base.as_ref()),
                        None if options.previous_index.is_some() => {
                            index.follow_base(record.id(), self.base.as_ref(), options.index)
                        }
                        None => None,
                    };
                    match moved {
                        Some((from, to)) => (Some(to), Some(from)),
                        None => (index.position_of(record.id()), None),
                    }
                };
                self.emit(Event::Update {
                    record: record.clone(),
                    options: Some(EventOptions {
                        index,
                        previous_index,
                        changed: options.changed.clone(),
                    }),
                });
            }
            (true, false) => self.insert_member(record, options),
            (false, true) => self.remove_member(record, options),
            (false, false) => {}
        }
    }

    fn on_sort(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.ordering.is_some() {
                return;
            }
            state.index.reorder_from(self.base.records());
        }
        self.emit(Event::Sort);
    }

    fn stop_listening(&self) {
        let subscriptions: Vec<Subscription> = self.subscriptions.borrow_mut().drain(..).collect();
        if !subscriptions.is_empty() {
            log::debug!("{}: stopped listening", self.label());
        }
        for subscription in &subscriptions {
            subscription.dispose();
        }
    }
}

impl Drop for ViewInner {
    fn drop(&mut self) {
        for subscription in self.subscriptions.get_mut().drain(..) {
            subscription.dispose();
        }
    }
}

#[derive(Clone)]
pub struct VirtualCollection {
    inner: Rc<ViewInner>,
}

impl VirtualCollection {
    pub fn new(base: impl Source + 'static, options: ViewOptions) -> Self {
        Self::over(Rc::new(base), options)
    }

    /// Build a view over a shared base.
    pub fn over(base: Rc<dyn Source>, options: ViewOptions) -> Self {
        let root = base.root();
        let inner = Rc::new(ViewInner {
            name: options.name,
            base,
            root,
            state: RefCell::new(ViewState {
                filter: MembershipFilter::new(options.filter),
                ordering: options.ordering,
                storage: options.storage,
                index: OrderedIndex::new(options.storage),
            }),
            emitter: Emitter::new(),
            subscriptions: RefCell::new(Vec::new()),
        });
        inner.rebuild();

        let weak = Rc::downgrade(&inner);
        let subscription = inner.base.subscribe(Rc::new(move |event: &Event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle(event);
            }
        }));
        inner.subscriptions.borrow_mut().push(subscription);
        VirtualCollection { inner }
    }

    /// Build a view from a JSON `ViewConfig`.
    pub fn from_config(base: impl Source + 'static, json: &str) -> Result<Self> {
        let options = ViewOptions::try_from(ViewConfig::from_json(json)?)?;
        Ok(Self::new(base, options))
    }

    pub fn base(&self) -> Rc<dyn Source> {
        self.inner.base.clone()
    }

    pub fn ordering(&self) -> Option<OrderingRule> {
        self.inner.state.borrow().ordering.clone()
    }

    /// Replace the filter, rebuild, then announce `filter` and `reset`.
    pub fn update_filter(&self, spec: Option<FilterSpec>) {
        self.inner.state.borrow_mut().filter = MembershipFilter::new(spec);
        self.inner.rebuild();
        self.inner.emit(Event::Filter);
        self.inner.emit(Event::Reset);
    }

    /// Re-sort by the view's own ordering rule and announce `sort`.
    pub fn sort(&self) -> Result<()> {
        {
            let mut state = self.inner.state.borrow_mut();
            let ViewState { index, ordering, .. } = &mut *state;
            let rule = ordering
                .as_ref()
                .ok_or_else(|| Error::InvalidOperation("cannot sort a view without an ordering rule".to_string()))?;
            index.sort(rule);
        }
        self.inner.emit(Event::Sort);
        Ok(())
    }

    /// Position at which `record` would enter this view in its current order.
    pub fn sorted_index(&self, record: &Record) -> usize {
        let state = self.inner.state.borrow();
        state
            .index
            .insertion_point(record, self.inner.base.as_ref(), state.ordering.as_ref(), None)
    }

    /// Copy the current members, in view order, into a new independent
    /// `Collection` that keeps the view's ordering rule.
    pub fn to_collection(&self, name: impl Into<String>) -> Collection {
        let state = self.inner.state.borrow();
        let records = state.index.iter().map(|r| r.attributes().clone()).collect();
        let options = CollectionOptions {
            ordering: state.ordering.clone(),
            storage: state.storage,
        };
        Collection::with_records(name, options, records)
    }

    /// Stop listening to the base when `owner` emits `event_name`.
    pub fn bind_lifecycle<M: EventName + 'static>(&self, owner: &Emitter<M>, event_name: &str) {
        let weak = Rc::downgrade(&self.inner);
        let event_name = event_name.to_string();
        let subscription = owner.subscribe(Rc::new(move |msg: &M| {
            if msg.event_name() == event_name {
                if let Some(inner) = weak.upgrade() {
                    inner.stop_listening();
                }
            }
        }));
        self.inner.subscriptions.borrow_mut().push(subscription);
    }

    pub fn close_with<M: EventName + 'static>(&self, owner: &Emitter<M>) {
        self.bind_lifecycle(owner, "close");
    }

    pub fn destroy_with<M: EventName + 'static>(&self, owner: &Emitter<M>) {
        self.bind_lifecycle(owner, "destroy");
    }

    /// Sever every subscription. The view keeps its last contents and no
    /// longer follows the base. Safe to call more than once.
    pub fn stop_listening(&self) {
        self.inner.stop_listening();
    }

    pub fn is_listening(&self) -> bool {
        self.inner
            .subscriptions
            .borrow()
            .iter()
            .any(|s| !s.is_disposed())
    }
}

impl Source for VirtualCollection {
    fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }

    fn len(&self) -> usize {
        self.inner.state.borrow().index.len()
    }

    fn at(&self, index: usize) -> Option<RecordRef> {
        self.inner.state.borrow().index.at(index)
    }

    fn records(&self) -> Vec<RecordRef> {
        self.inner.state.borrow().index.records()
    }

    fn get(&self, id: RecordId) -> Option<RecordRef> {
        self.inner.state.borrow().index.get(id)
    }

    fn lookup(&self, id: RecordId) -> Option<RecordRef> {
        self.inner.root.lookup(id)
    }

    fn index_of(&self, id: RecordId) -> Option<usize> {
        self.inner.state.borrow().index.position_of(id)
    }

    fn subscribe(&self, listener: Listener<Event>) -> Subscription {
        self.inner.emitter.subscribe(listener)
    }

    fn root(&self) -> Rc<dyn Source> {
        self.inner.root.clone()
    }

    fn add(&self, attributes: Attributes) -> Result<RecordRef> {
        self.inner.base.add(attributes)
    }

    fn add_at(&self, index: usize, attributes: Attributes) -> Result<RecordRef> {
        self.inner.base.add_at(index, attributes)
    }

    fn remove(&self, id: RecordId) -> Result<RecordRef> {
        self.inner.base.remove(id)
    }

    fn update(&self, id: RecordId, changes: Attributes) -> Result<RecordRef> {
        self.inner.base.update(id, changes)
    }

    fn unset(&self, id: RecordId, name: &str) -> Result<RecordRef> {
        self.inner.base.unset(id, name)
    }

    fn reset(&self, records: Vec<Attributes>) -> Result<()> {
        self.inner.base.reset(records)
    }

    fn trigger(&self, name: &str, record: Option<RecordRef>) {
        self.inner.base.trigger(name, record)
    }

    fn push(&self, attributes: Attributes) -> Result<RecordRef> {
        self.inner.base.push(attributes)
    }

    fn pop(&self) -> Result<RecordRef> {
        self.inner.base.pop()
    }

    fn unshift(&self, attributes: Attributes) -> Result<RecordRef> {
        self.inner.base.unshift(attributes)
    }

    fn shift(&self) -> Result<RecordRef> {
        self.inner.base.shift()
    }
}

impl fmt::Debug for VirtualCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualCollection")
            .field("name", &self.inner.name)
            .field("len", &self.len())
            .field("listening", &self.is_listening())
            .finish()
    }
}
