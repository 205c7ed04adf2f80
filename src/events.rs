/// Notifications - Change Propagation for LiveCollection
///
/// Collections and views announce every structural change through an owned
/// `Emitter`. Views subscribe to their base's emitter, translate each
/// notification into their own coordinate space and re-emit it to their own
/// subscribers.
///
/// # Notification Types
///
/// - `Insert`: a record entered at `options.index`
/// - `Remove`: a record left from `options.index`
/// - `Update`: attributes of a record changed in place
/// - `Reset`: the whole content was replaced
/// - `Sort`: the order changed without a change of content
/// - `Filter`: a view's membership filter was replaced (followed by `Reset`)
/// - `Custom`: any other named notification, passed through untouched
///
/// Dispatch is synchronous: `emit` returns after every listener has run.
/// A listener must not mutate the collection it is listening to.

use crate::record::{RecordId, RecordRef};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Options carried by a notification, in the emitter's own coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventOptions {
    /// Position of the record in the emitter's order
    pub index: Option<usize>,
    /// Former position, set when an update moved the record
    pub previous_index: Option<usize>,
    /// Names of the attributes changed by an update
    pub changed: Vec<String>,
}

impl EventOptions {
    pub fn at(index: usize) -> Self {
        EventOptions {
            index: Some(index),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Insert { record: RecordRef, options: EventOptions },
    Remove { record: RecordRef, options: EventOptions },
    /// `options` is `None` when the notification arrived without a payload;
    /// views ignore such updates.
    Update { record: RecordRef, options: Option<EventOptions> },
    Reset,
    Sort,
    Filter,
    Custom { name: String, record: Option<RecordRef> },
}

impl Event {
    /// The record affected by this notification, if any
    pub fn record(&self) -> Option<&RecordRef> {
        match self {
            Event::Insert { record, .. } | Event::Remove { record, .. } | Event::Update { record, .. } => {
                Some(record)
            }
            Event::Custom { record, .. } => record.as_ref(),
            Event::Reset | Event::Sort | Event::Filter => None,
        }
    }

    /// Position reported by the notification, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            Event::Insert { options, .. } | Event::Remove { options, .. } => options.index,
            Event::Update { options, .. } => options.as_ref().and_then(|o| o.index),
            _ => None,
        }
    }
}

/// Notifications that can be matched by name (lifecycle binding, logs).
pub trait EventName {
    fn event_name(&self) -> &str;
}

impl EventName for Event {
    fn event_name(&self) -> &str {
        match self {
            Event::Insert { .. } => "insert",
            Event::Remove { .. } => "remove",
            Event::Update { .. } => "update",
            Event::Reset => "reset",
            Event::Sort => "sort",
            Event::Filter => "filter",
            Event::Custom { name, .. } => name,
        }
    }
}

impl EventName for String {
    fn event_name(&self) -> &str {
        self
    }
}

impl EventName for &'static str {
    fn event_name(&self) -> &str {
        self
    }
}

/// Shared listener callback
pub type Listener<M> = Rc<dyn Fn(&M)>;

struct Entry<M> {
    id: u64,
    active: Rc<Cell<bool>>,
    listener: Listener<M>,
}

type Entries<M> = Rc<RefCell<Vec<Entry<M>>>>;

/// Owned publish/subscribe hub, one per collection or view.
pub struct Emitter<M> {
    entries: Entries<M>,
    next_id: Cell<u64>,
}

impl<M: 'static> Emitter<M> {
    pub fn new() -> Self {
        Emitter {
            entries: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// handle is disposed or the emitter is cleared.
    pub fn subscribe(&self, listener: Listener<M>) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let active = Rc::new(Cell::new(true));
        self.entries.borrow_mut().push(Entry {
            id,
            active: active.clone(),
            listener,
        });

        let entries: Weak<RefCell<Vec<Entry<M>>>> = Rc::downgrade(&self.entries);
        Subscription::new(move || {
            active.set(false);
            if let Some(entries) = entries.upgrade() {
                entries.borrow_mut().retain(|e| e.id != id);
            }
        })
    }

    /// Deliver `msg` to every active listener, in subscription order.
    ///
    /// Listeners are snapshotted first, so a listener may subscribe or
    /// dispose during dispatch; a listener disposed mid-dispatch is skipped.
    pub fn emit(&self, msg: &M) {
        let snapshot: Vec<(Rc<Cell<bool>>, Listener<M>)> = self
            .entries
            .borrow()
            .iter()
            .map(|e| (e.active.clone(), e.listener.clone()))
            .collect();
        for (active, listener) in snapshot {
            if active.get() {
                listener(msg);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Drop every listener
    pub fn clear(&self) {
        let drained: Vec<Entry<M>> = self.entries.borrow_mut().drain(..).collect();
        for entry in drained {
            entry.active.set(false);
        }
    }
}

impl<M: 'static> Default for Emitter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for Emitter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.entries.borrow().len())
            .finish()
    }
}

/// Disposable handle returned by `subscribe`.
///
/// Dropping the handle does not unsubscribe; call `dispose`.
#[must_use = "dropping a Subscription does not unsubscribe; call `dispose`"]
pub struct Subscription {
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + 'static) -> Self {
        Subscription {
            cancel: RefCell::new(Some(Box::new(cancel))),
        }
    }

    /// Unsubscribe. Idempotent.
    pub fn dispose(&self) {
        let cancel = self.cancel.borrow_mut().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.cancel.borrow().is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// One recorded notification
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedEvent {
    pub name: String,
    pub record: Option<RecordId>,
    pub index: Option<usize>,
    pub previous_index: Option<usize>,
}

impl From<&Event> for LoggedEvent {
    fn from(event: &Event) -> Self {
        let previous_index = match event {
            Event::Update { options: Some(options), .. } => options.previous_index,
            _ => None,
        };
        LoggedEvent {
            name: event.event_name().to_string(),
            record: event.record().map(|r| r.id()),
            index: event.index(),
            previous_index,
        }
    }
}

/// Records the notifications of a collection or view.
///
/// The generation counter is incremented each time the buffer is cleared
/// or drained.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<LoggedEvent>>>,
    generation: Cell<u64>,
    subscription: Option<Subscription>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording the notifications of `emitter`.
    pub fn attach(emitter: &Emitter<Event>) -> Self {
        Self::listen(|listener| emitter.subscribe(listener))
    }

    /// Start recording through any subscription mechanism.
    pub fn listen(subscribe: impl FnOnce(Listener<Event>) -> Subscription) -> Self {
        let events: Rc<RefCell<Vec<LoggedEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let subscription = subscribe(Rc::new(move |event: &Event| {
            sink.borrow_mut().push(LoggedEvent::from(event));
        }));
        EventLog {
            events,
            generation: Cell::new(0),
            subscription: Some(subscription),
        }
    }

    /// Add an event by hand
    pub fn push(&self, event: &Event) {
        self.events.borrow_mut().push(LoggedEvent::from(event));
    }

    /// All events since the last clear
    pub fn events(&self) -> Vec<LoggedEvent> {
        self.events.borrow().clone()
    }

    /// Names of all events since the last clear
    pub fn names(&self) -> Vec<String> {
        self.events.borrow().iter().map(|e| e.name.clone()).collect()
    }

    /// Number of recorded events named `name`
    pub fn count(&self, name: &str) -> usize {
        self.events.borrow().iter().filter(|e| e.name == name).count()
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
        self.generation.set(self.generation.get() + 1);
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Take the recorded events, clearing the buffer
    pub fn drain(&self) -> Vec<LoggedEvent> {
        self.generation.set(self.generation.get() + 1);
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Stop recording. Recorded events are kept.
    pub fn detach(&self) {
        if let Some(subscription) = &self.subscription {
            subscription.dispose();
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_in_subscription_order() {
        let emitter: Emitter<String> = Emitter::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s1 = seen.clone();
        let _a = emitter.subscribe(Rc::new(move |m: &String| s1.borrow_mut().push(format!("a:{}", m))));
        let s2 = seen.clone();
        let _b = emitter.subscribe(Rc::new(move |m: &String| s2.borrow_mut().push(format!("b:{}", m))));

        emitter.emit(&"close".to_string());
        assert_eq!(*seen.borrow(), vec!["a:close".to_string(), "b:close".to_string()]);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let emitter: Emitter<String> = Emitter::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = emitter.subscribe(Rc::new(move |_: &String| h.set(h.get() + 1)));

        emitter.emit(&"x".to_string());
        sub.dispose();
        sub.dispose();
        assert!(sub.is_disposed());
        assert_eq!(emitter.listener_count(), 0);

        emitter.emit(&"x".to_string());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_dispose_during_dispatch_skips_listener() {
        let emitter: Emitter<String> = Emitter::new();
        let hits = Rc::new(Cell::new(0));
        let later: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let l = later.clone();
        let _first = emitter.subscribe(Rc::new(move |_: &String| {
            if let Some(sub) = l.borrow().as_ref() {
                sub.dispose();
            }
        }));
        let h = hits.clone();
        let second = emitter.subscribe(Rc::new(move |_: &String| h.set(h.get() + 1)));
        *later.borrow_mut() = Some(second);

        emitter.emit(&"x".to_string());
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn test_event_log_generation() {
        let emitter: Emitter<Event> = Emitter::new();
        let log = EventLog::attach(&emitter);
        assert!(log.is_empty());
        assert_eq!(log.generation(), 0);

        emitter.emit(&Event::Reset);
        emitter.emit(&Event::Sort);
        assert_eq!(log.names(), vec!["reset".to_string(), "sort".to_string()]);

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert!(log.is_empty());
        assert_eq!(log.generation(), 1);

        log.detach();
        emitter.emit(&Event::Reset);
        assert!(log.is_empty());
    }
}
