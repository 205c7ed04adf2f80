/// LiveCollection - Live Filtered Views over Ordered Collections
///
/// A `Collection` holds an ordered list of records and announces every change.
/// A `VirtualCollection` is a filtered, optionally re-sorted projection of a
/// collection (or of another view) that keeps itself up to date from those
/// announcements, one notification in for at most one notification out,
/// without rescanning its base except on a reset or a filter change.
///
/// ```
/// use livecollection::{attrs, Collection, Source, ViewOptions, VirtualCollection};
///
/// let base = Collection::new("items");
/// base.add(attrs! { "ok" => true, "foo" => "ccc" }).unwrap();
/// base.add(attrs! { "ok" => false, "foo" => "bbb" }).unwrap();
/// base.add(attrs! { "ok" => true, "foo" => "aaa" }).unwrap();
///
/// let view = VirtualCollection::new(
///     base.clone(),
///     ViewOptions::new().matching(attrs! { "ok" => true }).sorted_by("foo"),
/// );
/// base.add(attrs! { "ok" => true, "foo" => "abc" }).unwrap();
///
/// let foos: Vec<_> = view.pluck("foo").into_iter().flatten().map(|v| v.to_string()).collect();
/// assert_eq!(foos, vec!["aaa", "abc", "ccc"]);
/// ```

pub mod collection;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod index;
pub mod ordering;
pub mod record;
pub mod sequence;
pub mod source;
pub mod value;
pub mod virtual_collection;

pub use collection::Collection;
pub use config::{CollectionOptions, ViewConfig, ViewOptions};
pub use error::{Error, Result};
pub use events::{Emitter, Event, EventLog, EventName, EventOptions, Listener, LoggedEvent, Subscription};
pub use filter::{AttributeMatch, FilterSpec, MembershipFilter, Predicate};
pub use index::{OrderedIndex, PositionCache};
pub use ordering::{CompareFn, KeyFn, OrderingRule};
pub use record::{Attributes, Record, RecordId, RecordRef};
pub use sequence::{ArraySequence, Sequence, StorageHint, TieredVectorSequence};
pub use source::Source;
pub use value::Value;
pub use virtual_collection::VirtualCollection;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::attrs;
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn foos(source: &dyn Source) -> Vec<String> {
        source
            .pluck("foo")
            .into_iter()
            .map(|v| v.map(|v| v.to_string()).unwrap_or_default())
            .collect()
    }

    fn ids(source: &dyn Source) -> Vec<RecordId> {
        source.records().iter().map(|r| r.id()).collect()
    }

    /// Wraps a source and counts identity lookups made against it.
    struct Counting<S> {
        inner: S,
        lookups: Rc<Cell<usize>>,
    }

    impl<S: Source> Counting<S> {
        fn new(inner: S, lookups: Rc<Cell<usize>>) -> Self {
            Counting { inner, lookups }
        }

        fn count(&self) {
            self.lookups.set(self.lookups.get() + 1);
        }
    }

    impl<S: Source> Source for Counting<S> {
        fn name(&self) -> Option<String> {
            self.inner.name()
        }
        fn len(&self) -> usize {
            self.inner.len()
        }
        fn at(&self, index: usize) -> Option<RecordRef> {
            self.inner.at(index)
        }
        fn records(&self) -> Vec<RecordRef> {
            self.inner.records()
        }
        fn get(&self, id: RecordId) -> Option<RecordRef> {
            self.count();
            self.inner.get(id)
        }
        fn lookup(&self, id: RecordId) -> Option<RecordRef> {
            self.count();
            self.inner.lookup(id)
        }
        fn index_of(&self, id: RecordId) -> Option<usize> {
            self.inner.index_of(id)
        }
        fn subscribe(&self, listener: Listener<Event>) -> Subscription {
            self.inner.subscribe(listener)
        }
        fn root(&self) -> Rc<dyn Source> {
            self.inner.root()
        }
        fn add(&self, attributes: Attributes) -> Result<RecordRef> {
            self.inner.add(attributes)
        }
        fn add_at(&self, index: usize, attributes: Attributes) -> Result<RecordRef> {
            self.inner.add_at(index, attributes)
        }
        fn remove(&self, id: RecordId) -> Result<RecordRef> {
            self.inner.remove(id)
        }
        fn update(&self, id: RecordId, changes: Attributes) -> Result<RecordRef> {
            self.inner.update(id, changes)
        }
        fn unset(&self, id: RecordId, name: &str) -> Result<RecordRef> {
            self.inner.unset(id, name)
        }
        fn reset(&self, records: Vec<Attributes>) -> Result<()> {
            self.inner.reset(records)
        }
        fn trigger(&self, name: &str, record: Option<RecordRef>) {
            self.inner.trigger(name, record)
        }
    }

    #[test]
    fn test_filtered_view_over_sorted_collection() {
        init_logging();
        let base = Collection::with_options(
            "items",
            CollectionOptions::new().ordering(OrderingRule::by_attribute("foo")),
        );
        base.add(attrs! { "ok" => true, "foo" => "ccc" }).unwrap();
        base.add(attrs! { "ok" => false, "foo" => "bbb" }).unwrap();
        base.add(attrs! { "ok" => true, "foo" => "aaa" }).unwrap();

        let view = VirtualCollection::new(base.clone(), ViewOptions::new().matching(attrs! { "ok" => true }));
        assert_eq!(foos(&view), vec!["aaa", "ccc"]);

        let log = view.event_log();
        base.add(attrs! { "ok" => true, "foo" => "abc" }).unwrap();
        assert_eq!(foos(&view), vec!["aaa", "abc", "ccc"]);
        assert_eq!(log.names(), vec!["insert"]);
        assert_eq!(log.events()[0].index, Some(1));
    }

    #[test]
    fn test_demotion_emits_single_remove() {
        let base = Collection::from_attributes("items", vec![attrs! { "type" => "a" }, attrs! { "type" => "b" }]);
        let view = VirtualCollection::new(base.clone(), ViewOptions::new().matching(attrs! { "type" => "a" }));
        let log = view.event_log();

        base.update(base.at(0).unwrap().id(), attrs! { "type" => "b" }).unwrap();
        assert_eq!(log.names(), vec!["remove"]);
        assert_eq!(view.len(), 0);
    }

    #[test]
    fn test_promotion_emits_single_insert() {
        let base = Collection::from_attributes("items", vec![attrs! { "type" => "a" }, attrs! { "type" => "b" }]);
        let view = VirtualCollection::new(base.clone(), ViewOptions::new().matching(attrs! { "type" => "a" }));
        let log = view.event_log();

        base.update(base.at(1).unwrap().id(), attrs! { "type" => "a" }).unwrap();
        assert_eq!(log.names(), vec!["insert"]);
        assert_eq!(log.count("update"), 0);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_nested_views_iterate_without_lookups() {
        init_logging();
        let lookups = Rc::new(Cell::new(0));
        let base = Collection::from_attributes(
            "items",
            vec![
                attrs! { "type" => "a", "foo" => "1" },
                attrs! { "type" => "b", "foo" => "2" },
                attrs! { "type" => "a", "foo" => "3" },
            ],
        );
        let only_a = || ViewOptions::new().matching(attrs! { "type" => "a" });

        let outer = VirtualCollection::new(Counting::new(base.clone(), lookups.clone()), only_a());
        let middle = VirtualCollection::new(Counting::new(outer.clone(), lookups.clone()), only_a());
        let inner = VirtualCollection::new(Counting::new(middle.clone(), lookups.clone()), only_a().name("inner"));

        let log = inner.event_log();
        base.add(attrs! { "type" => "a", "foo" => "4" }).unwrap();
        base.update(base.at(1).unwrap().id(), attrs! { "type" => "a" }).unwrap();
        base.remove(base.at(0).unwrap().id()).unwrap();

        assert_eq!(foos(&inner), vec!["2", "3", "4"]);
        assert_eq!(inner.records().len(), inner.len());
        assert_eq!(lookups.get(), 0);
        assert_eq!(log.names(), vec!["insert", "insert", "remove"]);
        assert_eq!(log.events()[1].index, Some(1));

        // identity lookups skip the intermediate views
        let first = base.at(0).unwrap();
        assert!(inner.lookup(first.id()).is_some());
        assert_eq!(lookups.get(), 0);
    }

    #[test]
    fn test_reset_through_nested_views() {
        let base = Collection::from_attributes("items", vec![attrs! { "type" => "a" }]);
        let outer = VirtualCollection::new(base.clone(), ViewOptions::new().matching(attrs! { "type" => "a" }));
        let inner = VirtualCollection::new(outer.clone(), ViewOptions::new());
        let log = inner.event_log();

        base.reset(vec![
            attrs! { "type" => "a" },
            attrs! { "type" => "b" },
            attrs! { "type" => "a" },
        ])
        .unwrap();
        assert_eq!(log.names(), vec!["reset"]);
        assert_eq!(inner.len(), 2);
    }

    #[test]
    fn test_filter_change_on_middle_view_resets_children() {
        let base = Collection::from_attributes(
            "items",
            vec![attrs! { "type" => "a" }, attrs! { "type" => "b" }, attrs! { "type" => "b" }],
        );
        let middle = VirtualCollection::new(base.clone(), ViewOptions::new().matching(attrs! { "type" => "a" }));
        let child = VirtualCollection::new(middle.clone(), ViewOptions::new());
        let log = child.event_log();

        middle.update_filter(Some(FilterSpec::matching(attrs! { "type" => "b" })));
        assert_eq!(log.names(), vec!["reset"]);
        assert_eq!(child.len(), 2);
    }

    #[test]
    fn test_child_follows_moves_in_sorted_parent() {
        let base = Collection::new("items");
        for foo in ["b", "c", "a"] {
            base.add(attrs! { "foo" => foo }).unwrap();
        }
        let sorted = VirtualCollection::new(base.clone(), ViewOptions::new().sorted_by("foo"));
        let child = VirtualCollection::new(sorted.clone(), ViewOptions::new());
        let log = child.event_log();

        let a = base.at(2).unwrap();
        base.update(a.id(), attrs! { "foo" => "d" }).unwrap();
        assert_eq!(foos(&sorted), vec!["b", "c", "d"]);
        assert_eq!(foos(&child), vec!["b", "c", "d"]);
        let events = log.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].index, Some(2));
        assert_eq!(events[0].previous_index, Some(0));
    }

    #[test]
    fn test_views_over_one_base_do_not_interfere() {
        let base = Collection::new("items");
        let evens = VirtualCollection::new(
            base.clone(),
            ViewOptions::new().filter(FilterSpec::predicate(|r, _| r.get("n").and_then(|v| v.as_i32()).map_or(false, |n| n % 2 == 0))),
        );
        let descending = VirtualCollection::new(
            base.clone(),
            ViewOptions::new().ordering(OrderingRule::by_comparator(|a, b| {
                b.get("n").unwrap_or(Value::Null).total_cmp(&a.get("n").unwrap_or(Value::Null))
            })),
        );
        for n in 0..6 {
            base.add(attrs! { "n" => n }).unwrap();
        }
        assert_eq!(evens.len(), 3);
        assert_eq!(descending.len(), 6);
        assert_eq!(descending.at(0).unwrap().get("n"), Some(Value::Int32(5)));
        assert_eq!(base.listener_count(), 2);
    }

    /// Drives a mixed stream of mutations through a collection and checks,
    /// after every step, that each view holds exactly the accepted records in
    /// the right order.
    #[test]
    fn test_membership_and_order_hold_after_every_mutation() {
        init_logging();
        let base = Collection::new("items");
        let accepts = |r: &Record| r.get("n").and_then(|v| v.as_i32()).map_or(false, |n| n % 3 != 0);
        let plain = VirtualCollection::new(
            base.clone(),
            ViewOptions::new().filter(FilterSpec::predicate(move |r, _| accepts(r))),
        );
        let ranked = VirtualCollection::new(
            base.clone(),
            ViewOptions::new()
                .filter(FilterSpec::predicate(move |r, _| accepts(r)))
                .sorted_by("n")
                .storage(StorageHint::FastUpdates),
        );
        let rule = OrderingRule::by_attribute("n");

        let mut seed: u64 = 7;
        let mut next = move |bound: usize| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) as usize) % bound.max(1)
        };

        for step in 0..300 {
            match next(4) {
                0 | 1 => {
                    let at = next(base.len() + 1);
                    base.add_at(at, attrs! { "n" => next(50) as i32 }).unwrap();
                }
                2 if !base.is_empty() => {
                    let victim = base.at(next(base.len())).unwrap();
                    base.remove(victim.id()).unwrap();
                }
                _ if !base.is_empty() => {
                    let target = base.at(next(base.len())).unwrap();
                    base.update(target.id(), attrs! { "n" => next(50) as i32 }).unwrap();
                }
                _ => {}
            }

            let expected: Vec<RecordId> = base.records().iter().filter(|r| accepts(r)).map(|r| r.id()).collect();
            assert_eq!(ids(&plain), expected, "base order broken at step {}", step);

            let ranked_ids: HashSet<RecordId> = ids(&ranked).into_iter().collect();
            let expected_set: HashSet<RecordId> = expected.iter().copied().collect();
            assert_eq!(ranked_ids, expected_set, "membership broken at step {}", step);
            assert!(rule.is_sorted(&ranked.records()), "sort order broken at step {}", step);

            let mut rebuilt: Vec<RecordRef> = base.records().into_iter().filter(|r| accepts(r)).collect();
            rule.sort(&mut rebuilt);
            let rebuilt: Vec<RecordId> = rebuilt.iter().map(|r| r.id()).collect();
            assert_eq!(ids(&ranked), rebuilt, "ranked order differs from a rebuild at step {}", step);
        }
    }

    #[test]
    fn test_projection() {
        let base = Collection::from_attributes("items", vec![attrs! { "type" => "a", "n" => 1 }, attrs! { "type" => "b", "n" => 2 }]);
        let view = VirtualCollection::new(base, ViewOptions::new().matching(attrs! { "type" => "a" }));
        assert_eq!(view.to_json(), serde_json::json!([{ "type": "a", "n": 1 }]));
        assert_eq!(view.to_vec(), vec![attrs! { "type" => "a", "n" => 1 }]);
    }
}
