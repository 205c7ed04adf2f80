/// Ordered membership index
///
/// `OrderedIndex` holds the members of a view in view order, plus an
/// identity map for O(1) membership tests. Positions of members are served
/// from a `PositionCache` that is rebuilt lazily after structural changes.

use crate::filter::MembershipFilter;
use crate::ordering::OrderingRule;
use crate::record::{Record, RecordId, RecordRef};
use crate::sequence::{Sequence, StorageHint};
use crate::source::Source;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Lazily built map from identity to position.
#[derive(Debug, Default)]
pub struct PositionCache {
    positions: RefCell<Option<HashMap<RecordId, usize>>>,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached positions. Call after any insert, remove or reorder.
    pub fn invalidate(&self) {
        self.positions.borrow_mut().take();
    }

    pub fn position(&self, id: RecordId, members: &dyn Sequence<RecordRef>) -> Option<usize> {
        let mut cached = self.positions.borrow_mut();
        let positions = cached.get_or_insert_with(|| {
            members
                .iter()
                .enumerate()
                .map(|(i, r)| (r.id(), i))
                .collect()
        });
        positions.get(&id).copied()
    }
}

pub struct OrderedIndex {
    members: Box<dyn Sequence<RecordRef>>,
    by_id: HashMap<RecordId, RecordRef>,
    positions: PositionCache,
}

impl OrderedIndex {
    pub fn new(storage: StorageHint) -> Self {
        OrderedIndex {
            members: storage.new_sequence(),
            by_id: HashMap::new(),
            positions: PositionCache::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn get(&self, id: RecordId) -> Option<RecordRef> {
        self.by_id.get(&id).cloned()
    }

    pub fn at(&self, index: usize) -> Option<RecordRef> {
        self.members.get(index).cloned()
    }

    pub fn records(&self) -> Vec<RecordRef> {
        self.members.to_vec()
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = &RecordRef> + '_> {
        self.members.iter()
    }

    pub fn position_of(&self, id: RecordId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.positions.position(id, self.members.as_ref())
    }

    /// Recompute membership from scratch with one pass over the base.
    pub fn rebuild(&mut self, base: &dyn Source, filter: &MembershipFilter, ordering: Option<&OrderingRule>) {
        let mut accepted: Vec<RecordRef> = base
            .records()
            .into_iter()
            .enumerate()
            .filter(|(position, record)| filter.accepts(record, Some(*position)))
            .map(|(_, record)| record)
            .collect();
        if let Some(rule) = ordering {
            rule.sort(&mut accepted);
        }
        self.by_id = accepted.iter().map(|r| (r.id(), r.clone())).collect();
        self.members.reload(accepted);
        self.positions.invalidate();
    }

    /// Where `record` belongs among the current members.
    ///
    /// With a rule this is the rule's insertion point, with ties broken by
    /// base position so that the result matches what `rebuild` produces.
    /// Without one, members keep base order, so the record goes before the
    /// first member that sits after it in the base. `base_position` is the
    /// record's position in the base if the caller already knows it.
    pub fn insertion_point(
        &self,
        record: &Record,
        base: &dyn Source,
        ordering: Option<&OrderingRule>,
        base_position: Option<usize>,
    ) -> usize {
        let target = base_position.unwrap_or_else(|| base_rank(base, record.id()));
        match ordering {
            Some(rule) => rule.insertion_point_with(self.members.as_ref(), record, &mut |m: &Record| {
                base_rank(base, m.id()) < target
            }),
            None => self
                .members
                .partition_point(&mut |m: &RecordRef| base_rank(base, m.id()) < target),
        }
    }

    /// Add a member at its proper position. Returns the position, or `None`
    /// if the record was already a member.
    pub fn insert(
        &mut self,
        record: RecordRef,
        base: &dyn Source,
        ordering: Option<&OrderingRule>,
        base_position: Option<usize>,
    ) -> Option<usize> {
        if self.contains(record.id()) {
            return None;
        }
        let position = self.insertion_point(&record, base, ordering, base_position);
        self.members.insert(position, record.clone()).ok()?;
        self.by_id.insert(record.id(), record);
        self.positions.invalidate();
        Some(position)
    }

    /// Drop a member. Returns the position it held.
    pub fn remove(&mut self, id: RecordId) -> Option<usize> {
        let position = self.position_of(id)?;
        self.members.remove(position).ok()?;
        self.by_id.remove(&id);
        self.positions.invalidate();
        Some(position)
    }

    /// Move a member whose sort key changed. Returns `(from, to)` when the
    /// record actually moved.
    pub fn reposition(&mut self, id: RecordId, rule: &OrderingRule, base: &dyn Source) -> Option<(usize, usize)> {
        let from = self.position_of(id)?;
        let record = self.members.get(from)?.clone();
        let in_order = |a: &Record, b: &Record| match rule.compare(a, b) {
            Ordering::Less => true,
            Ordering::Equal => base_rank(base, a.id()) <= base_rank(base, b.id()),
            Ordering::Greater => false,
        };
        let before_ok = from == 0 || self.members.get(from - 1).map_or(true, |prev| in_order(&**prev, &*record));
        let after_ok = self.members.get(from + 1).map_or(true, |next| in_order(&*record, &**next));
        if before_ok && after_ok {
            return None;
        }
        self.members.remove(from).ok()?;
        let to = self.insertion_point(&record, base, Some(rule), None);
        self.members.insert(to, record).ok()?;
        self.positions.invalidate();
        (from != to).then_some((from, to))
    }

    /// Move a member to follow its new base position, for views without a
    /// rule of their own over a base that moved the record. Returns
    /// `(from, to)` when the record actually moved.
    pub fn follow_base(
        &mut self,
        id: RecordId,
        base: &dyn Source,
        base_position: Option<usize>,
    ) -> Option<(usize, usize)> {
        let from = self.position_of(id)?;
        let record = self.members.remove(from).ok()?;
        let to = self.insertion_point(&record, base, None, base_position);
        self.members.insert(to, record).ok()?;
        self.positions.invalidate();
        (from != to).then_some((from, to))
    }

    /// Restore base order without re-evaluating membership.
    pub fn reorder_from(&mut self, base_records: Vec<RecordRef>) {
        let ordered: Vec<RecordRef> = base_records
            .into_iter()
            .filter(|r| self.by_id.contains_key(&r.id()))
            .collect();
        self.members.reload(ordered);
        self.positions.invalidate();
    }

    pub fn sort(&mut self, rule: &OrderingRule) {
        let mut records = self.members.to_vec();
        rule.sort(&mut records);
        self.members.reload(records);
        self.positions.invalidate();
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.by_id.clear();
        self.positions.invalidate();
    }
}

/// Position in the base, with records the base does not hold sorting last.
fn base_rank(base: &dyn Source, id: RecordId) -> usize {
    base.index_of(id).unwrap_or(usize::MAX)
}

impl std::fmt::Debug for OrderedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedIndex").field("len", &self.len()).finish()
    }
}
