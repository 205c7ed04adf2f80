/// Ordering Rules
///
/// A view either inherits its base's order or carries its own rule: a key
/// extractor (ascending by `Value::total_cmp`) or a full three-way
/// comparator. The rule is chosen explicitly by the caller.

use crate::record::{Record, RecordRef};
use crate::sequence::Sequence;
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

pub type KeyFn = Rc<dyn Fn(&Record) -> Value>;
pub type CompareFn = Rc<dyn Fn(&Record, &Record) -> Ordering>;

#[derive(Clone)]
pub enum OrderingRule {
    /// Ascending by the extracted key
    KeyExtractor(KeyFn),
    /// Full ordering by a three-way comparator
    Comparator(CompareFn),
}

impl OrderingRule {
    pub fn by_key<F>(key: F) -> Self
    where
        F: Fn(&Record) -> Value + 'static,
    {
        OrderingRule::KeyExtractor(Rc::new(key))
    }

    /// Ascending by one attribute; unset attributes sort with nulls, last.
    pub fn by_attribute(name: impl Into<String>) -> Self {
        let name = name.into();
        OrderingRule::KeyExtractor(Rc::new(move |record: &Record| record.get(&name).unwrap_or(Value::Null)))
    }

    pub fn by_comparator<F>(cmp: F) -> Self
    where
        F: Fn(&Record, &Record) -> Ordering + 'static,
    {
        OrderingRule::Comparator(Rc::new(cmp))
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        match self {
            OrderingRule::KeyExtractor(key) => key(a).total_cmp(&key(b)),
            OrderingRule::Comparator(cmp) => cmp(a, b),
        }
    }

    /// Position at which `record` would be inserted into `members`, which
    /// must already be sorted under this rule. Equal records stay ahead of
    /// the new one.
    pub fn insertion_point(&self, members: &dyn Sequence<RecordRef>, record: &Record) -> usize {
        self.insertion_point_with(members, record, &mut |_| true)
    }

    /// Like `insertion_point`, with `ahead(member)` deciding whether a member
    /// that compares equal to `record` stays ahead of it. `ahead` must hold
    /// for a prefix of the equal run.
    ///
    /// Key extractors use a binary search; comparators a linear scan for the
    /// first member that sorts after the record.
    pub fn insertion_point_with(
        &self,
        members: &dyn Sequence<RecordRef>,
        record: &Record,
        ahead: &mut dyn FnMut(&Record) -> bool,
    ) -> usize {
        match self {
            OrderingRule::KeyExtractor(key) => {
                let target = key(record);
                members.partition_point(&mut |m: &RecordRef| match key(&**m).total_cmp(&target) {
                    Ordering::Less => true,
                    Ordering::Equal => ahead(&**m),
                    Ordering::Greater => false,
                })
            }
            OrderingRule::Comparator(cmp) => members
                .iter()
                .position(|m| match cmp(record, &**m) {
                    Ordering::Less => true,
                    Ordering::Equal => !ahead(&**m),
                    Ordering::Greater => false,
                })
                .unwrap_or(members.len()),
        }
    }

    /// Stable sort under this rule.
    pub fn sort(&self, records: &mut Vec<RecordRef>) {
        match self {
            OrderingRule::KeyExtractor(key) => {
                let mut keyed: Vec<(Value, RecordRef)> = records.drain(..).map(|r| (key(&*r), r)).collect();
                keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
                records.extend(keyed.into_iter().map(|(_, r)| r));
            }
            OrderingRule::Comparator(cmp) => records.sort_by(|a, b| cmp(&**a, &**b)),
        }
    }

    /// True if `members` is non-decreasing under this rule
    pub fn is_sorted(&self, members: &[RecordRef]) -> bool {
        members
            .windows(2)
            .all(|pair| self.compare(&pair[0], &pair[1]) != Ordering::Greater)
    }
}

impl fmt::Debug for OrderingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingRule::KeyExtractor(_) => write!(f, "KeyExtractor(..)"),
            OrderingRule::Comparator(_) => write!(f, "Comparator(..)"),
        }
    }
}
