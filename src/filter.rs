/// Membership Filters
///
/// A `FilterSpec` describes which records belong to a view: either an
/// opaque predicate, or a conjunction of attribute equalities. Both are
/// normalized into a `MembershipFilter`, whose `accepts` is a pure function
/// of the record's current attributes and (optionally) its base position.

use crate::error::{Error, Result};
use crate::record::{Attributes, Record};
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Predicate over a record and its position in the base, when known
pub type Predicate = Rc<dyn Fn(&Record, Option<usize>) -> bool>;

#[derive(Clone)]
pub enum FilterSpec {
    Predicate(Predicate),
    AttributeMatch(AttributeMatch),
}

impl FilterSpec {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Record, Option<usize>) -> bool + 'static,
    {
        FilterSpec::Predicate(Rc::new(f))
    }

    /// Shorthand for an attribute match built from `name => value` pairs.
    pub fn matching(attributes: Attributes) -> Self {
        FilterSpec::AttributeMatch(AttributeMatch::from(attributes))
    }

    /// Build from JSON.
    ///
    /// `null` means "no filter"; an object is an attribute match whose
    /// values must be scalars. Anything else is rejected.
    pub fn from_json(json: &serde_json::Value) -> Result<Option<FilterSpec>> {
        match json {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Object(obj) => {
                let mut matcher = AttributeMatch::new();
                for (name, value) in obj {
                    let value = Value::from_json(value).map_err(|_| Error::InvalidFilter {
                        kind: format!("non-scalar value for attribute '{}'", name),
                    })?;
                    matcher = matcher.eq(name.clone(), value);
                }
                Ok(Some(FilterSpec::AttributeMatch(matcher)))
            }
            serde_json::Value::Bool(_) => Err(Error::InvalidFilter { kind: "bool".to_string() }),
            serde_json::Value::Number(_) => Err(Error::InvalidFilter { kind: "number".to_string() }),
            serde_json::Value::String(_) => Err(Error::InvalidFilter { kind: "string".to_string() }),
            serde_json::Value::Array(_) => Err(Error::InvalidFilter { kind: "array".to_string() }),
        }
    }
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterSpec::Predicate(_) => write!(f, "Predicate(..)"),
            FilterSpec::AttributeMatch(m) => f.debug_tuple("AttributeMatch").field(m).finish(),
        }
    }
}

impl From<AttributeMatch> for FilterSpec {
    fn from(m: AttributeMatch) -> Self {
        FilterSpec::AttributeMatch(m)
    }
}

/// Conjunction of attribute requirements.
///
/// A requirement of `None` ("unset") accepts only records where the
/// attribute is absent; `Some(Value::Null)` accepts only records where it
/// is present and null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMatch {
    required: BTreeMap<String, Option<Value>>,
}

impl AttributeMatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `name` to equal `value`
    pub fn eq(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.required.insert(name.into(), Some(value.into()));
        self
    }

    /// Require `name` to be unset
    pub fn unset(mut self, name: impl Into<String>) -> Self {
        self.required.insert(name.into(), None);
        self
    }

    pub fn len(&self) -> usize {
        self.required.len()
    }

    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        let attrs = record.attributes();
        self.required.iter().all(|(name, required)| match (attrs.get(name), required) {
            (None, None) => true,
            (Some(actual), Some(required)) => actual.same_value(required),
            _ => false,
        })
    }
}

impl From<Attributes> for AttributeMatch {
    fn from(attributes: Attributes) -> Self {
        AttributeMatch {
            required: attributes.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }
}

/// Normalized membership test built from an optional `FilterSpec`.
#[derive(Clone)]
pub struct MembershipFilter {
    predicate: Option<Predicate>,
}

impl MembershipFilter {
    pub fn new(spec: Option<FilterSpec>) -> Self {
        let predicate: Option<Predicate> = match spec {
            None => None,
            Some(FilterSpec::Predicate(p)) => Some(p),
            Some(FilterSpec::AttributeMatch(m)) if m.is_empty() => None,
            Some(FilterSpec::AttributeMatch(m)) => {
                Some(Rc::new(move |record: &Record, _: Option<usize>| m.matches(record)))
            }
        };
        MembershipFilter { predicate }
    }

    pub fn accept_all() -> Self {
        MembershipFilter { predicate: None }
    }

    pub fn accepts(&self, record: &Record, position: Option<usize>) -> bool {
        match &self.predicate {
            Some(p) => p(record, position),
            None => true,
        }
    }

    pub fn is_accept_all(&self) -> bool {
        self.predicate.is_none()
    }
}

impl Default for MembershipFilter {
    fn default() -> Self {
        Self::accept_all()
    }
}

impl fmt::Debug for MembershipFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MembershipFilter")
            .field("accept_all", &self.is_accept_all())
            .finish()
    }
}
