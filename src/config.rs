/// Construction options for collections and views
///
/// `CollectionOptions` and `ViewOptions` are plain builders used from Rust.
/// `ViewConfig` is the serializable subset of `ViewOptions` (no closures),
/// so views can be described in JSON:
///
/// ```
/// use livecollection::ViewConfig;
///
/// let config = ViewConfig::from_json(r#"{ "filter": { "type": "a" }, "comparator": "name" }"#).unwrap();
/// assert_eq!(config.comparator.as_deref(), Some("name"));
/// ```

use crate::error::{Error, Result};
use crate::filter::FilterSpec;
use crate::ordering::OrderingRule;
use crate::record::Attributes;
use crate::sequence::StorageHint;
use serde::Deserialize;

#[derive(Debug, Clone, Default)]
pub struct CollectionOptions {
    /// Keep records in this order as they are added
    pub ordering: Option<OrderingRule>,
    pub storage: StorageHint,
}

impl CollectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ordering(mut self, rule: OrderingRule) -> Self {
        self.ordering = Some(rule);
        self
    }

    pub fn storage(mut self, hint: StorageHint) -> Self {
        self.storage = hint;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewOptions {
    pub name: Option<String>,
    /// `None` admits every base record
    pub filter: Option<FilterSpec>,
    /// `None` keeps the base's order
    pub ordering: Option<OrderingRule>,
    pub storage: StorageHint,
}

impl ViewOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn filter(mut self, spec: FilterSpec) -> Self {
        self.filter = Some(spec);
        self
    }

    /// Attribute-match filter
    pub fn matching(self, attributes: Attributes) -> Self {
        self.filter(FilterSpec::matching(attributes))
    }

    pub fn ordering(mut self, rule: OrderingRule) -> Self {
        self.ordering = Some(rule);
        self
    }

    /// Order ascending by one attribute
    pub fn sorted_by(self, attribute: impl Into<String>) -> Self {
        self.ordering(OrderingRule::by_attribute(attribute))
    }

    pub fn storage(mut self, hint: StorageHint) -> Self {
        self.storage = hint;
        self
    }
}

/// JSON description of a view.
///
/// `filter` is `null` or an object of attribute equalities; `comparator`
/// names the attribute to sort by.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filter: serde_json::Value,
    #[serde(default)]
    pub comparator: Option<String>,
    #[serde(default)]
    pub storage: StorageHint,
}

impl ViewConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TryFrom<ViewConfig> for ViewOptions {
    type Error = Error;

    fn try_from(config: ViewConfig) -> Result<Self> {
        let ordering = match config.comparator {
            Some(name) if name.is_empty() => {
                return Err(Error::Config("comparator attribute name is empty".to_string()))
            }
            Some(name) => Some(OrderingRule::by_attribute(name)),
            None => None,
        };
        Ok(ViewOptions {
            name: config.name,
            filter: FilterSpec::from_json(&config.filter)?,
            ordering,
            storage: config.storage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_identity_view() {
        let options = ViewOptions::try_from(ViewConfig::from_json("{}").unwrap()).unwrap();
        assert!(options.name.is_none());
        assert!(options.filter.is_none());
        assert!(options.ordering.is_none());
        assert_eq!(options.storage, StorageHint::FastReads);
    }

    #[test]
    fn test_full_config() {
        let config = ViewConfig::from_json(
            r#"{ "name": "open", "filter": { "status": "open" }, "comparator": "priority", "storage": "fast_updates" }"#,
        )
        .unwrap();
        let options = ViewOptions::try_from(config).unwrap();
        assert_eq!(options.name.as_deref(), Some("open"));
        assert!(matches!(options.filter, Some(FilterSpec::AttributeMatch(ref m)) if m.len() == 1));
        assert!(matches!(options.ordering, Some(OrderingRule::KeyExtractor(_))));
        assert_eq!(options.storage, StorageHint::FastUpdates);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(ViewConfig::from_json(r#"{ "colour": "red" }"#), Err(Error::Json(_))));

        let bad_filter = ViewConfig::from_json(r#"{ "filter": "type == a" }"#).unwrap();
        assert!(matches!(
            ViewOptions::try_from(bad_filter),
            Err(Error::InvalidFilter { .. })
        ));

        let bad_comparator = ViewConfig::from_json(r#"{ "comparator": "" }"#).unwrap();
        assert!(matches!(ViewOptions::try_from(bad_comparator), Err(Error::Config(_))));
    }
}
