//! Rebuild a whole collection from a paginated endpoint.
//!
//! A collection is fetched in two steps: a `GET <collection>/count` tells how many items exist,
//! then one `GET <target>?limit=..&page=..` per page fetches them. Every request goes through the
//! service the [`Collector`] was built with, so page requests share the scheduler's slots with
//! each other and with any other traffic on that scheduler.

pub mod collector;

use std::ops::RangeInclusive;

use bon::Builder;
use serde::{Deserialize, Serialize, ser::SerializeMap};
use serde_json::{Map, Value};
use snafu::Snafu;

pub use collector::{Collector, get_all};

/// Number of pages needed to hold `count` items, `limit` per page.
///
/// `limit` must be positive.
pub fn page_count(count: u64, limit: u64) -> u64 {
    count.div_ceil(limit)
}

/// The page indices to request: `1..=page_count(count, limit)`, empty when there is nothing to
/// fetch.
///
/// ```
/// use throttled_pager::pagination::pages;
///
/// assert_eq!(pages(5, 2).collect::<Vec<_>>(), vec![1, 2, 3]);
/// assert_eq!(pages(0, 250).count(), 0);
/// ```
pub fn pages(count: u64, limit: u64) -> RangeInclusive<u64> {
    1..=page_count(count, limit)
}

/// Configuration of a [`Collector`].
#[derive(Clone, Copy, Debug, Builder, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorSettings {
    /// Items requested per page. Must be positive.
    #[builder(default = default_page_limit())]
    pub(super) page_limit: u64,
}

const fn default_page_limit() -> u64 {
    250
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
        }
    }
}

impl CollectorSettings {
    pub fn page_limit(&self) -> u64 {
        self.page_limit
    }
}

/// Every item of one collection, in page order.
///
/// Serializes as a single-key object, `{ "<name>": [items...] }`.
#[derive(Clone, Debug, PartialEq)]
pub struct Collection {
    name: String,
    items: Vec<Value>,
}

impl Collection {
    pub fn new(name: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }

    pub fn into_map(self) -> Map<String, Value> {
        let mut map = Map::with_capacity(1);
        map.insert(self.name, Value::Array(self.items));
        map
    }
}

impl Serialize for Collection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.items)?;
        map.end()
    }
}

impl From<Collection> for Value {
    fn from(collection: Collection) -> Self {
        Value::Object(collection.into_map())
    }
}

/// Why a collection could not be assembled. Every variant aborts the whole collection; no
/// partial results are returned.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CollectError {
    #[snafu(display("cannot derive a collection name from target {target:?}"))]
    CollectionName { target: String },

    #[snafu(display("page limit must be positive"))]
    InvalidPageLimit,

    #[snafu(display("`limit` param must be a positive integer, got {limit}"))]
    LimitParam { limit: Value },

    #[snafu(display("`page` is set per request by the collector; options must not carry one (got {page})"))]
    PageParam { page: Value },

    #[snafu(display("count request for {collection} failed: {source}"))]
    Count {
        collection: String,
        source: crate::Error,
    },

    #[snafu(display("count response for {collection} has no integer `count` field: {payload}"))]
    MissingCount { collection: String, payload: Value },

    #[snafu(display("request for page {page} of {collection} failed: {source}"))]
    Page {
        collection: String,
        page: u64,
        source: crate::Error,
    },

    #[snafu(display("page {page} of {collection} has no item list under its data key: {payload}"))]
    UnexpectedPayload {
        collection: String,
        page: u64,
        payload: Value,
    },
}

impl CollectError {
    /// The page that failed, for page-level failures.
    pub fn page(&self) -> Option<u64> {
        match self {
            CollectError::Page { page, .. } | CollectError::UnexpectedPayload { page, .. } => {
                Some(*page)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(0, 250), 0);
        assert_eq!(page_count(1, 250), 1);
        assert_eq!(page_count(250, 250), 1);
        assert_eq!(page_count(251, 250), 2);
        assert_eq!(page_count(5, 2), 3);
    }

    #[test]
    fn pages_match_ceiling_for_many_inputs() {
        for limit in 1..=7u64 {
            for count in 0..=50u64 {
                let expected: Vec<u64> = (1..=count.div_ceil(limit)).collect();
                let actual: Vec<u64> = pages(count, limit).collect();
                assert_eq!(actual, expected, "count={count} limit={limit}");
                assert_eq!(actual.first().copied(), (count > 0).then_some(1));
            }
        }
    }

    #[test]
    fn collection_serializes_as_single_key() {
        let collection = Collection::new("widgets", vec![json!("a"), json!("b")]);
        assert_eq!(
            serde_json::to_value(&collection).unwrap(),
            json!({ "widgets": ["a", "b"] })
        );
        assert_eq!(Value::from(collection), json!({ "widgets": ["a", "b"] }));
    }

    #[test]
    fn settings_default_to_250() {
        assert_eq!(CollectorSettings::default().page_limit(), 250);
        assert_eq!(CollectorSettings::builder().build().page_limit(), 250);
        let settings: CollectorSettings =
            serde_json::from_value(json!({ "page_limit": 50 })).unwrap();
        assert_eq!(settings.page_limit(), 50);
    }
}
