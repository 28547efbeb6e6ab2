#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::common::{ContractViolation, Validate};

pub const CATALOG_CRITERIA_MAX_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq)]
struct FilterEntry {
    name: String,
    value: Value,
}

/// Caller-supplied filter values keyed by field name, case-insensitively.
///
/// At most one entry exists per case-folded key; inserting `"Name"` after `"name"` replaces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Value>", into = "BTreeMap<String, Value>")]
pub struct FilterSet {
    entries: BTreeMap<String, FilterEntry>,
}

fn fold_key(name: &str) -> String {
    name.to_lowercase()
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        self.entries
            .insert(fold_key(&name), FilterEntry { name, value })
            .map(|previous| previous.value)
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn has_filters(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.entries.contains_key(&fold_key(name))
    }

    pub fn raw_value(&self, name: &str) -> Option<&Value> {
        self.entries.get(&fold_key(name)).map(|e| &e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as supplied by the caller (original key spelling).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.values().map(|e| (e.name.as_str(), &e.value))
    }
}

impl From<BTreeMap<String, Value>> for FilterSet {
    fn from(raw: BTreeMap<String, Value>) -> Self {
        let mut set = FilterSet::new();
        for (name, value) in raw {
            set.insert(name, value);
        }
        set
    }
}

impl From<FilterSet> for BTreeMap<String, Value> {
    fn from(set: FilterSet) -> Self {
        set.entries
            .into_values()
            .map(|e| (e.name, e.value))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            _ => Err(de::Error::unknown_variant(&raw, &["asc", "desc"])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Skip/take pair. `0` on either side means unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRange {
    pub start_row: u32,
    pub end_row: u32,
}

impl RowRange {
    pub fn new(start_row: u32, end_row: u32) -> Self {
        Self { start_row, end_row }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Caps the take side at `max_rows`; `0` leaves the range untouched.
    pub fn capped(self, max_rows: u32) -> Self {
        if max_rows == 0 {
            return self;
        }
        let end_row = if self.end_row == 0 || self.end_row > max_rows {
            max_rows
        } else {
            self.end_row
        };
        Self {
            start_row: self.start_row,
            end_row,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryParameters {
    #[serde(default)]
    pub filters: FilterSet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParameters {
    #[serde(default)]
    pub filters: FilterSet,
    #[serde(default)]
    pub start_row: u32,
    #[serde(default)]
    pub end_row: u32,
    /// Field to direction, in payload order. Accepts `{"name": "asc"}` or a list of sort keys.
    #[serde(default, with = "sort_keys")]
    pub sort: Vec<SortKey>,
}

fn push_sort_key(keys: &mut Vec<SortKey>, field: String, direction: SortDirection) {
    let folded = fold_key(&field);
    match keys.iter_mut().find(|k| fold_key(&k.field) == folded) {
        Some(existing) => existing.direction = direction,
        None => keys.push(SortKey { field, direction }),
    }
}

mod sort_keys {
    use std::fmt;

    use serde::ser::SerializeMap;
    use serde::Serializer;

    use super::*;

    pub fn serialize<S: Serializer>(keys: &[SortKey], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(keys.len()))?;
        for key in keys {
            map.serialize_entry(&key.field, &key.direction)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<SortKey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SortKeysVisitor)
    }

    struct SortKeysVisitor;

    impl<'de> Visitor<'de> for SortKeysVisitor {
        type Value = Vec<SortKey>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a field-to-direction map or a list of sort keys")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut keys = Vec::new();
            while let Some((field, direction)) = map.next_entry::<String, SortDirection>()? {
                push_sort_key(&mut keys, field, direction);
            }
            Ok(keys)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut keys = Vec::new();
            while let Some(key) = seq.next_element::<SortKey>()? {
                push_sort_key(&mut keys, key.field, key.direction);
            }
            Ok(keys)
        }
    }
}

impl ListParameters {
    pub fn range(start_row: u32, end_row: u32) -> Self {
        Self {
            start_row,
            end_row,
            ..Self::default()
        }
    }

    pub fn row_range(&self) -> RowRange {
        RowRange::new(self.start_row, self.end_row)
    }

    /// Adds or replaces the sort direction for `field` (case-insensitive), keeping order.
    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        push_sort_key(&mut self.sort, field.into(), direction);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogParameters {
    #[serde(default)]
    pub filters: FilterSet,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub max_results: u32,
}

impl CatalogParameters {
    pub fn new(criteria: Option<String>, max_results: u32) -> Self {
        Self {
            filters: FilterSet::new(),
            criteria,
            max_results,
        }
    }

    /// Free-text criteria when present and non-empty.
    pub fn criteria(&self) -> Option<&str> {
        self.criteria.as_deref().filter(|c| !c.is_empty())
    }

    pub fn with_default_max(mut self, default_max_results: u32) -> Self {
        if self.max_results == 0 {
            self.max_results = default_max_results;
        }
        self
    }
}

impl Validate for CatalogParameters {
    fn validate(&self) -> Result<(), ContractViolation> {
        if let Some(c) = &self.criteria {
            if c.len() > CATALOG_CRITERIA_MAX_LEN {
                return Err(ContractViolation::InvalidValue {
                    field: "catalog_parameters.criteria",
                    reason: "must be <= 256 chars",
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry<K> {
    pub value: K,
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogResult<K> {
    pub entries: Vec<CatalogEntry<K>>,
    pub should_use_criteria: bool,
}

impl<K> CatalogResult<K> {
    pub fn use_criteria() -> Self {
        Self {
            entries: Vec::new(),
            should_use_criteria: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    Like,
    Equals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Like => "LIKE",
            Comparator::Equals => "=",
            Comparator::LessThan => "<",
            Comparator::LessThanOrEqual => "<=",
            Comparator::GreaterThan => ">",
            Comparator::GreaterThanOrEqual => ">=",
        }
    }
}
