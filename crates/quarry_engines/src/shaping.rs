#![forbid(unsafe_code)]

use std::fmt;

use quarry_kernel_contracts::filter::{
    CatalogEntry, CatalogParameters, CatalogResult, Comparator, FilterSet, RowRange,
};
use tracing::{debug, trace};

use crate::coerce::coerce;
use crate::error::QueryError;
use crate::fields::Entity;
use crate::predicate::{build_predicate, Predicate};

/// Case-insensitive SQL `LIKE`: `%` matches any run of characters, `_` exactly one.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}

pub enum QueryStage<E> {
    Filter(Predicate<E>),
    Skip(usize),
    Take(usize),
}

impl<E> Clone for QueryStage<E> {
    fn clone(&self) -> Self {
        match self {
            QueryStage::Filter(p) => QueryStage::Filter(p.clone()),
            QueryStage::Skip(n) => QueryStage::Skip(*n),
            QueryStage::Take(n) => QueryStage::Take(*n),
        }
    }
}

impl<E> fmt::Debug for QueryStage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryStage::Filter(p) => f.debug_tuple("Filter").field(p).finish(),
            QueryStage::Skip(n) => f.debug_tuple("Skip").field(n).finish(),
            QueryStage::Take(n) => f.debug_tuple("Take").field(n).finish(),
        }
    }
}

/// Ordered restriction pipeline. Stages run in the order they were added.
pub struct Query<E> {
    stages: Vec<QueryStage<E>>,
}

impl<E> Default for Query<E> {
    fn default() -> Self {
        Self { stages: Vec::new() }
    }
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
        }
    }
}

impl<E> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("stages", &self.stages).finish()
    }
}

impl<E> Query<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate<E>) -> Self {
        self.stages.push(QueryStage::Filter(predicate));
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.stages.push(QueryStage::Skip(n));
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.stages.push(QueryStage::Take(n));
        self
    }

    pub fn stages(&self) -> &[QueryStage<E>] {
        &self.stages
    }

    /// Skip `start_row` rows, then take `end_row` rows; `0` leaves that side unbounded.
    pub fn apply_range(self, range: RowRange) -> Self {
        let mut query = self;
        if range.start_row > 0 {
            query = query.skip(range.start_row as usize);
        }
        if range.end_row > 0 {
            query = query.take(range.end_row as usize);
        }
        query
    }

    pub fn execute<I>(&self, rows: I) -> Vec<E>
    where
        I: IntoIterator<Item = E>,
    {
        let mut rows: Vec<E> = rows.into_iter().collect();
        for stage in &self.stages {
            match stage {
                QueryStage::Filter(p) => rows.retain(|row| p.matches(row)),
                QueryStage::Skip(n) => {
                    let n = (*n).min(rows.len());
                    rows.drain(..n);
                }
                QueryStage::Take(n) => rows.truncate(*n),
            }
        }
        rows
    }
}

impl<E: Entity> Query<E> {
    pub fn try_filter(
        self,
        filters: &FilterSet,
        field_path: &str,
        comparator: Comparator,
    ) -> Result<Self, QueryError> {
        self.try_filter_as(filters, field_path, field_path, comparator)
    }

    /// Restricts `field_path` by the filter named `parameter_name`, when one was supplied.
    ///
    /// The path is resolved even when the filter is absent so misconfigured paths surface on
    /// every call, not only when a caller happens to send that filter.
    pub fn try_filter_as(
        self,
        filters: &FilterSet,
        field_path: &str,
        parameter_name: &str,
        comparator: Comparator,
    ) -> Result<Self, QueryError> {
        let kind = E::shape().fields.resolve(field_path)?.kind();
        if !filters.has_filter(parameter_name) {
            return Ok(self);
        }
        let operand = coerce(filters.raw_value(parameter_name), kind).map_err(|source| {
            QueryError::Coercion {
                field: parameter_name.to_string(),
                source,
            }
        })?;
        match build_predicate::<E>(field_path, comparator, operand)? {
            Some(predicate) => Ok(self.filter(predicate)),
            None => {
                trace!(
                    field = field_path,
                    parameter = parameter_name,
                    "filter skipped"
                );
                Ok(self)
            }
        }
    }
}

/// Projects rows to key/display pairs with criteria search and overflow protection.
///
/// Over `max_results` without criteria: empty entries and `should_use_criteria`. Over
/// `max_results` with criteria: the first `max_results` entries by display order.
pub fn build_catalog<E, K, I, FK, FD>(
    rows: I,
    params: &CatalogParameters,
    key_selector: FK,
    display_selector: FD,
) -> CatalogResult<K>
where
    I: IntoIterator<Item = E>,
    FK: Fn(&E) -> K,
    FD: Fn(&E) -> Option<String>,
{
    let mut entries: Vec<CatalogEntry<K>> = rows
        .into_iter()
        .map(|row| CatalogEntry {
            value: key_selector(&row),
            display: display_selector(&row),
        })
        .collect();

    let criteria = params.criteria();
    if let Some(criteria) = criteria {
        let needle = criteria.to_lowercase();
        entries.retain(|e| {
            e.display
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
        });
    }

    let max_results = params.max_results as usize;
    if max_results > 0 && entries.len() > max_results && criteria.is_none() {
        debug!(
            matched = entries.len(),
            max_results, "catalog overflow; criteria required"
        );
        return CatalogResult::use_criteria();
    }

    entries.sort_by(|a, b| a.display.cmp(&b.display));
    if max_results > 0 && entries.len() > max_results {
        debug!(
            matched = entries.len(),
            max_results, "catalog truncated under criteria"
        );
        entries.truncate(max_results);
    }

    CatalogResult {
        entries,
        should_use_criteria: false,
    }
}
