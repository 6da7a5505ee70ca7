// src/query/builder.rs
//
// Query shape
//
// A `Query<T>` is a not-yet-executed description of a read. It is built by
// value, handed to a data context for execution and never mutated by it.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::query::filter::Filter;
use crate::query::include::Include;

/// Whether loaded entities are attached to the context's change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tracking {
    Enabled,
    /// Default for bulk reads.
    #[default]
    Disabled,
}

impl Tracking {
    pub fn is_enabled(self) -> bool {
        matches!(self, Tracking::Enabled)
    }
}

impl From<bool> for Tracking {
    fn from(enabled: bool) -> Self {
        if enabled {
            Tracking::Enabled
        } else {
            Tracking::Disabled
        }
    }
}

type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

pub struct Query<T> {
    filter: Option<Filter<T>>,
    includes: Vec<Include<T>>,
    ordering: Vec<Comparator<T>>,
    skip: usize,
    take: Option<usize>,
    tracking: Tracking,
}

impl<T: 'static> Query<T> {
    pub fn new(tracking: Tracking) -> Self {
        Self {
            filter: None,
            includes: Vec::new(),
            ordering: Vec::new(),
            skip: 0,
            take: None,
            tracking,
        }
    }

    /// Narrow the query. Successive filters are combined with AND.
    pub fn filter(mut self, filter: Filter<T>) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn filter_by<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter(Filter::new(predicate))
    }

    pub fn include(mut self, include: Include<T>) -> Self {
        self.includes.push(include);
        self
    }

    pub fn includes_all(mut self, includes: impl IntoIterator<Item = Include<T>>) -> Self {
        self.includes.extend(includes);
        self
    }

    /// Order ascending by `key`. Later calls break ties of earlier ones.
    pub fn order_by<K, F>(mut self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.ordering.push(Arc::new(move |a, b| key(a).cmp(&key(b))));
        self
    }

    pub fn order_by_descending<K, F>(mut self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.ordering.push(Arc::new(move |a, b| key(b).cmp(&key(a))));
        self
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    pub fn with_tracking(mut self, tracking: Tracking) -> Self {
        self.tracking = tracking;
        self
    }

    pub fn as_no_tracking(self) -> Self {
        self.with_tracking(Tracking::Disabled)
    }

    pub fn tracking(&self) -> Tracking {
        self.tracking
    }

    pub fn predicate(&self) -> Option<&Filter<T>> {
        self.filter.as_ref()
    }

    pub fn includes(&self) -> &[Include<T>] {
        &self.includes
    }

    /// Evaluate filter, ordering and paging over rows in natural store order.
    ///
    /// Includes are not applied here; they need a `RelatedSource` and are
    /// run by the data context on the returned rows.
    pub fn apply(&self, rows: Vec<T>) -> Vec<T> {
        let mut rows: Vec<T> = match &self.filter {
            Some(filter) => rows.into_iter().filter(|row| filter.matches(row)).collect(),
            None => rows,
        };

        if !self.ordering.is_empty() {
            rows.sort_by(|a, b| {
                self.ordering
                    .iter()
                    .map(|compare| compare(a, b))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        rows.into_iter()
            .skip(self.skip)
            .take(self.take.unwrap_or(usize::MAX))
            .collect()
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            includes: self.includes.clone(),
            ordering: self.ordering.clone(),
            skip: self.skip,
            take: self.take,
            tracking: self.tracking,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("filtered", &self.filter.is_some())
            .field("includes", &self.includes)
            .field("ordering", &self.ordering.len())
            .field("skip", &self.skip)
            .field("take", &self.take)
            .field("tracking", &self.tracking)
            .finish()
    }
}

/// Two-bucket tally of a predicate's outcome over a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionCount {
    pub matched: usize,
    pub unmatched: usize,
}

impl PartitionCount {
    pub fn tally<T>(rows: &[T], filter: &Filter<T>) -> Self {
        let matched = rows.iter().filter(|row| filter.matches(row)).count();
        Self {
            matched,
            unmatched: rows.len() - matched,
        }
    }

    /// Count for one side of the predicate.
    pub fn get(&self, outcome: bool) -> usize {
        if outcome {
            self.matched
        } else {
            self.unmatched
        }
    }

    pub fn total(&self) -> usize {
        self.matched + self.unmatched
    }
}
