// src/query/include.rs
//
// Eager-loading directives
//
// An include loads one related collection once per query execution and
// attaches the related entities to every parent row. Includes run in the
// order they were added; order only changes the number of loads, not the
// result.

use std::fmt;
use std::sync::Arc;

use crate::domain::Entity;
use crate::error::StoreResult;

/// Raw access to related collections during query execution.
///
/// Implemented by data contexts so includes can read from the same
/// connection the parent rows came from.
pub trait RelatedSource {
    /// Every document stored in `collection`, in natural store order.
    fn load_related(&self, collection: &'static str) -> StoreResult<Vec<serde_json::Value>>;
}

type Loader<T> = Arc<dyn Fn(&mut [T], &dyn RelatedSource) -> StoreResult<()> + Send + Sync>;

pub struct Include<T> {
    name: String,
    loader: Loader<T>,
}

impl<T: Entity> Include<T> {
    /// Eagerly load every `R` and hand them to `attach` for each parent row.
    ///
    /// ```ignore
    /// Include::related::<Category>("category", |widget: &mut Widget, categories| {
    ///     widget.category = categories.iter().find(|c| Some(c.id) == widget.category_id).cloned();
    /// })
    /// ```
    pub fn related<R, F>(name: impl Into<String>, attach: F) -> Self
    where
        R: Entity,
        F: Fn(&mut T, &[R]) + Send + Sync + 'static,
    {
        let loader = move |parents: &mut [T], source: &dyn RelatedSource| -> StoreResult<()> {
            if parents.is_empty() {
                return Ok(());
            }

            let related = source
                .load_related(R::COLLECTION)?
                .into_iter()
                .map(serde_json::from_value::<R>)
                .collect::<Result<Vec<_>, _>>()?;

            for parent in parents.iter_mut() {
                attach(parent, &related);
            }
            Ok(())
        };

        Self {
            name: name.into(),
            loader: Arc::new(loader),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, parents: &mut [T], source: &dyn RelatedSource) -> StoreResult<()> {
        (self.loader)(parents, source)
    }
}

impl<T> Clone for Include<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            loader: Arc::clone(&self.loader),
        }
    }
}

impl<T> fmt::Debug for Include<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Include").field(&self.name).finish()
    }
}
