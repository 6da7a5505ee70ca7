// src/repositories/generic_repository.rs
//
// Generic repository implementation
//
// `GenericRepository<T, C>` is the reusable base: one entity type over one
// data context. Concrete repositories either use it directly or wrap it and
// implement `RepositoryBase`; either way they receive the full `Repository`
// contract from the single blanket impl below.
//
// CRITICAL RULES:
// - Repositories hold no state beyond the shared context
// - Errors from the context pass through unchanged
// - NO retries, NO compensating writes on cancellation

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::DataContext;
use crate::domain::Entity;
use crate::error::{RepoResult, RepositoryError};
use crate::query::{Filter, Include, Mutation, PartitionCount, Query, Tracking};
use crate::repositories::repository::Repository;

pub struct GenericRepository<T, C> {
    context: Arc<C>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, C: DataContext> GenericRepository<T, C> {
    pub fn new(context: Arc<C>) -> Self {
        Self {
            context,
            _entity: PhantomData,
        }
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }
}

impl<T, C> Clone for GenericRepository<T, C> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            _entity: PhantomData,
        }
    }
}

/// Marks a type as a repository built on `GenericRepository`.
///
/// The binder only accepts implementations of this trait, and constructs
/// them from the scope's data context through `from_context`.
///
/// ```ignore
/// pub struct SqliteWidgetRepository(GenericRepository<Widget, SqliteContext>);
///
/// impl RepositoryBase for SqliteWidgetRepository {
///     type Entity = Widget;
///     type Context = SqliteContext;
///     fn from_context(context: Arc<SqliteContext>) -> Self {
///         Self(GenericRepository::new(context))
///     }
///     fn base(&self) -> &GenericRepository<Widget, SqliteContext> {
///         &self.0
///     }
/// }
/// ```
pub trait RepositoryBase: Send + Sync + Sized + 'static {
    type Entity: Entity;
    type Context: DataContext;

    fn from_context(context: Arc<Self::Context>) -> Self;

    fn base(&self) -> &GenericRepository<Self::Entity, Self::Context>;
}

impl<T: Entity, C: DataContext> RepositoryBase for GenericRepository<T, C> {
    type Entity = T;
    type Context = C;

    fn from_context(context: Arc<C>) -> Self {
        Self::new(context)
    }

    fn base(&self) -> &GenericRepository<T, C> {
        self
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn require_entities<T>(entities: &[T], operation: &str) -> RepoResult<()> {
    if entities.is_empty() {
        return Err(RepositoryError::Validation(format!(
            "{} requires at least one entity",
            operation
        )));
    }
    Ok(())
}

fn check_cancelled(cancel: &CancellationToken) -> RepoResult<()> {
    if cancel.is_cancelled() {
        return Err(RepositoryError::Cancelled);
    }
    Ok(())
}

fn no_match<T: Entity>() -> RepositoryError {
    RepositoryError::NotFound(format!("No entity in {} matched the filter", T::COLLECTION))
}

fn single<T>(rows: Vec<T>) -> Option<T> {
    rows.into_iter().next()
}

// ============================================================================
// CONTRACT
// ============================================================================

#[async_trait]
impl<R: RepositoryBase> Repository<R::Entity> for R {
    fn add(&self, entity: R::Entity) -> RepoResult<()> {
        self.base().context.stage_insert(entity)?;
        Ok(())
    }

    async fn add_async(&self, entity: R::Entity, cancel: &CancellationToken) -> RepoResult<()> {
        check_cancelled(cancel)?;
        self.add(entity)
    }

    fn add_range(&self, entities: Vec<R::Entity>) -> RepoResult<()> {
        require_entities(&entities, "add_range")?;
        for entity in entities {
            self.base().context.stage_insert(entity)?;
        }
        Ok(())
    }

    async fn add_range_async(&self, entities: Vec<R::Entity>, cancel: &CancellationToken) -> RepoResult<()> {
        require_entities(&entities, "add_range_async")?;
        check_cancelled(cancel)?;
        self.add_range(entities)
    }

    fn update(&self, entity: R::Entity) -> RepoResult<()> {
        let context = &self.base().context;
        if !context.is_tracked(&entity)? {
            return Err(RepositoryError::Conflict(format!(
                "Entity {:?} in {} is detached; load it with tracking before updating",
                entity.key(),
                <R::Entity as Entity>::COLLECTION
            )));
        }
        context.stage_update(entity)?;
        Ok(())
    }

    fn update_range(&self, entities: Vec<R::Entity>) -> RepoResult<()> {
        require_entities(&entities, "update_range")?;

        // Reject the whole batch before staging any of it.
        let context = &self.base().context;
        for entity in &entities {
            if !context.is_tracked(entity)? {
                return Err(RepositoryError::Conflict(format!(
                    "Entity {:?} in {} is detached; load it with tracking before updating",
                    entity.key(),
                    <R::Entity as Entity>::COLLECTION
                )));
            }
        }
        for entity in entities {
            context.stage_update(entity)?;
        }
        Ok(())
    }

    async fn update_by_filter_async(
        &self,
        filter: Filter<R::Entity>,
        mutation: Mutation<R::Entity>,
        cancel: &CancellationToken,
    ) -> RepoResult<usize> {
        if mutation.is_empty() {
            return Err(RepositoryError::Validation(
                "update_by_filter_async requires at least one property setter".to_string(),
            ));
        }

        let affected = self.base().context.execute_update(filter, mutation, cancel).await?;
        if affected == 0 {
            return Err(no_match::<R::Entity>());
        }

        log::debug!(
            "Updated {} entities in {}",
            affected,
            <R::Entity as Entity>::COLLECTION
        );
        Ok(affected)
    }

    fn delete(&self, entity: R::Entity) -> RepoResult<()> {
        self.base().context.stage_remove(entity)?;
        Ok(())
    }

    fn delete_range(&self, entities: Vec<R::Entity>) -> RepoResult<()> {
        require_entities(&entities, "delete_range")?;
        for entity in entities {
            self.base().context.stage_remove(entity)?;
        }
        Ok(())
    }

    async fn delete_by_id_async(
        &self,
        id: &<R::Entity as Entity>::Key,
        cancel: &CancellationToken,
    ) -> RepoResult<()> {
        let context = &self.base().context;
        match context.find_async::<R::Entity>(id, cancel).await? {
            Some(entity) => {
                context.stage_remove(entity)?;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!(
                "No entity in {} with key {:?}",
                <R::Entity as Entity>::COLLECTION,
                id
            ))),
        }
    }

    async fn delete_by_filter_async(
        &self,
        filter: Filter<R::Entity>,
        cancel: &CancellationToken,
    ) -> RepoResult<()> {
        let query = self.where_matching(filter, Tracking::Disabled).take(1);
        let victim = single(self.base().context.execute_async(query, cancel).await?);

        match victim {
            Some(entity) => self.delete(entity),
            None => Err(no_match::<R::Entity>()),
        }
    }

    fn as_queryable(&self, tracking: Tracking) -> Query<R::Entity> {
        Query::new(tracking)
    }

    fn get_all(&self, tracking: Tracking, filter: Option<Filter<R::Entity>>) -> Query<R::Entity> {
        match filter {
            Some(filter) => Query::new(tracking).filter(filter),
            None => Query::new(tracking),
        }
    }

    fn where_matching(&self, filter: Filter<R::Entity>, tracking: Tracking) -> Query<R::Entity> {
        Query::new(tracking).filter(filter)
    }

    fn query(
        &self,
        filter: Option<Filter<R::Entity>>,
        includes: Vec<Include<R::Entity>>,
        tracking: Tracking,
    ) -> Query<R::Entity> {
        self.get_all(tracking, filter).includes_all(includes)
    }

    fn get_list(&self, query: &Query<R::Entity>) -> RepoResult<Vec<R::Entity>> {
        Ok(self.base().context.execute(query)?)
    }

    async fn get_list_async(
        &self,
        query: Query<R::Entity>,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<R::Entity>> {
        Ok(self.base().context.execute_async(query, cancel).await?)
    }

    async fn get_all_async(&self, tracking: Tracking, cancel: &CancellationToken) -> RepoResult<Vec<R::Entity>> {
        self.get_list_async(Query::new(tracking), cancel).await
    }

    fn first(&self, filter: Filter<R::Entity>, tracking: Tracking) -> RepoResult<R::Entity> {
        self.first_or_default(filter, tracking)?
            .ok_or_else(no_match::<R::Entity>)
    }

    async fn first_async(
        &self,
        filter: Filter<R::Entity>,
        tracking: Tracking,
        cancel: &CancellationToken,
    ) -> RepoResult<R::Entity> {
        self.first_or_default_async(filter, tracking, cancel)
            .await?
            .ok_or_else(no_match::<R::Entity>)
    }

    fn first_or_default(&self, filter: Filter<R::Entity>, tracking: Tracking) -> RepoResult<Option<R::Entity>> {
        let query = self.where_matching(filter, tracking).take(1);
        Ok(single(self.get_list(&query)?))
    }

    async fn first_or_default_async(
        &self,
        filter: Filter<R::Entity>,
        tracking: Tracking,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<R::Entity>> {
        let query = self.where_matching(filter, tracking).take(1);
        Ok(single(self.get_list_async(query, cancel).await?))
    }

    fn get_by_filter(
        &self,
        filter: Filter<R::Entity>,
        tracking: Tracking,
        includes: Vec<Include<R::Entity>>,
    ) -> RepoResult<Option<R::Entity>> {
        let query = self.query(Some(filter), includes, tracking).take(1);
        Ok(single(self.get_list(&query)?))
    }

    async fn get_by_filter_async(
        &self,
        filter: Filter<R::Entity>,
        tracking: Tracking,
        includes: Vec<Include<R::Entity>>,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<R::Entity>> {
        let query = self.query(Some(filter), includes, tracking).take(1);
        Ok(single(self.get_list_async(query, cancel).await?))
    }

    fn get_first(&self) -> RepoResult<R::Entity> {
        let query = self.as_queryable(Tracking::Enabled).take(1);
        single(self.get_list(&query)?).ok_or_else(|| {
            RepositoryError::NotFound(format!("{} is empty", <R::Entity as Entity>::COLLECTION))
        })
    }

    async fn get_first_async(&self, cancel: &CancellationToken) -> RepoResult<R::Entity> {
        let query = self.as_queryable(Tracking::Enabled).take(1);
        single(self.get_list_async(query, cancel).await?).ok_or_else(|| {
            RepositoryError::NotFound(format!("{} is empty", <R::Entity as Entity>::COLLECTION))
        })
    }

    fn any(&self, filter: Filter<R::Entity>) -> RepoResult<bool> {
        let query = self.where_matching(filter, Tracking::Disabled).take(1);
        Ok(!self.get_list(&query)?.is_empty())
    }

    async fn any_async(&self, filter: Filter<R::Entity>, cancel: &CancellationToken) -> RepoResult<bool> {
        let query = self.where_matching(filter, Tracking::Disabled).take(1);
        Ok(!self.get_list_async(query, cancel).await?.is_empty())
    }

    fn count_by(&self, filter: Filter<R::Entity>) -> RepoResult<PartitionCount> {
        let rows = self.get_list(&self.as_queryable(Tracking::Disabled))?;
        Ok(PartitionCount::tally(&rows, &filter))
    }

    async fn count_by_async(&self, filter: Filter<R::Entity>, cancel: &CancellationToken) -> RepoResult<PartitionCount> {
        let rows = self
            .get_list_async(self.as_queryable(Tracking::Disabled), cancel)
            .await?;
        Ok(PartitionCount::tally(&rows, &filter))
    }
}
