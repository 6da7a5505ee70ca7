// src/repositories/repository.rs
//
// Generic repository contract
//
// CRITICAL RULES:
// - Writes are STAGED; nothing reaches the store before save_changes/commit
//   (update_by_filter_async is the one set-based exception)
// - Batch variants reject empty input before touching the context
// - Reads never fail on "no match" unless the operation requires a match
// - Object safe: domain repository traits extend it and are resolved as
//   `Arc<dyn WidgetRepository>`

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::Entity;
use crate::error::RepoResult;
use crate::query::{Filter, Include, Mutation, PartitionCount, Query, Tracking};

#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    // ========================================================================
    // ADD
    // ========================================================================

    fn add(&self, entity: T) -> RepoResult<()>;

    async fn add_async(&self, entity: T, cancel: &CancellationToken) -> RepoResult<()>;

    fn add_range(&self, entities: Vec<T>) -> RepoResult<()>;

    async fn add_range_async(&self, entities: Vec<T>, cancel: &CancellationToken) -> RepoResult<()>;

    // ========================================================================
    // UPDATE
    // ========================================================================

    /// Stage a full-entity update. The entity must be tracked by the
    /// context (loaded with tracking, or added in this scope).
    fn update(&self, entity: T) -> RepoResult<()>;

    fn update_range(&self, entities: Vec<T>) -> RepoResult<()>;

    /// Apply `mutation` at the store to every entity matching `filter`,
    /// bypassing the change set. Returns the number of updated entities.
    async fn update_by_filter_async(
        &self,
        filter: Filter<T>,
        mutation: Mutation<T>,
        cancel: &CancellationToken,
    ) -> RepoResult<usize>;

    // ========================================================================
    // DELETE
    // ========================================================================

    fn delete(&self, entity: T) -> RepoResult<()>;

    fn delete_range(&self, entities: Vec<T>) -> RepoResult<()>;

    async fn delete_by_id_async(&self, id: &T::Key, cancel: &CancellationToken) -> RepoResult<()>;

    /// Stage removal of the FIRST match in natural store order. Other
    /// matches are left alone.
    async fn delete_by_filter_async(&self, filter: Filter<T>, cancel: &CancellationToken) -> RepoResult<()>;

    // ========================================================================
    // QUERY SHAPING
    // ========================================================================

    fn as_queryable(&self, tracking: Tracking) -> Query<T>;

    fn get_all(&self, tracking: Tracking, filter: Option<Filter<T>>) -> Query<T>;

    fn where_matching(&self, filter: Filter<T>, tracking: Tracking) -> Query<T>;

    fn query(&self, filter: Option<Filter<T>>, includes: Vec<Include<T>>, tracking: Tracking) -> Query<T>;

    fn get_list(&self, query: &Query<T>) -> RepoResult<Vec<T>>;

    async fn get_list_async(&self, query: Query<T>, cancel: &CancellationToken) -> RepoResult<Vec<T>>;

    async fn get_all_async(&self, tracking: Tracking, cancel: &CancellationToken) -> RepoResult<Vec<T>>;

    // ========================================================================
    // READS
    // ========================================================================

    /// First match, or `NotFound`.
    fn first(&self, filter: Filter<T>, tracking: Tracking) -> RepoResult<T>;

    async fn first_async(&self, filter: Filter<T>, tracking: Tracking, cancel: &CancellationToken) -> RepoResult<T>;

    fn first_or_default(&self, filter: Filter<T>, tracking: Tracking) -> RepoResult<Option<T>>;

    async fn first_or_default_async(
        &self,
        filter: Filter<T>,
        tracking: Tracking,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<T>>;

    fn get_by_filter(&self, filter: Filter<T>, tracking: Tracking, includes: Vec<Include<T>>) -> RepoResult<Option<T>>;

    async fn get_by_filter_async(
        &self,
        filter: Filter<T>,
        tracking: Tracking,
        includes: Vec<Include<T>>,
        cancel: &CancellationToken,
    ) -> RepoResult<Option<T>>;

    /// First entity of the collection, tracked. `NotFound` when empty.
    fn get_first(&self) -> RepoResult<T>;

    async fn get_first_async(&self, cancel: &CancellationToken) -> RepoResult<T>;

    fn any(&self, filter: Filter<T>) -> RepoResult<bool>;

    async fn any_async(&self, filter: Filter<T>, cancel: &CancellationToken) -> RepoResult<bool>;

    /// Tally of matching / non-matching entities over the whole collection.
    fn count_by(&self, filter: Filter<T>) -> RepoResult<PartitionCount>;

    async fn count_by_async(&self, filter: Filter<T>, cancel: &CancellationToken) -> RepoResult<PartitionCount>;
}

/// Projection helpers. Generic over the target shape, so they live outside
/// the object-safe contract.
#[async_trait]
pub trait RepositoryExt<T: Entity>: Repository<T> {
    fn get_list_as<D, F>(&self, query: &Query<T>, projection: F) -> RepoResult<Vec<D>>
    where
        F: Fn(T) -> D,
    {
        Ok(self.get_list(query)?.into_iter().map(projection).collect())
    }

    async fn get_list_as_async<D, F>(
        &self,
        query: Query<T>,
        projection: F,
        cancel: &CancellationToken,
    ) -> RepoResult<Vec<D>>
    where
        D: Send,
        F: Fn(T) -> D + Send,
    {
        let rows = self.get_list_async(query, cancel).await?;
        Ok(rows.into_iter().map(projection).collect())
    }
}

impl<T: Entity, R: Repository<T> + ?Sized> RepositoryExt<T> for R {}
