// src/context/mod.rs
//
// Data Context contract
//
// The data context owns the connection, the change set and the transaction
// primitives. Repositories and the unit of work only mediate requests to it.
//
// CRITICAL RULES:
// - One context per logical request (scoped lifetime)
// - Operations on one context are serialized
// - Staged changes reach the store only through save_changes / commit

pub mod change_set;
pub mod sqlite_context;


use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::Entity;
use crate::error::StoreResult;
use crate::query::{Filter, Mutation, Query};

pub use change_set::{ChangeSet, EntryState, PendingChange};
pub use sqlite_context::{SqliteContext, SqliteTransaction};

/// The narrow contract the repository layer consumes.
#[async_trait]
pub trait DataContext: Send + Sync + 'static {
    type Transaction: ContextTransaction;

    /// Stage an insert for the next persist.
    fn stage_insert<T: Entity>(&self, entity: T) -> StoreResult<()>;

    /// Stage a full-entity update for the next persist.
    fn stage_update<T: Entity>(&self, entity: T) -> StoreResult<()>;

    /// Stage a removal for the next persist.
    fn stage_remove<T: Entity>(&self, entity: T) -> StoreResult<()>;

    /// Whether an entity with this key is attached to the change set.
    fn is_tracked<T: Entity>(&self, entity: &T) -> StoreResult<bool>;

    /// Look an entity up by key. Found entities are tracked.
    fn find<T: Entity>(&self, key: &T::Key) -> StoreResult<Option<T>>;

    async fn find_async<T: Entity>(
        &self,
        key: &T::Key,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<T>>;

    /// Execute a query, honoring its filter, ordering, paging, includes
    /// and tracking mode.
    fn execute<T: Entity>(&self, query: &Query<T>) -> StoreResult<Vec<T>>;

    async fn execute_async<T: Entity>(
        &self,
        query: Query<T>,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<T>>;

    /// Set-based update applied directly at the store. Bypasses the change
    /// set and returns the number of affected rows.
    async fn execute_update<T: Entity>(
        &self,
        filter: Filter<T>,
        mutation: Mutation<T>,
        cancel: &CancellationToken,
    ) -> StoreResult<usize>;

    /// Persist every staged change. Returns the number of affected entities.
    fn save_changes(&self) -> StoreResult<usize>;

    async fn save_changes_async(&self, cancel: &CancellationToken) -> StoreResult<usize>;

    async fn begin_transaction(&self, cancel: &CancellationToken) -> StoreResult<Self::Transaction>;

    /// Release the connection and the change set. Idempotent.
    fn dispose(&self);
}

/// A transaction handle opened by a data context.
#[async_trait]
pub trait ContextTransaction: Send + Sync + 'static {
    async fn commit(&mut self, cancel: &CancellationToken) -> StoreResult<()>;

    async fn rollback(&mut self, cancel: &CancellationToken) -> StoreResult<()>;

    /// Release the handle, rolling back if it is still open. Idempotent.
    fn dispose(&mut self);
}
