// src/unit_of_work/mod.rs
//
// Unit of Work
//
// Explicit transaction boundaries and batched persistence over one data
// context.
//
// State machine:
//   Idle --begin_transaction--> Open
//   Open --begin_transaction--> Open      (no-op)
//   Open --commit / rollback--> Idle
//   Idle --commit / rollback--> error "Transaction not started"
//
// CRITICAL RULES:
// - At most one open transaction handle per unit of work
// - commit persists staged changes BEFORE committing the transaction
// - A failed commit keeps the transaction open so the caller can roll back

pub mod context_unit_of_work;
pub mod transaction_scope;

#[cfg(test)]
mod unit_of_work_tests;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::DataContext;
use crate::error::RepoResult;
use crate::registry::ServiceCollection;

pub use context_unit_of_work::ContextUnitOfWork;
pub use transaction_scope::run_in_transaction;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Open a transaction. Idempotent while one is already open.
    async fn begin_transaction(&self, cancel: &CancellationToken) -> RepoResult<()>;

    /// Persist staged changes, commit and release the transaction.
    async fn commit(&self, cancel: &CancellationToken) -> RepoResult<()>;

    /// Release the transaction without persisting.
    async fn rollback(&self, cancel: &CancellationToken) -> RepoResult<()>;

    /// Persist staged changes now, inside or outside a transaction.
    fn save_changes(&self) -> RepoResult<usize>;

    async fn save_changes_async(&self, cancel: &CancellationToken) -> RepoResult<usize>;

    fn has_active_transaction(&self) -> bool;

    /// Release the transaction (rolled back if open) and the data context.
    fn dispose(&self);
}

/// Register a scoped `dyn UnitOfWork` bound to the scope's `C` context.
pub fn register_unit_of_work<C: DataContext>(services: &mut ServiceCollection) {
    services.add_scoped::<dyn UnitOfWork, _>(|scope| {
        let context = scope.resolve::<C>()?;
        Ok(Arc::new(ContextUnitOfWork::new(context)) as Arc<dyn UnitOfWork>)
    });
}
