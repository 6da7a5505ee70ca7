// src/unit_of_work/context_unit_of_work.rs
//
// Unit of work over any DataContext
//
// The transaction handle is taken out of its slot for the duration of an
// async call so no lock is held across an await, and put back if the call
// fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::{ContextTransaction, DataContext};
use crate::error::{RepoResult, RepositoryError};
use crate::unit_of_work::UnitOfWork;

const NOT_STARTED: &str = "Transaction not started";

pub struct ContextUnitOfWork<C: DataContext> {
    context: Arc<C>,
    transaction: Mutex<Option<C::Transaction>>,
    disposed: AtomicBool,
}

impl<C: DataContext> ContextUnitOfWork<C> {
    pub fn new(context: Arc<C>) -> Self {
        Self {
            context,
            transaction: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    fn slot(&self) -> MutexGuard<'_, Option<C::Transaction>> {
        self.transaction.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_open(&self) -> RepoResult<C::Transaction> {
        self.slot()
            .take()
            .ok_or_else(|| RepositoryError::State(NOT_STARTED.to_string()))
    }

    fn restore(&self, transaction: C::Transaction) {
        *self.slot() = Some(transaction);
    }

    fn ensure_live(&self) -> RepoResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RepositoryError::State("Unit of work has been disposed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: DataContext> UnitOfWork for ContextUnitOfWork<C> {
    async fn begin_transaction(&self, cancel: &CancellationToken) -> RepoResult<()> {
        self.ensure_live()?;
        if self.has_active_transaction() {
            log::debug!("Transaction already open; begin is a no-op");
            return Ok(());
        }

        let transaction = self.context.begin_transaction(cancel).await?;
        self.restore(transaction);
        Ok(())
    }

    async fn commit(&self, cancel: &CancellationToken) -> RepoResult<()> {
        self.ensure_live()?;
        let mut transaction = self.take_open()?;

        let outcome = async {
            self.context.save_changes_async(cancel).await?;
            transaction.commit(cancel).await?;
            Ok::<_, RepositoryError>(())
        }
        .await;

        if let Err(e) = outcome {
            self.restore(transaction);
            return Err(e);
        }
        Ok(())
    }

    async fn rollback(&self, cancel: &CancellationToken) -> RepoResult<()> {
        self.ensure_live()?;
        let mut transaction = self.take_open()?;

        if let Err(e) = transaction.rollback(cancel).await {
            self.restore(transaction);
            return Err(e.into());
        }
        Ok(())
    }

    fn save_changes(&self) -> RepoResult<usize> {
        self.ensure_live()?;
        Ok(self.context.save_changes()?)
    }

    async fn save_changes_async(&self, cancel: &CancellationToken) -> RepoResult<usize> {
        self.ensure_live()?;
        Ok(self.context.save_changes_async(cancel).await?)
    }

    fn has_active_transaction(&self) -> bool {
        self.slot().is_some()
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(mut transaction) = self.slot().take() {
            transaction.dispose();
        }
        self.context.dispose();
    }
}

impl<C: DataContext> Drop for ContextUnitOfWork<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}
