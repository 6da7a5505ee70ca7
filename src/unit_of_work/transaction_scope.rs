// src/unit_of_work/transaction_scope.rs
//
// Transaction scope helper: begin, run, then commit on Ok or roll back on
// Err. The error returned is always the one that ended the scope.
//
// The rollback runs under its own token: a scope ended by cancellation must
// still release its transaction.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::RepoResult;
use crate::unit_of_work::UnitOfWork;

pub async fn run_in_transaction<F, Fut, R>(
    uow: &dyn UnitOfWork,
    cancel: &CancellationToken,
    work: F,
) -> RepoResult<R>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = RepoResult<R>>,
{
    uow.begin_transaction(cancel).await?;

    let result = match work().await {
        Ok(value) => uow.commit(cancel).await.map(|()| value),
        Err(e) => Err(e),
    };

    if result.is_err() && uow.has_active_transaction() {
        if let Err(rollback_err) = uow.rollback(&CancellationToken::new()).await {
            log::warn!("Rollback after failed transaction scope failed: {}", rollback_err);
        }
    }
    result
}
