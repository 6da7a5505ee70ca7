// src/unit_of_work/unit_of_work_tests.rs
//
// Unit of work tests
//
// INVARIANTS TESTED:
// - begin_transaction is idempotent: one open handle at most
// - commit / rollback while idle fail with "Transaction not started"
// - commit persists staged changes; rollback discards in-transaction writes
// - A failed commit leaves the transaction open for rollback
// - dispose is idempotent
// - run_in_transaction commits on Ok and rolls back on Err

#[cfg(test)]
mod state_machine_tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::context::{DataContext, SqliteContext};
    use crate::error::{RepositoryError, StoreError};
    use crate::query::{Filter, Tracking};
    use crate::repositories::{GenericRepository, Repository};
    use crate::test_support::{test_db, widget, TestDb, Widget};
    use crate::unit_of_work::{ContextUnitOfWork, UnitOfWork};

    fn open(db: &TestDb) -> (ContextUnitOfWork<SqliteContext>, GenericRepository<Widget, SqliteContext>) {
        let context = Arc::new(SqliteContext::new(&db.pool).unwrap());
        (
            ContextUnitOfWork::new(Arc::clone(&context)),
            GenericRepository::new(context),
        )
    }

    /// Rows visible to a separate reader context. No unit of work owns the
    /// reader, so nothing disposes it mid-read.
    fn persisted(db: &TestDb) -> usize {
        let reader: GenericRepository<Widget, SqliteContext> =
            GenericRepository::new(Arc::new(SqliteContext::new(&db.pool).unwrap()));
        reader.get_list(&reader.as_queryable(Tracking::Disabled)).unwrap().len()
    }

    fn is_not_started(result: Result<(), RepositoryError>) -> bool {
        matches!(result, Err(RepositoryError::State(msg)) if msg == "Transaction not started")
    }

    #[tokio::test]
    async fn test_begin_is_idempotent() {
        let db = test_db();
        let (uow, _) = open(&db);
        let cancel = CancellationToken::new();

        assert!(!uow.has_active_transaction());
        uow.begin_transaction(&cancel).await.unwrap();
        uow.begin_transaction(&cancel).await.unwrap();
        assert!(uow.has_active_transaction());

        uow.commit(&cancel).await.unwrap();
        assert!(!uow.has_active_transaction());
        assert!(is_not_started(uow.commit(&cancel).await));
    }

    #[tokio::test]
    async fn test_commit_and_rollback_require_open_transaction() {
        let db = test_db();
        let (uow, _) = open(&db);
        let cancel = CancellationToken::new();

        assert!(is_not_started(uow.commit(&cancel).await));
        assert!(is_not_started(uow.rollback(&cancel).await));
    }

    #[tokio::test]
    async fn test_commit_persists_staged_changes() {
        let db = test_db();
        let (uow, repo) = open(&db);
        let cancel = CancellationToken::new();

        uow.begin_transaction(&cancel).await.unwrap();
        repo.add_range(vec![widget("gear", 10), widget("bolt", 2)]).unwrap();
        assert_eq!(persisted(&db), 0);

        uow.commit(&cancel).await.unwrap();
        assert_eq!(persisted(&db), 2);
    }

    #[tokio::test]
    async fn test_rollback_discards_saved_changes() {
        let db = test_db();
        let (uow, repo) = open(&db);
        let cancel = CancellationToken::new();

        uow.begin_transaction(&cancel).await.unwrap();
        repo.add(widget("gear", 10)).unwrap();
        assert_eq!(uow.save_changes_async(&cancel).await.unwrap(), 1);
        assert!(repo.any(Filter::all()).unwrap());

        uow.rollback(&cancel).await.unwrap();
        assert!(!uow.has_active_transaction());
        assert!(!repo.any(Filter::all()).unwrap());
        assert_eq!(persisted(&db), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_transaction_open() {
        let db = test_db();
        let (uow, _) = open(&db);
        let cancel = CancellationToken::new();

        uow.begin_transaction(&cancel).await.unwrap();
        // Staged as an update of a row that was never persisted.
        uow.context().stage_update(widget("ghost", 0)).unwrap();

        let result = uow.commit(&cancel).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Store(StoreError::RowMissing { .. }))
        ));
        assert!(uow.has_active_transaction());

        uow.rollback(&cancel).await.unwrap();
        assert!(!uow.has_active_transaction());
    }

    #[tokio::test]
    async fn test_cancelled_commit_persists_nothing() {
        let db = test_db();
        let (uow, repo) = open(&db);
        let live = CancellationToken::new();

        uow.begin_transaction(&live).await.unwrap();
        repo.add(widget("gear", 10)).unwrap();

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(matches!(uow.commit(&cancelled).await, Err(RepositoryError::Cancelled)));
        assert!(uow.has_active_transaction());

        uow.rollback(&live).await.unwrap();
        assert_eq!(persisted(&db), 0);
    }

    #[test]
    fn test_dropping_unit_of_work_disposes_its_context() {
        let db = test_db();
        let (uow, repo) = open(&db);
        repo.add(widget("gear", 10)).unwrap();
        uow.save_changes().unwrap();

        drop(uow);
        assert!(matches!(
            repo.any(Filter::all()),
            Err(RepositoryError::Store(StoreError::Disposed))
        ));
        // A reader with its own context is unaffected.
        assert_eq!(persisted(&db), 1);
    }

    #[test]
    fn test_save_changes_outside_transaction() {
        let db = test_db();
        let (uow, repo) = open(&db);

        repo.add(widget("gear", 10)).unwrap();
        assert_eq!(uow.save_changes().unwrap(), 1);
        assert_eq!(persisted(&db), 1);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_rolls_back() {
        let db = test_db();
        let (uow, repo) = open(&db);
        let cancel = CancellationToken::new();

        uow.begin_transaction(&cancel).await.unwrap();
        repo.add(widget("gear", 10)).unwrap();
        uow.save_changes().unwrap();

        uow.dispose();
        uow.dispose();

        assert!(!uow.has_active_transaction());
        assert!(uow.context().is_disposed());
        assert!(matches!(uow.save_changes(), Err(RepositoryError::State(_))));
        assert_eq!(persisted(&db), 0);
    }
}

#[cfg(test)]
mod transaction_scope_tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::context::SqliteContext;
    use crate::error::RepositoryError;
    use crate::query::Tracking;
    use crate::repositories::{GenericRepository, Repository};
    use crate::test_support::{test_db, widget, Widget};
    use crate::unit_of_work::{run_in_transaction, ContextUnitOfWork, MockUnitOfWork, UnitOfWork};

    #[tokio::test]
    async fn test_scope_commits_on_success() {
        let mut uow = MockUnitOfWork::new();
        uow.expect_begin_transaction().times(1).returning(|_| Ok(()));
        uow.expect_commit().times(1).returning(|_| Ok(()));
        uow.expect_has_active_transaction().return_const(false);
        uow.expect_rollback().never();

        let cancel = CancellationToken::new();
        let value = run_in_transaction(&uow, &cancel, || async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_scope_rolls_back_and_returns_original_error() {
        let mut uow = MockUnitOfWork::new();
        uow.expect_begin_transaction().times(1).returning(|_| Ok(()));
        uow.expect_commit().never();
        uow.expect_has_active_transaction().return_const(true);
        uow.expect_rollback().times(1).returning(|_| Ok(()));

        let cancel = CancellationToken::new();
        let result: Result<(), _> = run_in_transaction(&uow, &cancel, || async {
            Err(RepositoryError::Validation("bad input".to_string()))
        })
        .await;

        assert!(matches!(result, Err(RepositoryError::Validation(msg)) if msg == "bad input"));
    }

    #[tokio::test]
    async fn test_scope_does_not_run_work_when_begin_fails() {
        let mut uow = MockUnitOfWork::new();
        uow.expect_begin_transaction()
            .times(1)
            .returning(|_| Err(RepositoryError::Cancelled));
        uow.expect_commit().never();
        uow.expect_rollback().never();

        let cancel = CancellationToken::new();
        // Work that ran would reach commit, which is expected never.
        let result = run_in_transaction(&uow, &cancel, || async { Ok(()) }).await;

        assert!(matches!(result, Err(RepositoryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_scope_against_store_discards_failed_work() {
        let db = test_db();
        let context = Arc::new(SqliteContext::new(&db.pool).unwrap());
        let uow = ContextUnitOfWork::new(Arc::clone(&context));
        let repo: GenericRepository<Widget, SqliteContext> = GenericRepository::new(context);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = run_in_transaction(&uow, &cancel, || async {
            repo.add(widget("gear", 10))?;
            uow.save_changes()?;
            Err(RepositoryError::Conflict("late failure".to_string()))
        })
        .await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));

        let remaining = repo.get_list(&repo.as_queryable(Tracking::Disabled)).unwrap();
        assert!(remaining.is_empty());
    }
}
