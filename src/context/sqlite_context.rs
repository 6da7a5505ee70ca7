// src/context/sqlite_context.rs
//
// SQLite Data Context
//
// Document-style store: one table per entity collection, one JSON body per
// entity. Queries load the collection in natural (rowid) order and evaluate
// filter/ordering/paging in process.
//
// PRINCIPLES:
// - One pooled connection per context, held until dispose
// - Every flush and set-based update runs inside a savepoint, so it is
//   atomic on its own and nests inside an explicit transaction
// - Cancellation is checked before work starts and again before a
//   savepoint is released; a cancelled write never commits
// - Reads attach rows to the change set only once the caller receives
//   them; an abandoned read leaves the context untouched

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio_util::sync::CancellationToken;

use crate::context::change_set::{ChangeSet, EntryState, PendingChange};
use crate::context::{ContextTransaction, DataContext};
use crate::db::{collection_exists, ensure_collection, get_connection, ConnectionPool, PooledConn};
use crate::domain::{encode_key, Entity};
use crate::error::{RepositoryError, StoreError, StoreResult};
use crate::query::{Filter, Mutation, Query, RelatedSource, Tracking};
use crate::registry::ServiceCollection;

/// The crate's base data context.
pub struct SqliteContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    conn: Mutex<Option<PooledConn>>,
    changes: Mutex<ChangeSet>,
    in_transaction: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl SqliteContext {
    /// Check a connection out of the pool for the lifetime of the context.
    pub fn new(pool: &ConnectionPool) -> StoreResult<Self> {
        let conn = get_connection(pool)?;
        Ok(Self {
            inner: Arc::new(ContextInner {
                conn: Mutex::new(Some(conn)),
                changes: Mutex::new(ChangeSet::new()),
                in_transaction: AtomicBool::new(false),
            }),
        })
    }

    /// Register a scoped `SqliteContext` factory: one context per scope.
    pub fn register(services: &mut ServiceCollection, pool: ConnectionPool) {
        services.add_scoped::<SqliteContext, _>(move |_| {
            SqliteContext::new(&pool)
                .map(Arc::new)
                .map_err(RepositoryError::from)
        });
    }

    /// Number of entities attached to the change set.
    pub fn tracked_count(&self) -> usize {
        lock(&self.inner.changes).len()
    }

    /// Number of staged changes waiting for the next persist.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.changes).pending().len()
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.in_transaction.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.inner.conn).is_none()
    }

    fn stage<T: Entity>(
        &self,
        entity: &T,
        apply: impl FnOnce(&mut ChangeSet, String, serde_json::Value),
    ) -> StoreResult<()> {
        self.inner.ensure_open()?;
        let key = encode_key(&entity.key())?;
        let body = serde_json::to_value(entity)?;
        apply(&mut *lock(&self.inner.changes), key, body);
        Ok(())
    }
}

impl ContextInner {
    fn ensure_open(&self) -> StoreResult<()> {
        if lock(&self.conn).is_none() {
            return Err(StoreError::Disposed);
        }
        Ok(())
    }

    fn with_connection<R>(&self, work: impl FnOnce(&Connection) -> StoreResult<R>) -> StoreResult<R> {
        let guard = lock(&self.conn);
        let conn = guard.as_ref().ok_or(StoreError::Disposed)?;
        work(conn)
    }

    /// Rows for `query`, not yet attached to the change set.
    fn run_query<T: Entity>(&self, query: &Query<T>) -> StoreResult<Vec<T>> {
        self.with_connection(|conn| {
            let mut rows = query.apply(load_entities::<T>(conn)?);

            let source = ConnectionSource { conn };
            for include in query.includes() {
                include.apply(&mut rows, &source)?;
            }
            Ok(rows)
        })
    }

    fn find_one<T: Entity>(&self, key: &T::Key) -> StoreResult<Lookup<T>> {
        let encoded = encode_key(key)?;
        self.with_connection(|conn| {
            {
                let changes = lock(&self.changes);
                if changes.state(T::COLLECTION, &encoded) == Some(EntryState::Deleted) {
                    return Ok(Lookup::Missing);
                }
                if let Some(body) = changes.local_body(T::COLLECTION, &encoded) {
                    return Ok(Lookup::Local(serde_json::from_value(body)?));
                }
            }

            if !collection_exists(conn, T::COLLECTION)? {
                return Ok(Lookup::Missing);
            }
            let body: Option<String> = conn
                .query_row(
                    &format!("SELECT body FROM \"{}\" WHERE key = ?1", T::COLLECTION),
                    params![encoded],
                    |row| row.get(0),
                )
                .optional()?;

            match body {
                Some(body) => Ok(Lookup::Stored(serde_json::from_str(&body)?)),
                None => Ok(Lookup::Missing),
            }
        })
    }

    /// Attach `rows` when the query asked for tracking.
    fn deliver<T: Entity>(&self, rows: Vec<T>, tracking: Tracking) -> StoreResult<Vec<T>> {
        if tracking.is_enabled() {
            self.track(&rows)?;
        }
        Ok(rows)
    }

    fn track<T: Entity>(&self, rows: &[T]) -> StoreResult<()> {
        let mut changes = lock(&self.changes);
        for row in rows {
            changes.attach(T::COLLECTION, encode_key(&row.key())?, serde_json::to_value(row)?);
        }
        Ok(())
    }

    fn update_where<T: Entity>(
        &self,
        filter: &Filter<T>,
        mutation: &Mutation<T>,
        cancel: Option<&CancellationToken>,
    ) -> StoreResult<usize> {
        self.with_connection(|conn| {
            ensure_collection(conn, T::COLLECTION)?;
            in_savepoint(conn, "execute_update", cancel, || {
                let now = timestamp();
                let mut affected = 0;
                for (key, body) in load_documents(conn, T::COLLECTION)? {
                    let mut entity: T = serde_json::from_value(body)?;
                    if !filter.matches(&entity) {
                        continue;
                    }
                    mutation.apply(&mut entity);
                    conn.execute(
                        &format!(
                            "UPDATE \"{}\" SET body = ?1, updated_at = ?2 WHERE key = ?3",
                            T::COLLECTION
                        ),
                        params![serde_json::to_string(&entity)?, now, key],
                    )?;
                    affected += 1;
                }
                Ok(affected)
            })
        })
    }

    fn flush(&self, cancel: Option<&CancellationToken>) -> StoreResult<usize> {
        self.with_connection(|conn| {
            let pending = lock(&self.changes).pending();
            if pending.is_empty() {
                return Ok(0);
            }

            let mut collections: Vec<&'static str> = pending.iter().map(|c| c.collection).collect();
            collections.sort_unstable();
            collections.dedup();

            let affected = in_savepoint(conn, "save_changes", cancel, || {
                for collection in &collections {
                    ensure_collection(conn, collection)?;
                }
                let now = timestamp();
                for change in &pending {
                    apply_change(conn, change, &now)?;
                }
                Ok(pending.len())
            })?;

            lock(&self.changes).accept(&pending);
            log::debug!("Persisted {} staged change(s)", affected);
            Ok(affected)
        })
    }

    fn begin(&self) -> StoreResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_transaction.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn finish(&self, statement: &str) -> StoreResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch(statement)?;
            self.in_transaction.store(false, Ordering::SeqCst);
            Ok(())
        })
    }

    fn dispose(&self) {
        let mut guard = lock(&self.conn);
        let Some(conn) = guard.take() else {
            return;
        };

        if self.in_transaction.swap(false, Ordering::SeqCst) {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                log::warn!("Failed to roll back open transaction on dispose: {}", e);
            }
        }
        lock(&self.changes).clear();
        log::debug!("Data context disposed");
    }
}

/// Result of a key lookup. Entities already in the change set are not
/// re-attached, which would reset their staged state.
enum Lookup<T> {
    Local(T),
    Stored(T),
    Missing,
}

impl<T: Entity> Lookup<T> {
    fn deliver(self, inner: &ContextInner) -> StoreResult<Option<T>> {
        match self {
            Lookup::Local(entity) => Ok(Some(entity)),
            Lookup::Stored(entity) => {
                inner.track(std::slice::from_ref(&entity))?;
                Ok(Some(entity))
            }
            Lookup::Missing => Ok(None),
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Every document in `collection`, in natural store order. A collection
/// that was never written to reads as empty.
fn load_documents(conn: &Connection, collection: &str) -> StoreResult<Vec<(String, serde_json::Value)>> {
    if !collection_exists(conn, collection)? {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT key, body FROM \"{collection}\" ORDER BY rowid"
    ))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut documents = Vec::new();
    for row in rows {
        let (key, body) = row?;
        documents.push((key, serde_json::from_str(&body)?));
    }
    Ok(documents)
}

fn load_entities<T: Entity>(conn: &Connection) -> StoreResult<Vec<T>> {
    load_documents(conn, T::COLLECTION)?
        .into_iter()
        .map(|(_, body)| Ok(serde_json::from_value(body)?))
        .collect()
}

fn apply_change(conn: &Connection, change: &PendingChange, now: &str) -> StoreResult<()> {
    let collection = change.collection;
    let affected = match change.state {
        EntryState::Added => conn.execute(
            &format!(
                "INSERT INTO \"{collection}\" (key, body, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)"
            ),
            params![change.key, change.body.to_string(), now],
        )?,
        EntryState::Modified => conn.execute(
            &format!("UPDATE \"{collection}\" SET body = ?1, updated_at = ?2 WHERE key = ?3"),
            params![change.body.to_string(), now, change.key],
        )?,
        EntryState::Deleted => conn.execute(
            &format!("DELETE FROM \"{collection}\" WHERE key = ?1"),
            params![change.key],
        )?,
        EntryState::Unchanged => return Ok(()),
    };

    if affected == 0 {
        return Err(StoreError::RowMissing {
            collection: collection.to_string(),
            key: change.key.clone(),
        });
    }
    Ok(())
}

/// Run `work` inside a savepoint; release on success, roll back otherwise.
fn in_savepoint<R>(
    conn: &Connection,
    name: &str,
    cancel: Option<&CancellationToken>,
    work: impl FnOnce() -> StoreResult<R>,
) -> StoreResult<R> {
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;

    let result = work()
        .and_then(|value| match cancel {
            Some(token) if token.is_cancelled() => Err(StoreError::Cancelled),
            _ => Ok(value),
        })
        .and_then(|value| {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(value)
        });

    if result.is_err() {
        if let Err(e) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}")) {
            log::warn!("Failed to roll back savepoint {}: {}", name, e);
        }
    }
    result
}

struct ConnectionSource<'a> {
    conn: &'a Connection,
}

impl RelatedSource for ConnectionSource<'_> {
    fn load_related(&self, collection: &'static str) -> StoreResult<Vec<serde_json::Value>> {
        Ok(load_documents(self.conn, collection)?
            .into_iter()
            .map(|(_, body)| body)
            .collect())
    }
}

/// Run read-only work off the async runtime. Cancellation abandons the
/// result even while the work is in flight; abandoned work must not touch
/// the change set, so callers attach rows only after this returns `Ok`.
async fn spawn_read<R, F>(inner: &Arc<ContextInner>, cancel: &CancellationToken, work: F) -> StoreResult<R>
where
    R: Send + 'static,
    F: FnOnce(&ContextInner) -> StoreResult<R> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }

    let inner = Arc::clone(inner);
    let task = tokio::task::spawn_blocking(move || work(inner.as_ref()));

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        joined = task => joined?,
    }
}

/// Run writing work off the async runtime. The work itself observes the
/// token at its commit point, so the outcome it reports is the outcome that
/// reached the store.
async fn spawn_write<R, F>(inner: &Arc<ContextInner>, cancel: &CancellationToken, work: F) -> StoreResult<R>
where
    R: Send + 'static,
    F: FnOnce(&ContextInner, &CancellationToken) -> StoreResult<R> + Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }

    let inner = Arc::clone(inner);
    let token = cancel.clone();
    tokio::task::spawn_blocking(move || work(inner.as_ref(), &token)).await?
}

#[async_trait]
impl DataContext for SqliteContext {
    type Transaction = SqliteTransaction;

    fn stage_insert<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.stage(&entity, |changes, key, body| changes.stage_added(T::COLLECTION, key, body))
    }

    fn stage_update<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.stage(&entity, |changes, key, body| changes.stage_modified(T::COLLECTION, key, body))
    }

    fn stage_remove<T: Entity>(&self, entity: T) -> StoreResult<()> {
        self.stage(&entity, |changes, key, body| changes.stage_deleted(T::COLLECTION, key, body))
    }

    fn is_tracked<T: Entity>(&self, entity: &T) -> StoreResult<bool> {
        let key = encode_key(&entity.key())?;
        Ok(lock(&self.inner.changes).contains(T::COLLECTION, &key))
    }

    fn find<T: Entity>(&self, key: &T::Key) -> StoreResult<Option<T>> {
        self.inner.find_one::<T>(key)?.deliver(&self.inner)
    }

    async fn find_async<T: Entity>(
        &self,
        key: &T::Key,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<T>> {
        let key = key.clone();
        spawn_read(&self.inner, cancel, move |inner| inner.find_one::<T>(&key))
            .await?
            .deliver(&self.inner)
    }

    fn execute<T: Entity>(&self, query: &Query<T>) -> StoreResult<Vec<T>> {
        let rows = self.inner.run_query(query)?;
        self.inner.deliver(rows, query.tracking())
    }

    async fn execute_async<T: Entity>(
        &self,
        query: Query<T>,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<T>> {
        let tracking = query.tracking();
        let rows = spawn_read(&self.inner, cancel, move |inner| inner.run_query(&query)).await?;
        self.inner.deliver(rows, tracking)
    }

    async fn execute_update<T: Entity>(
        &self,
        filter: Filter<T>,
        mutation: Mutation<T>,
        cancel: &CancellationToken,
    ) -> StoreResult<usize> {
        spawn_write(&self.inner, cancel, move |inner, token| {
            inner.update_where(&filter, &mutation, Some(token))
        })
        .await
    }

    fn save_changes(&self) -> StoreResult<usize> {
        self.inner.flush(None)
    }

    async fn save_changes_async(&self, cancel: &CancellationToken) -> StoreResult<usize> {
        spawn_write(&self.inner, cancel, |inner, token| inner.flush(Some(token))).await
    }

    async fn begin_transaction(&self, cancel: &CancellationToken) -> StoreResult<SqliteTransaction> {
        spawn_write(&self.inner, cancel, |inner, _| inner.begin()).await?;
        log::debug!("Transaction started");
        Ok(SqliteTransaction {
            inner: Arc::clone(&self.inner),
            open: true,
        })
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}

/// Handle for a `BEGIN IMMEDIATE` transaction on the context's connection.
/// Dropping an open handle rolls it back.
pub struct SqliteTransaction {
    inner: Arc<ContextInner>,
    open: bool,
}

impl SqliteTransaction {
    pub fn is_open(&self) -> bool {
        self.open
    }
}

#[async_trait]
impl ContextTransaction for SqliteTransaction {
    async fn commit(&mut self, cancel: &CancellationToken) -> StoreResult<()> {
        if !self.open {
            return Err(StoreError::TransactionClosed);
        }

        spawn_write(&self.inner, cancel, |inner, token| {
            if token.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            inner.finish("COMMIT")
        })
        .await?;

        self.open = false;
        log::debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(&mut self, cancel: &CancellationToken) -> StoreResult<()> {
        if !self.open {
            return Err(StoreError::TransactionClosed);
        }

        spawn_write(&self.inner, cancel, |inner, _| inner.finish("ROLLBACK")).await?;

        self.open = false;
        log::debug!("Transaction rolled back");
        Ok(())
    }

    fn dispose(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        match self.inner.finish("ROLLBACK") {
            Ok(()) => log::warn!("Open transaction rolled back on dispose"),
            Err(StoreError::Disposed) => {}
            Err(e) => log::warn!("Failed to roll back transaction on dispose: {}", e),
        }
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        self.dispose();
    }
}
