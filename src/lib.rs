// src/lib.rs
// Generic repository - data access over a pluggable data context
//
// Architecture:
// - Data context: owns the connection, change set and transactions
// - Repository: generic CRUD + query façade over one entity type
// - Unit of work: explicit transaction boundaries over one context
// - Binder: binds repository interfaces to implementations at startup
// - Registry: singleton / scoped service resolution for the host
//
// Explicit: no runtime discovery, no implicit persistence, no magic

// ============================================================================
// FOUNDATION
// ============================================================================

pub mod db;
pub mod domain;
pub mod error;
pub mod query;

// ============================================================================
// DATA ACCESS
// ============================================================================

pub mod context;
pub mod repositories;
pub mod unit_of_work;

// ============================================================================
// WIRING
// ============================================================================

pub mod binder;
pub mod registry;

#[cfg(test)]
mod test_support;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use binder::{
    add_generic_repositories, Implementation, RepositoryBinding, RepositoryBindings,
    RepositoryContract, RepositoryModule, RepositoryOptions,
};

pub use context::{ContextTransaction, DataContext, SqliteContext, SqliteTransaction};

pub use db::{create_connection_pool, ConnectionConfig, ConnectionPool};

pub use domain::Entity;

pub use error::{RepoResult, RepositoryError, StoreError, StoreResult};

pub use query::{Filter, Include, Mutation, PartitionCount, Query, Tracking};

pub use registry::{Lifetime, ServiceCollection, ServiceProvider, ServiceScope};

pub use repositories::{GenericRepository, Repository, RepositoryBase, RepositoryExt};

pub use unit_of_work::{run_in_transaction, ContextUnitOfWork, UnitOfWork};

pub use tokio_util::sync::CancellationToken;
