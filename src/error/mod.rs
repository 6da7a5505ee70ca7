// src/error/mod.rs
//
// Error types shared by the data context, repositories and binder.

pub mod types;

pub use types::{RepoResult, RepositoryError, StoreError, StoreResult};
