// src/binder/mod.rs
//
// Repository binder
//
// At startup, binds each declared repository interface to its single
// implementation and registers both the bindings and the unit of work in
// the service registry.
//
// CRITICAL RULES:
// - Declarations are explicit (repository modules), never discovered
// - Zero or multiple implementations for an interface is a configuration
//   error, reported before anything is registered
// - All bindings are scoped

pub mod module;
pub mod options;
pub mod registration;

#[cfg(test)]
mod binder_tests;

pub use module::{Implementation, RepositoryContract, RepositoryModule};
pub use options::RepositoryOptions;
pub use registration::{add_generic_repositories, RepositoryBinding, RepositoryBindings};
