// src/repositories/mod.rs
//
// Repository layer
//
// CRITICAL RULES:
// - Repositories are DUMB façades over a data context
// - NO business logic
// - NO transaction management (that is the unit of work's job)
// - NO cross-repository calls
// - Domain repositories extend `Repository<T>` and add nothing but a name

pub mod generic_repository;
pub mod repository;


pub use generic_repository::{GenericRepository, RepositoryBase};
pub use repository::{Repository, RepositoryExt};
