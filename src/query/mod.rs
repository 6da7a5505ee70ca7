// src/query/mod.rs
//
// Query Builder
//
// Shapes reads (filter, include, ordering, paging, tracking) into a
// composable `Query<T>` before a data context executes it.

pub mod filter;
pub mod include;
pub mod builder;

pub use filter::{Filter, Mutation};
pub use include::{Include, RelatedSource};
pub use builder::{PartitionCount, Query, Tracking};
