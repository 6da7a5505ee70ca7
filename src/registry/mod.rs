// src/registry/mod.rs
//
// Service registry
//
// Minimal host-side registry: registrations are collected into a
// `ServiceCollection` at startup, frozen into a `ServiceProvider`, and
// resolved per logical request from a `ServiceScope`.
//
// Supports exactly two lifetimes: singleton and scoped.

pub mod service_collection;
pub mod service_provider;


pub use service_collection::{Lifetime, ServiceCollection};
pub use service_provider::{ServiceProvider, ServiceScope};
