// src/domain/mod.rs
//
// Domain Root
//
// Entities are opaque to this crate. The only domain contract is the
// `Entity` trait every managed record type implements.

pub mod entity;

pub use entity::{encode_key, Entity};
