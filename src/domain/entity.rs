// src/domain/entity.rs
//
// Entity contract
//
// The core never inspects entity fields. It only needs:
// - a stable key for identity lookup and change tracking
// - a collection name the data context stores the entity under
// - serde support so a context can materialize and persist it

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreResult;

/// A record type managed by a data context.
///
/// Composite keys are expressed as tuples, e.g. `type Key = (Uuid, u32);`.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Widget { id: Uuid, name: String }
///
/// impl Entity for Widget {
///     type Key = Uuid;
///     const COLLECTION: &'static str = "widgets";
///     fn key(&self) -> Uuid { self.id }
/// }
/// ```
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Key: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Name of the collection (table) holding this entity type.
    const COLLECTION: &'static str;

    fn key(&self) -> Self::Key;
}

/// Encode a key into the canonical text form used for identity comparison.
pub fn encode_key<K: Serialize>(key: &K) -> StoreResult<String> {
    Ok(serde_json::to_string(key)?)
}
