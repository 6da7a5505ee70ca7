// src/test_support.rs
//
// Shared test fixtures
//
// - Widget / Category entities with a Uuid key
// - A file-backed database in a temp directory (in-memory pools are capped
//   at one connection, which rules out multi-scope tests)

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use uuid::Uuid;

use crate::db::{create_connection_pool, ConnectionConfig, ConnectionPool};
use crate::domain::Entity;
use crate::query::Include;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

impl Entity for Category {
    type Key = Uuid;
    const COLLECTION: &'static str = "categories";

    fn key(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub category_id: Option<Uuid>,
    /// Navigation property, only populated by an include.
    #[serde(default, skip_serializing)]
    pub category: Option<Category>,
}

impl Entity for Widget {
    type Key = Uuid;
    const COLLECTION: &'static str = "widgets";

    fn key(&self) -> Uuid {
        self.id
    }
}

pub fn widget(name: &str, price: i64) -> Widget {
    Widget {
        id: Uuid::new_v4(),
        name: name.to_string(),
        price,
        category_id: None,
        category: None,
    }
}

pub fn category(name: &str) -> Category {
    Category {
        id: Uuid::new_v4(),
        name: name.to_string(),
    }
}

pub fn include_category() -> Include<Widget> {
    Include::related::<Category, _>("category", |widget: &mut Widget, categories: &[Category]| {
        widget.category = categories
            .iter()
            .find(|c| Some(c.id) == widget.category_id)
            .cloned();
    })
}

/// An include that stalls for `pause` on every parent row, to hold a read
/// in flight while a test cancels it.
pub fn stalled_include(pause: Duration) -> Include<Widget> {
    Include::related::<Category, _>("stalled", move |_: &mut Widget, _: &[Category]| {
        std::thread::sleep(pause);
    })
}

/// A pool over a database file that lives as long as the returned value.
pub struct TestDb {
    _dir: TempDir,
    pub pool: ConnectionPool,
}

pub fn test_db() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_connection_pool(&ConnectionConfig::file(dir.path().join("test.db"))).unwrap();
    TestDb { _dir: dir, pool }
}
