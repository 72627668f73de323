use std::collections::BTreeMap;

use rocket::futures::stream::BoxStream;

use crate::error::Result;

pub use memory::MemoryWorldState;
pub use mongo::{ensure_indexes_exist, MongoWorldState};
pub use transaction::Transaction;

mod memory;
mod mongo;
mod transaction;

/// A single key/record pair yielded by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: Vec<u8>,
}

/// A lazy sequence of query results. Dropping it closes the underlying cursor.
pub type ResultsIterator<'a> = BoxStream<'a, Result<KeyValue>>;

/// A pending change to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Put(Vec<u8>),
    Delete,
}

/// All the changes made by one transaction, by key.
pub type WriteSet = BTreeMap<String, Write>;

/// A field-equality predicate over JSON records, e.g. `{type = "voter"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    field: String,
    value: String,
}

impl Selector {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Select every record with the given `type` discriminator.
    pub fn by_type(object_type: impl Into<String>) -> Self {
        Self::new("type", object_type)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Does the record match? Records that are not JSON objects never match.
    pub fn matches(&self, record: &[u8]) -> bool {
        serde_json::from_slice::<serde_json::Value>(record)
            .ok()
            .and_then(|json| {
                json.get(&self.field)
                    .and_then(|v| v.as_str())
                    .map(|v| v == self.value)
            })
            .unwrap_or(false)
    }
}

/// The durable key-value store that backs every transaction.
///
/// Implementations only need to provide committed reads and an atomic
/// apply; buffering and read-your-writes live in [`Transaction`].
#[rocket::async_trait]
pub trait WorldState: Send + Sync {
    /// Read the committed record under `key`.
    async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stream every committed record matching `selector`, in key order.
    async fn get_query_result(&self, selector: &Selector) -> Result<ResultsIterator<'static>>;

    /// Apply a transaction's writes. Either all of them become visible or
    /// none do.
    async fn apply(&self, writes: WriteSet) -> Result<()>;
}
