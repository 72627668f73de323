use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rocket::futures::{stream, StreamExt};

use crate::error::Result;

use super::{KeyValue, ResultsIterator, Selector, Write, WorldState, WriteSet};

/// An in-memory world state. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorldState {
    records: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryWorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of every committed record.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // Inserts and removes do not panic, so a poisoned map is still whole.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[rocket::async_trait]
impl WorldState for MemoryWorldState {
    async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let got = self.lock().get(key).cloned();
        debug!("MemoryWorldState::get_state: key={key}, found={}", got.is_some());
        Ok(got)
    }

    async fn get_query_result(&self, selector: &Selector) -> Result<ResultsIterator<'static>> {
        let matching = self
            .lock()
            .iter()
            .filter(|(_, value)| selector.matches(value))
            .map(|(key, value)| {
                Ok(KeyValue {
                    key: key.clone(),
                    value: value.clone(),
                })
            })
            .collect::<Vec<_>>();
        debug!(
            "MemoryWorldState::get_query_result: {}={}, matched={}",
            selector.field(),
            selector.value(),
            matching.len()
        );
        Ok(stream::iter(matching).boxed())
    }

    async fn apply(&self, writes: WriteSet) -> Result<()> {
        debug!("MemoryWorldState::apply: {} writes", writes.len());
        let mut records = self.lock();
        for (key, write) in writes {
            match write {
                Write::Put(value) => {
                    records.insert(key, value);
                }
                Write::Delete => {
                    records.remove(&key);
                }
            }
        }
        Ok(())
    }
}
