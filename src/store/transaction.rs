use std::iter::Peekable;
use std::vec;

use rocket::futures::{future, stream, stream::Fuse, StreamExt, TryStreamExt};
use rocket::tokio::sync::MutexGuard;

use crate::error::Result;

use super::{KeyValue, ResultsIterator, Selector, WorldState, Write, WriteSet};

/// One unit of work against the world state.
///
/// Writes are buffered and only reach the world state on [`commit`](Self::commit).
/// Reads see this transaction's own pending writes layered over the committed
/// state. Dropping a transaction without committing discards its writes.
pub struct Transaction<'a> {
    state: &'a dyn WorldState,
    writes: WriteSet,
    /// Held for the lifetime of the transaction when the host serializes them.
    _permit: Option<MutexGuard<'a, ()>>,
}

impl<'a> Transaction<'a> {
    /// Start an unserialized transaction. Callers must ensure no conflicting
    /// transaction runs concurrently.
    pub fn new(state: &'a dyn WorldState) -> Self {
        Self {
            state,
            writes: WriteSet::new(),
            _permit: None,
        }
    }

    /// Start a transaction that holds `permit` until it is committed or dropped.
    pub(crate) fn serialized(state: &'a dyn WorldState, permit: MutexGuard<'a, ()>) -> Self {
        Self {
            state,
            writes: WriteSet::new(),
            _permit: Some(permit),
        }
    }

    /// Read the record under `key`, including this transaction's writes.
    pub async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(Write::Put(value)) => Ok(Some(value.clone())),
            Some(Write::Delete) => Ok(None),
            None => self.state.get_state(key).await,
        }
    }

    /// Stage `value` under `key`.
    pub fn put_state(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.insert(key.into(), Write::Put(value));
    }

    /// Stage the removal of `key`.
    pub fn delete_state(&mut self, key: impl Into<String>) {
        self.writes.insert(key.into(), Write::Delete);
    }

    /// Stream every record matching `selector` in key order, with this
    /// transaction's writes merged over the committed records.
    pub async fn get_query_result(&self, selector: &Selector) -> Result<ResultsIterator<'_>> {
        let writes = &self.writes;
        let committed = self
            .state
            .get_query_result(selector)
            .await?
            .try_filter(move |kv| future::ready(!writes.contains_key(&kv.key)))
            .boxed()
            .fuse();
        // `WriteSet` iterates in key order, so this is already sorted.
        let pending = writes
            .iter()
            .filter_map(|(key, write)| match write {
                Write::Put(value) if selector.matches(value) => Some(KeyValue {
                    key: key.clone(),
                    value: value.clone(),
                }),
                _ => None,
            })
            .collect::<Vec<_>>()
            .into_iter()
            .peekable();

        let merge = Merge {
            committed,
            pending,
            held: None,
        };
        Ok(stream::unfold(merge, |mut merge| async move {
            if merge.held.is_none() {
                match merge.committed.try_next().await {
                    Ok(next) => merge.held = next,
                    Err(e) => return Some((Err(e), merge)),
                }
            }
            let pending_first = match (&merge.held, merge.pending.peek()) {
                (Some(held), Some(pending)) => pending.key < held.key,
                (None, Some(_)) => true,
                (_, None) => false,
            };
            let next = if pending_first {
                merge.pending.next()
            } else {
                merge.held.take()
            };
            next.map(|kv| (Ok(kv), merge))
        })
        .boxed())
    }

    /// The writes staged so far.
    pub fn writes(&self) -> &WriteSet {
        &self.writes
    }

    /// Apply every staged write atomically.
    pub async fn commit(mut self) -> Result<()> {
        let writes = std::mem::take(&mut self.writes);
        if writes.is_empty() {
            return Ok(());
        }
        debug!("Committing {} writes", writes.len());
        self.state.apply(writes).await
    }
}

/// State of the merge in [`Transaction::get_query_result`].
struct Merge<'a> {
    committed: Fuse<ResultsIterator<'a>>,
    pending: Peekable<vec::IntoIter<KeyValue>>,
    /// The next committed record, once read.
    held: Option<KeyValue>,
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.writes.is_empty() {
            debug!("Discarding {} uncommitted writes", self.writes.len());
        }
    }
}
