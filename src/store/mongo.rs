use std::collections::BTreeMap;

use mongodb::{
    bson::{doc, spec::BinarySubtype, Binary, Document},
    error::Error as DbError,
    options::{FindOptions, ReplaceOptions},
    Client, Collection, Database, IndexModel,
};
use rocket::futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::{KeyValue, ResultsIterator, Selector, Write, WorldState, WriteSet};

/// The collection holding every world state record.
const COLLECTION: &str = "world_state";

/// One world state record, as stored in MongoDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(rename = "_id")]
    pub key: String,
    /// The record bytes, untouched.
    pub value: Binary,
    /// Top-level string fields of the record, so selectors can run server-side.
    pub fields: BTreeMap<String, String>,
}

impl StateDocument {
    pub fn new(key: String, value: Vec<u8>) -> Self {
        let fields = selector_fields(&value);
        Self {
            key,
            value: Binary {
                subtype: BinarySubtype::Generic,
                bytes: value,
            },
            fields,
        }
    }

    fn into_key_value(self) -> KeyValue {
        KeyValue {
            key: self.key,
            value: self.value.bytes,
        }
    }
}

/// Extract the fields a selector may filter on. Keys MongoDB would treat
/// specially are skipped.
fn selector_fields(record: &[u8]) -> BTreeMap<String, String> {
    match serde_json::from_slice::<serde_json::Value>(record) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .filter(|(key, _)| !key.starts_with('$') && !key.contains('.'))
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key, s)),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn selector_filter(selector: &Selector) -> Document {
    let mut filter = Document::new();
    filter.insert(format!("fields.{}", selector.field()), selector.value());
    filter
}

/// A world state kept in a single MongoDB collection.
///
/// Commits run inside a client-session transaction, which requires the
/// server to be part of a replica set.
pub struct MongoWorldState {
    client: Client,
    records: Collection<StateDocument>,
}

impl MongoWorldState {
    pub fn new(client: Client, db: &Database) -> Self {
        Self {
            client,
            records: db.collection(COLLECTION),
        }
    }
}

#[rocket::async_trait]
impl WorldState for MongoWorldState {
    async fn get_state(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let got = self.records.find_one(doc! { "_id": key }, None).await?;
        debug!("MongoWorldState::get_state: key={key}, found={}", got.is_some());
        Ok(got.map(|document| document.value.bytes))
    }

    async fn get_query_result(&self, selector: &Selector) -> Result<ResultsIterator<'static>> {
        debug!(
            "MongoWorldState::get_query_result: {}={}",
            selector.field(),
            selector.value()
        );
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let cursor = self.records.find(selector_filter(selector), options).await?;
        Ok(cursor
            .map_ok(StateDocument::into_key_value)
            .map_err(Error::from)
            .boxed())
    }

    async fn apply(&self, writes: WriteSet) -> Result<()> {
        debug!("MongoWorldState::apply: {} writes", writes.len());
        // Dropping the session before commit aborts the transaction.
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        for (key, write) in writes {
            match write {
                Write::Put(value) => {
                    let document = StateDocument::new(key, value);
                    let options = ReplaceOptions::builder().upsert(true).build();
                    self.records
                        .replace_one_with_session(
                            doc! { "_id": document.key.as_str() },
                            &document,
                            options,
                            &mut session,
                        )
                        .await?;
                }
                Write::Delete => {
                    self.records
                        .delete_one_with_session(doc! { "_id": key.as_str() }, None, &mut session)
                        .await?;
                }
            }
        }

        session.commit_transaction().await?;
        Ok(())
    }
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> std::result::Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let type_index = IndexModel::builder()
        .keys(doc! { "fields.type": 1 })
        .build();
    db.collection::<StateDocument>(COLLECTION)
        .create_index(type_index, None)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::clock::SimulatedClock;
    use crate::store::Transaction;
    use crate::workflow::{SeedData, VoteContract};

    use super::*;

    fn put(key: &str, value: &[u8]) -> (String, Write) {
        (key.to_string(), Write::Put(value.to_vec()))
    }

    async fn keys_of_type(world_state: &MongoWorldState, object_type: &str) -> Vec<String> {
        world_state
            .get_query_result(&Selector::by_type(object_type))
            .await
            .unwrap()
            .map_ok(|kv| kv.key)
            .try_collect()
            .await
            .unwrap()
    }

    #[db_test]
    async fn put_get_and_delete(world_state: MongoWorldState) {
        let record = br#"{"type":"voter","voterId":"V1"}"#;
        world_state.apply(WriteSet::from([put("V1", record)])).await.unwrap();
        assert_eq!(world_state.get_state("V1").await.unwrap(), Some(record.to_vec()));
        assert_eq!(world_state.get_state("V9").await.unwrap(), None);

        // Raw bytes come back untouched.
        world_state.apply(WriteSet::from([put("raw", b"\x00 not json")])).await.unwrap();
        assert_eq!(
            world_state.get_state("raw").await.unwrap(),
            Some(b"\x00 not json".to_vec())
        );

        let mut writes = WriteSet::new();
        writes.insert("V1".to_string(), Write::Delete);
        world_state.apply(writes).await.unwrap();
        assert_eq!(world_state.get_state("V1").await.unwrap(), None);
    }

    #[db_test]
    async fn selector_sorts_by_key(world_state: MongoWorldState) {
        // Separate commits, so insertion order differs from key order.
        world_state
            .apply(WriteSet::from([put("V2", br#"{"type":"voter"}"#)]))
            .await
            .unwrap();
        world_state
            .apply(WriteSet::from([put("B1", br#"{"type":"ballot"}"#)]))
            .await
            .unwrap();
        world_state
            .apply(WriteSet::from([put("V1", br#"{"type":"voter"}"#)]))
            .await
            .unwrap();

        assert_eq!(keys_of_type(&world_state, "voter").await, vec!["V1", "V2"]);
        assert_eq!(keys_of_type(&world_state, "ballot").await, vec!["B1"]);
        assert!(keys_of_type(&world_state, "election").await.is_empty());
    }

    #[db_test]
    async fn apply_is_all_or_nothing(world_state: MongoWorldState, db: Database) {
        world_state
            .apply(WriteSet::from([
                put("a", br#"{"type":"voter"}"#),
                put("b", br#"{"type":"voter"}"#),
            ]))
            .await
            .unwrap();
        let records = db.collection::<StateDocument>(COLLECTION);
        assert_eq!(records.count_documents(None, None).await.unwrap(), 2);

        // The last write is over the document size limit, so the others
        // must not land either.
        let oversized = vec![b'x'; 17 * 1024 * 1024];
        let mut writes = WriteSet::from([put("a", br#"{"type":"ballot"}"#)]);
        writes.insert("b".to_string(), Write::Delete);
        writes.insert("c".to_string(), Write::Put(oversized));
        assert!(world_state.apply(writes).await.is_err());

        assert_eq!(
            world_state.get_state("a").await.unwrap(),
            Some(br#"{"type":"voter"}"#.to_vec())
        );
        assert!(world_state.get_state("b").await.unwrap().is_some());
        assert_eq!(world_state.get_state("c").await.unwrap(), None);
        assert_eq!(records.count_documents(None, None).await.unwrap(), 2);
    }

    #[db_test]
    async fn contract_runs_on_mongodb(world_state: MongoWorldState) {
        let seed = SeedData::default();
        let clock = SimulatedClock::new(seed.election.start_date);
        let contract = VoteContract::new(Arc::new(clock), seed);

        let mut ctx = Transaction::new(&world_state);
        contract.initialize(&mut ctx).await.unwrap();
        ctx.commit().await.unwrap();

        let mut ctx = Transaction::new(&world_state);
        let verdict = contract.cast_vote(&mut ctx, "1234", "V2").await.unwrap();
        assert!(verdict.is_ok());
        ctx.commit().await.unwrap();

        let ctx = Transaction::new(&world_state);
        let voters = contract.query_by_type(&ctx, "voter").await.unwrap();
        let keys = voters.iter().map(|r| r.key.as_str()).collect::<Vec<_>>();
        assert_eq!(keys, vec!["V1", "V2"]);
        assert_eq!(contract.query_by_type(&ctx, "ballot").await.unwrap().len(), 2);
    }

    #[test]
    fn only_string_fields_are_indexed() {
        let document = StateDocument::new(
            "V1".to_string(),
            br#"{"type":"voter","voterId":"V1","ballotCast":false,"a.b":"x","$set":"y"}"#.to_vec(),
        );
        let expected = BTreeMap::from([
            ("type".to_string(), "voter".to_string()),
            ("voterId".to_string(), "V1".to_string()),
        ]);
        assert_eq!(document.fields, expected);
        assert_eq!(document.into_key_value().key, "V1");
    }

    #[test]
    fn raw_records_have_no_fields() {
        let document = StateDocument::new("k".to_string(), b"plain text".to_vec());
        assert!(document.fields.is_empty());
        assert_eq!(document.value.bytes, b"plain text".to_vec());
    }

    #[test]
    fn selectors_target_extracted_fields() {
        let filter = selector_filter(&Selector::by_type("ballot"));
        assert_eq!(filter, doc! { "fields.type": "ballot" });
    }
}
