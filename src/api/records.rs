use rocket::{serde::json::Json, FromForm, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::{Reply, Result};
use crate::ledger::Ledger;
use crate::logging::RequestId;
use crate::model::{QueryRecord, RecordValue};

pub fn routes() -> Vec<Route> {
    routes![
        query_by_type,
        read_vote,
        vote_exists,
        create_vote,
        update_vote,
        delete_vote,
    ]
}

/// Query string of a selector query, e.g. `?type=voter`.
#[derive(Debug, FromForm)]
struct RecordQuery<'r> {
    #[field(name = "type")]
    object_type: &'r str,
}

/// Body of a create or update.
#[derive(Debug, Serialize, Deserialize)]
struct VoteValue {
    value: serde_json::Value,
}

#[get("/records?<query..>")]
async fn query_by_type(
    query: RecordQuery<'_>,
    ledger: &State<Ledger>,
) -> Result<Json<Vec<QueryRecord>>> {
    let tx = ledger.begin().await;
    let records = ledger
        .contract()
        .query_by_type(&tx, query.object_type)
        .await?;
    Ok(Json(records))
}

#[get("/records/<key>")]
async fn read_vote(key: &str, ledger: &State<Ledger>) -> Result<Json<Reply<RecordValue>>> {
    let tx = ledger.begin().await;
    let verdict = ledger.contract().read_vote(&tx, key).await?;
    Ok(Json(verdict.into()))
}

#[get("/records/<key>/exists")]
async fn vote_exists(key: &str, ledger: &State<Ledger>) -> Result<Json<bool>> {
    let tx = ledger.begin().await;
    let exists = ledger.contract().vote_exists(&tx, key).await?;
    Ok(Json(exists))
}

#[post("/records/<key>", data = "<body>", format = "json")]
async fn create_vote(
    id: &RequestId,
    key: &str,
    body: Json<VoteValue>,
    ledger: &State<Ledger>,
) -> Result<()> {
    let mut tx = ledger.begin().await;
    ledger.contract().create_vote(&mut tx, key, &body.value).await?;
    tx.commit().await?;
    debug!("{id} created record {key}");
    Ok(())
}

#[put("/records/<key>", data = "<body>", format = "json")]
async fn update_vote(
    id: &RequestId,
    key: &str,
    body: Json<VoteValue>,
    ledger: &State<Ledger>,
) -> Result<()> {
    let mut tx = ledger.begin().await;
    ledger.contract().update_vote(&mut tx, key, &body.value).await?;
    tx.commit().await?;
    debug!("{id} updated record {key}");
    Ok(())
}

#[delete("/records/<key>")]
async fn delete_vote(key: &str, ledger: &State<Ledger>) -> Result<()> {
    let mut tx = ledger.begin().await;
    ledger.contract().delete_vote(&mut tx, key).await?;
    tx.commit().await?;
    Ok(())
}
