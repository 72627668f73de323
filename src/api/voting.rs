use rocket::{serde::json::Json, Route, State};

use crate::error::{Error, Reply, Result, Verdict};
use crate::ledger::Ledger;
use crate::logging::RequestId;
use crate::model::{load, Ballot, Election, Voter};
use crate::workflow::{CastVote, VoterRegistration};

pub fn routes() -> Vec<Route> {
    routes![initialize, register_voter, issue_ballot, cast_vote]
}

#[post("/initialize")]
async fn initialize(id: &RequestId, ledger: &State<Ledger>) -> Result<Json<Vec<Voter>>> {
    let mut tx = ledger.begin().await;
    let voters = ledger.contract().initialize(&mut tx).await?;
    tx.commit().await?;

    debug!("{id} seeded {} voters", voters.len());
    Ok(Json(voters))
}

#[post("/voters", data = "<registration>", format = "json")]
async fn register_voter(
    id: &RequestId,
    registration: Json<VoterRegistration>,
    ledger: &State<Ledger>,
) -> Result<Json<Reply<String>>> {
    let mut tx = ledger.begin().await;
    let verdict = ledger
        .contract()
        .register_voter(&mut tx, registration.into_inner())
        .await?;
    // Rejections still commit: the voter is kept even without a ballot.
    tx.commit().await?;

    debug!("{id} registration {}", verdict_label(&verdict));
    Ok(Json(verdict.into()))
}

#[post("/elections/<election_id>/voters/<voter_id>/ballot")]
async fn issue_ballot(
    id: &RequestId,
    election_id: &str,
    voter_id: &str,
    ledger: &State<Ledger>,
) -> Result<Json<Ballot>> {
    let mut tx = ledger.begin().await;
    let election = load::<Election>(&tx, election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))?;
    let mut voter = load::<Voter>(&tx, voter_id)
        .await?
        .ok_or_else(|| Error::UnregisteredVoter(voter_id.to_string()))?;

    let ballot = ledger
        .contract()
        .issue_ballot(&mut tx, &election, &mut voter)
        .await?;
    tx.commit().await?;

    debug!("{id} issued ballot {}", ballot.ballot_id);
    Ok(Json(ballot))
}

#[post("/votes/cast", data = "<vote>", format = "json")]
async fn cast_vote(
    id: &RequestId,
    vote: Json<CastVote>,
    ledger: &State<Ledger>,
) -> Result<Json<Reply<String>>> {
    let mut tx = ledger.begin().await;
    let verdict = ledger
        .contract()
        .cast_vote(&mut tx, &vote.election_id, &vote.voter_id)
        .await?;
    tx.commit().await?;

    debug!("{id} vote {}", verdict_label(&verdict));
    Ok(Json(verdict.into()))
}

fn verdict_label<T>(verdict: &Verdict<T>) -> &'static str {
    if verdict.is_ok() {
        "accepted"
    } else {
        "rejected"
    }
}
