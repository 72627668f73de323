use std::sync::Arc;

use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Error, Rejection, Result, Verdict};
use crate::model::{
    decode, load, save, Ballot, Election, ElectionId, QueryRecord, RecordValue, Voter, VoterId,
};
use crate::store::{Selector, Transaction};

pub use seed::{PlannedVoter, SeedData, SeedPlan, VoterSeed};

mod seed;

/// Input to [`VoteContract::register_voter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterRegistration {
    pub voter_id: VoterId,
    pub registrar_id: String,
    pub election: Election,
    pub first_name: String,
    pub last_name: String,
}

/// Input to [`VoteContract::cast_vote`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVote {
    pub election_id: ElectionId,
    pub voter_id: VoterId,
}

/// The body of a record written by `create_vote`/`update_vote`.
#[derive(Debug, Serialize)]
struct VoteAsset<'a> {
    value: &'a serde_json::Value,
}

/// The election workflow. Every operation runs inside the caller's
/// transaction and leaves committing to the caller.
pub struct VoteContract {
    clock: Arc<dyn Clock>,
    seed: SeedData,
}

impl VoteContract {
    pub fn new(clock: Arc<dyn Clock>, seed: SeedData) -> Self {
        Self { clock, seed }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn seed(&self) -> &SeedData {
        &self.seed
    }

    /// Make sure the seed election and voters exist, and that every seed
    /// voter holds a ballot. Safe to repeat.
    pub async fn initialize(&self, ctx: &mut Transaction<'_>) -> Result<Vec<Voter>> {
        let plan = SeedPlan::prepare(ctx, &self.seed).await?;
        if plan.is_noop() {
            debug!("Seed data already present");
        }
        let SeedPlan {
            election,
            create_election,
            voters: planned,
        } = plan;

        if create_election {
            save(ctx, &election)?;
            info!("Created election {}", election.election_id);
        }

        let mut voters = Vec::with_capacity(planned.len());
        for PlannedVoter { mut voter, create } in planned {
            if create {
                save(ctx, &voter)?;
                info!("Created voter {}", voter.voter_id);
            }
            if !voter.ballot_created {
                if voter.election_id == election.election_id {
                    self.issue_ballot(ctx, &election, &mut voter).await?;
                } else {
                    warn!(
                        "Voter {} belongs to election {}, not issuing a ballot for {}",
                        voter.voter_id, voter.election_id, election.election_id
                    );
                }
            }
            voters.push(voter);
        }

        Ok(voters)
    }

    /// Issue `voter` their ballot for `election` and persist both.
    pub async fn issue_ballot(
        &self,
        ctx: &mut Transaction<'_>,
        election: &Election,
        voter: &mut Voter,
    ) -> Result<Ballot> {
        if voter.ballot_created {
            return Err(Error::DuplicateBallot(voter.voter_id.clone()));
        }
        let ballot = Ballot::issue(ctx, election, &voter.voter_id).await?;
        voter.assign_ballot(ballot.ballot_id.clone());

        save(ctx, &ballot)?;
        save(ctx, &*voter)?;
        info!(
            "Issued ballot {} to voter {}",
            ballot.ballot_id, voter.voter_id
        );
        Ok(ballot)
    }

    /// Register a new voter and, if their election exists, issue a ballot.
    ///
    /// The voter is stored even when the election is missing. Registering an
    /// ID that is already taken fails, so existing ballots and votes are
    /// never reset.
    pub async fn register_voter(
        &self,
        ctx: &mut Transaction<'_>,
        registration: VoterRegistration,
    ) -> Result<Verdict<String>> {
        let VoterRegistration {
            voter_id,
            registrar_id,
            election,
            first_name,
            last_name,
        } = registration;
        let mut voter = Voter::new(voter_id, registrar_id, &election, first_name, last_name)?;

        if self.vote_exists(ctx, &voter.voter_id).await? {
            return Err(Error::AlreadyExists(format!("voter {}", voter.voter_id)));
        }
        save(ctx, &voter)?;

        let Some(election) = find_election(ctx, &voter.election_id).await? else {
            warn!(
                "Registered voter {} for missing election {}",
                voter.voter_id, voter.election_id
            );
            return Ok(Err(Rejection::ElectionNotFound));
        };

        self.issue_ballot(ctx, &election, &mut voter).await?;
        Ok(Ok(format!(
            "voter with voterId {} has been successfully registered",
            voter.voter_id
        )))
    }

    /// Mark a voter's ballot as cast, if the election is open and they have
    /// not voted yet.
    pub async fn cast_vote(
        &self,
        ctx: &mut Transaction<'_>,
        election_id: &str,
        voter_id: &str,
    ) -> Result<Verdict<String>> {
        let election = match load::<Election>(ctx, election_id).await? {
            Some(election) => election,
            None => {
                warn!("Vote by {voter_id} for missing election {election_id}");
                return Ok(Err(Rejection::ElectionNotFound));
            }
        };
        let mut voter = load::<Voter>(ctx, voter_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Voter with ID '{voter_id}'")))?;

        let now = self.clock.now();
        let refusal = if voter.election_id != election.election_id {
            Some(Rejection::WrongElection)
        } else if voter.ballot_cast {
            Some(Rejection::AlreadyVoted)
        } else if !voter.ballot_created {
            Some(Rejection::NoBallot)
        } else if !election.is_open(now) {
            Some(Rejection::ElectionClosed)
        } else {
            None
        };
        if let Some(rejection) = refusal {
            warn!("Refused vote by {voter_id} in {election_id} at {now}: {rejection}");
            return Ok(Err(rejection));
        }

        voter.mark_cast();
        save(ctx, &voter)?;
        info!("Voter {voter_id} voted in {election_id}");
        Ok(Ok(format!(
            "voter with voterId {} has successfully voted",
            voter.voter_id
        )))
    }

    /// Every record whose `type` is `object_type`, in key order.
    pub async fn query_by_type(
        &self,
        ctx: &Transaction<'_>,
        object_type: &str,
    ) -> Result<Vec<QueryRecord>> {
        let mut results = ctx
            .get_query_result(&Selector::by_type(object_type))
            .await?;

        let mut records = Vec::new();
        while let Some(kv) = results.try_next().await? {
            if kv.value.is_empty() {
                continue;
            }
            records.push(QueryRecord {
                record: RecordValue::from_bytes(&kv.value),
                key: kv.key,
            });
        }
        debug!("{} records of type {object_type}", records.len());
        Ok(records)
    }

    /// Is there a non-empty record under `id`?
    pub async fn vote_exists(&self, ctx: &Transaction<'_>, id: &str) -> Result<bool> {
        Ok(ctx
            .get_state(id)
            .await?
            .map_or(false, |bytes| !bytes.is_empty()))
    }

    /// The record under `id`, parsed as JSON where possible.
    pub async fn read_vote(&self, ctx: &Transaction<'_>, id: &str) -> Result<Verdict<RecordValue>> {
        match ctx.get_state(id).await? {
            Some(bytes) if !bytes.is_empty() => Ok(Ok(RecordValue::from_bytes(&bytes))),
            _ => Ok(Err(Rejection::RecordNotFound(id.to_string()))),
        }
    }

    /// Store `{"value": value}` under a fresh key.
    pub async fn create_vote(
        &self,
        ctx: &mut Transaction<'_>,
        id: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        if self.vote_exists(ctx, id).await? {
            return Err(Error::AlreadyExists(format!("The vote {id} already exists")));
        }
        ctx.put_state(id, serde_json::to_vec(&VoteAsset { value })?);
        Ok(())
    }

    /// Replace the record under an existing key with `{"value": value}`.
    pub async fn update_vote(
        &self,
        ctx: &mut Transaction<'_>,
        id: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        if !self.vote_exists(ctx, id).await? {
            return Err(Error::missing_asset(id));
        }
        ctx.put_state(id, serde_json::to_vec(&VoteAsset { value })?);
        Ok(())
    }

    /// Remove the record under `id`.
    pub async fn delete_vote(&self, ctx: &mut Transaction<'_>, id: &str) -> Result<()> {
        if !self.vote_exists(ctx, id).await? {
            return Err(Error::missing_asset(id));
        }
        ctx.delete_state(id);
        info!("Deleted record {id}");
        Ok(())
    }
}

/// The election stored under `id`. A record of any other kind counts as
/// missing.
async fn find_election(ctx: &Transaction<'_>, id: &str) -> Result<Option<Election>> {
    Ok(match ctx.get_state(id).await? {
        Some(bytes) => decode::<Election>(id, &bytes).ok(),
        None => None,
    })
}
