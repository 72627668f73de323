use chrono::{Duration, TimeZone, Utc};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{decode, load, Election, RecordType, Voter, VoterId};
use crate::store::{Selector, Transaction};

/// Baseline data that `initialize` ensures exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedData {
    /// Created only if the world state holds no election at all.
    pub election: Election,
    /// Created if absent, registered for whichever election is used.
    pub voters: Vec<VoterSeed>,
}

impl Default for SeedData {
    fn default() -> Self {
        // Election day: 3 November 2020.
        let start_date = Utc.with_ymd_and_hms(2020, 11, 3, 0, 0, 0).unwrap(); // Infallible for UTC.
        Self {
            election: Election {
                election_id: "1234".to_string(),
                name: "Mejor profesor de la carrera".to_string(),
                start_date,
                end_date: start_date + Duration::days(1),
            },
            voters: vec![
                VoterSeed::new("V1", "234", "Rafael", "Villegas"),
                VoterSeed::new("V2", "345", "Isabela", "Muriel"),
            ],
        }
    }
}

/// A voter to seed; the election is filled in at planning time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterSeed {
    pub voter_id: VoterId,
    pub registrar_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl VoterSeed {
    pub fn new(
        voter_id: impl Into<VoterId>,
        registrar_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            voter_id: voter_id.into(),
            registrar_id: registrar_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// A seed voter and whether it still has to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedVoter {
    pub voter: Voter,
    pub create: bool,
}

/// What seeding would change, worked out without writing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedPlan {
    /// The election seed voters belong to.
    pub election: Election,
    /// Whether `election` still has to be written.
    pub create_election: bool,
    /// Seed voters in configured order.
    pub voters: Vec<PlannedVoter>,
}

impl SeedPlan {
    /// Compare `seed` against the world state. Existing voters are loaded,
    /// never rebuilt, so their ballots and votes survive.
    pub async fn prepare(ctx: &Transaction<'_>, seed: &SeedData) -> Result<Self> {
        let (election, create_election) = match first_election(ctx).await? {
            Some(election) => (election, false),
            None => {
                let election = Election::new(
                    seed.election.name.clone(),
                    seed.election.election_id.clone(),
                    seed.election.start_date,
                    seed.election.end_date,
                )?;
                (election, true)
            }
        };

        let mut voters = Vec::with_capacity(seed.voters.len());
        for seed_voter in &seed.voters {
            let planned = match load::<Voter>(ctx, &seed_voter.voter_id).await? {
                Some(voter) => PlannedVoter {
                    voter,
                    create: false,
                },
                None => PlannedVoter {
                    voter: Voter::new(
                        seed_voter.voter_id.clone(),
                        seed_voter.registrar_id.clone(),
                        &election,
                        seed_voter.first_name.clone(),
                        seed_voter.last_name.clone(),
                    )?,
                    create: true,
                },
            };
            voters.push(planned);
        }

        Ok(Self {
            election,
            create_election,
            voters,
        })
    }

    /// True when applying the plan would write nothing.
    pub fn is_noop(&self) -> bool {
        !self.create_election
            && self
                .voters
                .iter()
                .all(|planned| !planned.create && planned.voter.ballot_created)
    }
}

/// The first election record in key order, if any.
async fn first_election(ctx: &Transaction<'_>) -> Result<Option<Election>> {
    let selector = Selector::by_type(RecordType::Election.as_str());
    let mut elections = ctx.get_query_result(&selector).await?;
    match elections.try_next().await? {
        Some(kv) => Ok(Some(decode::<Election>(&kv.key, &kv.value)?)),
        None => Ok(None),
    }
}
