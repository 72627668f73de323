use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::store::Transaction;

use super::{
    election::{Election, ElectionId},
    record::{load, Entity, RecordType},
    voter::{Voter, VoterId},
};

/// Ballot IDs are lowercase hex SHA-256 digests.
pub type BallotId = String;

/// A voter's single ballot for an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    /// Ballot unique ID, derived from the election and voter IDs.
    pub ballot_id: BallotId,
    pub election_id: ElectionId,
    pub voter_id: VoterId,
}

impl Ballot {
    /// Derive the ID of the ballot belonging to `voter_id` in `election_id`.
    ///
    /// The IDs are separated by a NUL byte so that no two distinct pairs
    /// hash the same input.
    pub fn derive_id(election_id: &str, voter_id: &str) -> BallotId {
        let mut hasher = Sha256::new();
        hasher.update(election_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(voter_id.as_bytes());
        HEXLOWER.encode(&hasher.finalize())
    }

    /// Create the ballot for a registered voter.
    ///
    /// Fails if the voter is not in the world state, belongs to another
    /// election, has already been issued a ballot, or if their ballot record
    /// already exists.
    pub async fn issue(ctx: &Transaction<'_>, election: &Election, voter_id: &str) -> Result<Self> {
        let voter = load::<Voter>(ctx, voter_id)
            .await?
            .ok_or_else(|| Error::UnregisteredVoter(voter_id.to_string()))?;
        if voter.election_id != election.election_id {
            return Err(Error::ElectionMismatch {
                voter: voter_id.to_string(),
                registered: voter.election_id,
                requested: election.election_id.clone(),
            });
        }
        if voter.ballot_created {
            return Err(Error::DuplicateBallot(voter_id.to_string()));
        }

        let ballot_id = Self::derive_id(&election.election_id, voter_id);
        if ctx.get_state(&ballot_id).await?.is_some() {
            return Err(Error::DuplicateBallot(voter_id.to_string()));
        }

        Ok(Self {
            ballot_id,
            election_id: election.election_id.clone(),
            voter_id: voter_id.to_string(),
        })
    }
}

impl Entity for Ballot {
    const TYPE: RecordType = RecordType::Ballot;

    fn key(&self) -> &str {
        &self.ballot_id
    }
}
