use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::{
    ballot::BallotId,
    election::{Election, ElectionId},
    record::{Entity, RecordType},
};

/// Voters are keyed by an externally assigned string, e.g. a licence number.
pub type VoterId = String;

/// A registered voter, as stored in the world state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    /// Voter unique ID.
    pub voter_id: VoterId,
    /// The registrar that registered this voter.
    pub registrar_id: String,
    /// The election this voter is registered for.
    pub election_id: ElectionId,
    pub first_name: String,
    pub last_name: String,
    /// The voter's ballot, once issued.
    #[serde(default)]
    pub ballot: Option<BallotId>,
    #[serde(default)]
    pub ballot_created: bool,
    /// Authoritative record of whether this voter has voted.
    #[serde(default)]
    pub ballot_cast: bool,
}

impl Voter {
    /// Create a new voter for the given election, with no ballot.
    pub fn new(
        voter_id: impl Into<VoterId>,
        registrar_id: impl Into<String>,
        election: &Election,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let voter_id = voter_id.into();
        let registrar_id = registrar_id.into();
        if voter_id.is_empty() {
            return Err(ValidationError::InvalidVoter);
        }
        if registrar_id.is_empty() {
            return Err(ValidationError::InvalidRegistrar);
        }
        // Elections can also arrive by deserialization, bypassing `Election::new`.
        if election.election_id.is_empty() {
            return Err(ValidationError::InvalidElection);
        }

        Ok(Self {
            voter_id,
            registrar_id,
            election_id: election.election_id.clone(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            ballot: None,
            ballot_created: false,
            ballot_cast: false,
        })
    }

    /// Attach an issued ballot to this voter.
    pub(crate) fn assign_ballot(&mut self, ballot_id: BallotId) {
        debug_assert!(!self.ballot_created, "ballot issued twice");
        self.ballot = Some(ballot_id);
        self.ballot_created = true;
    }

    /// Record that this voter has cast their ballot.
    pub(crate) fn mark_cast(&mut self) {
        debug_assert!(self.ballot_created && !self.ballot_cast);
        self.ballot_cast = true;
    }
}

impl Entity for Voter {
    const TYPE: RecordType = RecordType::Voter;

    fn key(&self) -> &str {
        &self.voter_id
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_voter_has_no_ballot() {
        let voter = Voter::example(&Election::example());
        assert_eq!(voter.election_id, "E1");
        assert_eq!(voter.ballot, None);
        assert!(!voter.ballot_created);
        assert!(!voter.ballot_cast);
    }

    #[test]
    fn bad_ids_are_rejected() {
        let election = Election::example();
        let result = Voter::new("", "234", &election, "Rafael", "Villegas");
        assert_eq!(result, Err(ValidationError::InvalidVoter));

        let result = Voter::new("V1", "", &election, "Rafael", "Villegas");
        assert_eq!(result, Err(ValidationError::InvalidRegistrar));

        // Voter ID is checked first.
        let result = Voter::new("", "", &election, "Rafael", "Villegas");
        assert_eq!(result, Err(ValidationError::InvalidVoter));

        let mut nameless = election;
        nameless.election_id.clear();
        let result = Voter::new("V1", "234", &nameless, "Rafael", "Villegas");
        assert_eq!(result, Err(ValidationError::InvalidElection));
    }

    #[test]
    fn missing_flags_default_to_false() {
        let json = r#"{
            "voterId": "V7",
            "registrarId": "11",
            "electionId": "E1",
            "firstName": "Ana",
            "lastName": "Lopez"
        }"#;
        let voter: Voter = serde_json::from_str(json).unwrap();
        assert_eq!(voter.ballot, None);
        assert!(!voter.ballot_created);
        assert!(!voter.ballot_cast);
    }
}
