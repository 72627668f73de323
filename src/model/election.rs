use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

use super::record::{Entity, RecordType};

/// Elections are keyed by an externally assigned string.
pub type ElectionId = String;

/// An election and its voting window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    /// Election unique ID.
    pub election_id: ElectionId,
    /// Election name.
    pub name: String,
    /// First instant at which votes are accepted.
    pub start_date: DateTime<Utc>,
    /// First instant at which votes are no longer accepted.
    pub end_date: DateTime<Utc>,
}

impl Election {
    /// Create a new election. The ID must be non-empty and the window must
    /// not be empty.
    pub fn new(
        name: impl Into<String>,
        election_id: impl Into<ElectionId>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let election_id = election_id.into();
        if election_id.is_empty() {
            return Err(ValidationError::InvalidElection);
        }
        if start_date >= end_date {
            return Err(ValidationError::InvalidWindow);
        }

        Ok(Self {
            election_id,
            name: name.into(),
            start_date,
            end_date,
        })
    }

    /// Is the election accepting votes at `now`?
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now < self.end_date
    }
}

impl Entity for Election {
    const TYPE: RecordType = RecordType::Election;

    fn key(&self) -> &str {
        &self.election_id
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::TimeZone;

    use super::*;

    impl Election {
        /// `E1`, open for the whole of 3 November 2020 (UTC).
        pub fn example() -> Self {
            Self::new(
                "Test Election 1",
                "E1",
                Utc.with_ymd_and_hms(2020, 11, 3, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2020, 11, 4, 0, 0, 0).unwrap(),
            )
            .unwrap()
        }

        /// `E2`, a week later than `E1`.
        pub fn example2() -> Self {
            Self::new(
                "Test Election 2",
                "E2",
                Utc.with_ymd_and_hms(2020, 11, 10, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2020, 11, 11, 0, 0, 0).unwrap(),
            )
            .unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn empty_id_is_rejected() {
        let start = Utc.with_ymd_and_hms(2020, 11, 3, 0, 0, 0).unwrap();
        let result = Election::new("Nameless", "", start, start + Duration::days(1));
        assert_eq!(result, Err(ValidationError::InvalidElection));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let start = Utc.with_ymd_and_hms(2020, 11, 3, 0, 0, 0).unwrap();
        let result = Election::new("Backwards", "E9", start, start - Duration::hours(1));
        assert_eq!(result, Err(ValidationError::InvalidWindow));

        let result = Election::new("Instant", "E9", start, start);
        assert_eq!(result, Err(ValidationError::InvalidWindow));
    }

    #[test]
    fn window_is_half_open() {
        let election = Election::example();
        assert!(!election.is_open(election.start_date - Duration::seconds(1)));
        assert!(election.is_open(election.start_date));
        assert!(election.is_open(election.end_date - Duration::seconds(1)));
        assert!(!election.is_open(election.end_date));
    }

    #[test]
    fn serializes_with_camel_case_dates() {
        let json = serde_json::to_value(Election::example()).unwrap();
        assert_eq!(json["electionId"], "E1");
        assert_eq!(json["startDate"], "2020-11-03T00:00:00Z");
        assert_eq!(json["endDate"], "2020-11-04T00:00:00Z");
    }
}
