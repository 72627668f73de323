use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder};
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;
use thiserror::Error;

use crate::model::RecordType;

pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures. Any of these aborts the enclosing transaction.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerdeError),
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("the voter {0} is not registered")]
    UnregisteredVoter(String),
    #[error("a ballot has already been created for voter {0}")]
    DuplicateBallot(String),
    #[error("voter {voter} is registered for election {registered}, not {requested}")]
    ElectionMismatch {
        voter: String,
        registered: String,
        requested: String,
    },
    #[error("record {key} is a {found}, expected a {expected}")]
    RecordType {
        key: String,
        expected: RecordType,
        found: String,
    },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// The message used by the record operations when a key is absent.
    pub fn missing_asset(id: &str) -> Self {
        Self::NotFound(format!("The asset {id} does not exist!"))
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = match self {
            Self::Db(_) | Self::Serialization(_) => Status::InternalServerError,
            Self::Validation(_) => Status::BadRequest,
            Self::NotFound(_) | Self::UnregisteredVoter(_) => Status::NotFound,
            Self::AlreadyExists(_) | Self::DuplicateBallot(_) | Self::ElectionMismatch { .. } => {
                Status::Conflict
            }
            Self::RecordType { .. } => Status::UnprocessableEntity,
        };
        if status == Status::InternalServerError {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        Err(status)
    }
}

/// Bad construction input for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("not a valid election!")]
    InvalidElection,
    #[error("the election must start before it ends")]
    InvalidWindow,
    #[error("the voterId is not valid.")]
    InvalidVoter,
    #[error("the registrarId is not valid.")]
    InvalidRegistrar,
}

/// Business-rule failures. These are relayed to the caller as `{"error": ...}`
/// and do not roll back the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("the election does not exist!")]
    ElectionNotFound,
    #[error("this voter has already cast this ballot!")]
    AlreadyVoted,
    #[error("the election is not open right now!")]
    ElectionClosed,
    #[error("this voter has not been issued a ballot!")]
    NoBallot,
    #[error("this voter is not registered for this election!")]
    WrongElection,
    #[error("The asset {0} does not exist!")]
    RecordNotFound(String),
}

/// The result of an operation that may be refused on business grounds.
pub type Verdict<T> = std::result::Result<T, Rejection>;

/// The wire form of a [`Verdict`]: the value itself, or `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Rejected { error: String },
    Accepted(T),
}

impl<T> From<Verdict<T>> for Reply<T> {
    fn from(verdict: Verdict<T>) -> Self {
        match verdict {
            Ok(value) => Self::Accepted(value),
            Err(rejection) => Self::Rejected {
                error: rejection.to_string(),
            },
        }
    }
}
