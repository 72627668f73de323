pub use ballot::{Ballot, BallotId};
pub use election::{Election, ElectionId};
pub use record::{decode, encode, load, save, Entity, QueryRecord, RecordType, RecordValue};
pub use voter::{Voter, VoterId};

mod ballot;
mod election;
mod record;
mod voter;
