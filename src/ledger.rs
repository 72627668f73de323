use std::sync::Arc;

use rocket::tokio::sync::Mutex;

use crate::store::{Transaction, WorldState};
use crate::workflow::VoteContract;

/// The host's handle on the world state and the contract that runs over it.
///
/// Transactions are serialized: [`begin`](Self::begin) waits until every
/// earlier transaction has been committed or dropped.
pub struct Ledger {
    state: Arc<dyn WorldState>,
    contract: VoteContract,
    gate: Mutex<()>,
}

impl Ledger {
    pub fn new(state: Arc<dyn WorldState>, contract: VoteContract) -> Self {
        Self {
            state,
            contract,
            gate: Mutex::new(()),
        }
    }

    pub fn contract(&self) -> &VoteContract {
        &self.contract
    }

    /// Start a transaction, waiting for any running one to finish.
    pub async fn begin(&self) -> Transaction<'_> {
        let permit = self.gate.lock().await;
        Transaction::serialized(self.state.as_ref(), permit)
    }
}
