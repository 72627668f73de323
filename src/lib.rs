#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate ledger_test;

use rocket::{Build, Rocket};

use config::{ConfigFairing, LedgerFairing};
use ledger::Ledger;
use logging::LoggerFairing;

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod store;
pub mod workflow;

/// Build the server from `Rocket.toml` and `ROCKET_*` environment variables.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(LedgerFairing)
        .attach(LoggerFairing)
}

/// Build the server around an existing ledger, skipping store configuration.
pub fn rocket_for_ledger(ledger: Ledger) -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .attach(LoggerFairing)
        .manage(ledger)
}

/// Connect to a fresh database named after `test`, for `#[db_test]`.
/// Returns `None` when no `db_uri` is configured.
#[cfg(test)]
async fn mongo_world_state(test: &str) -> Option<(store::MongoWorldState, mongodb::Database)> {
    let figment = rocket::Config::figment();
    let Ok(db_uri) = figment.extract_inner::<String>("db_uri") else {
        warn!("`db_uri` not set, skipping database test {test}");
        return None;
    };
    let client = mongodb::Client::with_uri_str(&db_uri)
        .await
        .unwrap_or_else(|e| panic!("Could not connect to database with `db_uri` {db_uri:?}: {e}"));
    let db = client.database(&format!("vote_ledger_test_{test}"));

    db.drop(None).await.unwrap();
    store::ensure_indexes_exist(&db).await.unwrap();
    Some((store::MongoWorldState::new(client, &db), db))
}
