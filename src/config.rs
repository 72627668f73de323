use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::clock::{Clock, SimulatedClock, SystemClock};
use crate::ledger::Ledger;
use crate::store::{ensure_indexes_exist, MemoryWorldState, MongoWorldState, WorldState};
use crate::workflow::{SeedData, VoteContract};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Freeze the clock at this instant instead of following the wall clock.
    #[serde(default)]
    simulated_now: Option<DateTime<Utc>>,
    #[serde(default)]
    seed: SeedData,
}

impl Config {
    /// The clock the contract checks voting windows against.
    pub fn clock(&self) -> Arc<dyn Clock> {
        match self.simulated_now {
            Some(now) => {
                info!("Using simulated clock starting at {now}");
                Arc::new(SimulatedClock::new(now))
            }
            None => Arc::new(SystemClock),
        }
    }

    /// The data `initialize` creates.
    pub fn seed(&self) -> &SeedData {
        &self.seed
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Where the world state lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process memory; lost on shutdown.
    #[default]
    Memory,
    Mongodb,
}

/// Configuration for the world state.
#[derive(Debug, Deserialize)]
struct StoreConfig {
    #[serde(default)]
    store: StoreKind,
    // secrets
    db_uri: Option<String>,
    #[serde(default = "default_db_name")]
    db_name: String,
}

fn default_db_name() -> String {
    "vote_ledger".to_string()
}

/// A fairing that loads the store config, connects to the database if one is
/// configured, and places a [`Ledger`] into managed state. With MongoDB the
/// `Client` is managed too.
///
/// Must be attached after [`ConfigFairing`].
pub struct LedgerFairing;

#[rocket::async_trait]
impl Fairing for LedgerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let contract = match rocket.state::<Config>() {
            Some(app) => VoteContract::new(app.clock(), app.seed().clone()),
            None => {
                error!("Application config must be loaded before the ledger");
                return Err(rocket);
            }
        };

        let state: Arc<dyn WorldState> = match config.store {
            StoreKind::Memory => {
                info!("Using in-memory world state");
                Arc::new(MemoryWorldState::new())
            }
            StoreKind::Mongodb => {
                let Some(db_uri) = config.db_uri else {
                    error!("`db_uri` must be set when `store` is \"mongodb\"");
                    return Err(rocket);
                };
                info!("Loaded database config, connecting...");
                // Construct the connection.
                let client = match MongoClient::with_uri_str(db_uri).await {
                    Ok(client) => client,
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        return Err(rocket);
                    }
                };
                let db = client.database(&config.db_name);

                // Ensure the required indexes exist.
                if let Err(e) = ensure_indexes_exist(&db).await {
                    error!("Failed to connect to database: {e}");
                    return Err(rocket);
                }
                info!("...database connection online!");

                rocket = rocket.manage(client.clone());
                Arc::new(MongoWorldState::new(client, &db))
            }
        };

        // Manage the state.
        rocket = rocket.manage(Ledger::new(state, contract));
        Ok(rocket)
    }
}
