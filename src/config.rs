//! Loading the challenge bank (catalog entries) from TOML.
//!
//! The bank is optional: without `CHALLENGE_CONFIG_PATH` the service runs on
//! built-in seeds alone. See `BankConfig` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Difficulty;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BankConfig {
    #[serde(default)]
    pub challenges: Vec<ChallengeCfg>,
}

/// Challenge entry accepted in TOML configuration. `id` and `slug` are
/// optional; missing ids get a fresh UUID and missing slugs derive from the
/// title.
#[derive(Clone, Debug, Deserialize)]
pub struct ChallengeCfg {
    #[serde(default)] pub id: Option<String>,
    pub title: String,
    #[serde(default)] pub slug: Option<String>,
    pub category: String,
    #[serde(default)] pub difficulty: Difficulty,
    #[serde(default = "default_points")] pub points: u32,
    #[serde(default)] pub description: String,
}

// Matches the catalog's historical default point value.
fn default_points() -> u32 {
    100
}

/// Attempt to load `BankConfig` from CHALLENGE_CONFIG_PATH. On any
/// parsing/IO error, returns None and the caller falls back to seeds.
pub fn load_bank_from_env() -> Option<BankConfig> {
    let path = std::env::var("CHALLENGE_CONFIG_PATH").ok()?;
    match std::fs::read_to_string(&path) {
        Ok(s) => match toml::from_str::<BankConfig>(&s) {
            Ok(cfg) => {
                info!(target: "academy_backend", %path, entries = cfg.challenges.len(), "Loaded challenge bank (TOML)");
                Some(cfg)
            }
            Err(e) => {
                error!(target: "academy_backend", %path, error = %e, "Failed to parse TOML challenge bank");
                None
            }
        },
        Err(e) => {
            error!(target: "academy_backend", %path, error = %e, "Failed to read TOML challenge bank file");
            None
        }
    }
}
