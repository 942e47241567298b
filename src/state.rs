//! Application state: the read-only challenge catalog and the progress store.
//!
//! This module owns:
//!   - catalog maps (by id, slug -> id), built once from TOML bank + seeds
//!   - the SQLite-backed `ProgressStore`
//!
//! The catalog never changes after startup, so it needs no locking; the
//! store carries its own connection pool and is cheap to clone.

use std::collections::HashMap;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::load_bank_from_env;
use crate::domain::Challenge;
use crate::seeds::seed_challenges;
use crate::store::{ProgressStore, StoreError};
use crate::util::slugify;

#[derive(Clone)]
pub struct AppState {
    by_id: HashMap<String, Challenge>,
    by_slug: HashMap<String, String>,
    pub store: ProgressStore,
}

impl AppState {
    /// Build state from env: load the challenge bank, merge seeds, connect
    /// the progress store and run migrations.
    #[instrument(level = "info", skip_all)]
    pub async fn new() -> Result<Self, StoreError> {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://academy.db".to_string());
        let store = ProgressStore::connect(&database_url).await?;
        info!(target: "academy_backend", %database_url, "Progress store ready");

        Ok(Self::with_store(store))
    }

    /// Catalog assembly, separated so tests can inject their own store.
    pub fn with_store(store: ProgressStore) -> Self {
        let mut by_id = HashMap::<String, Challenge>::new();
        let mut by_slug = HashMap::<String, String>::new();

        // Insert bank-provided challenges (if any) first.
        if let Some(bank) = load_bank_from_env() {
            for cc in bank.challenges {
                let id = cc.id.unwrap_or_else(|| Uuid::new_v4().to_string());
                let slug = cc.slug.unwrap_or_else(|| slugify(&cc.title));
                if slug.is_empty() {
                    warn!(target: "academy_backend", %id, title = %cc.title, "Skipping bank item: empty slug");
                    continue;
                }
                let ch = Challenge {
                    id: id.clone(),
                    slug: slug.clone(),
                    title: cc.title,
                    category: cc.category,
                    difficulty: cc.difficulty,
                    points: cc.points,
                    description: cc.description,
                };
                by_slug.insert(slug, id.clone());
                by_id.insert(id, ch);
            }
        }

        // Always insert built-in seeds, but don't overwrite bank entries
        // that claimed an id or slug.
        for c in seed_challenges() {
            if by_id.contains_key(&c.id) || by_slug.contains_key(&c.slug) {
                continue;
            }
            by_slug.insert(c.slug.clone(), c.id.clone());
            by_id.insert(c.id.clone(), c);
        }

        // Inventory summary by category.
        let mut count_by_category: HashMap<String, usize> = HashMap::new();
        for ch in by_id.values() {
            *count_by_category.entry(ch.category.clone()).or_insert(0) += 1;
        }
        for (category, count) in count_by_category {
            info!(target: "academy_backend", %category, count, "Startup catalog inventory");
        }

        Self { by_id, by_slug, store }
    }

    /// Look up a challenge by id or slug.
    pub fn find_challenge(&self, key: &str) -> Option<&Challenge> {
        self.by_id
            .get(key)
            .or_else(|| self.by_slug.get(key).and_then(|id| self.by_id.get(id)))
    }

    /// All catalog entries, ordered by category then title for stable output.
    pub fn challenges(&self) -> Vec<&Challenge> {
        let mut all: Vec<&Challenge> = self.by_id.values().collect();
        all.sort_by(|a, b| (&a.category, &a.title).cmp(&(&b.category, &b.title)));
        all
    }
}
