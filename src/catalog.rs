//! Reference data that rarely changes: the type list, species detail records and
//! evolution lines.

use log::debug;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::normalization::{flatten_evolution_chain, normalize_species};
use crate::poke_api::PokeApi;
use crate::store::CacheStore;
use crate::ttl_cache::KeyValueCache;
use crate::types::{EvolutionStage, SpeciesRecord};

/// Types that never appear on a battle-capable pokemon.
pub const NON_BATTLE_TYPES: [&str; 2] = ["unknown", "shadow"];

const TYPES_KEY: &str = "types";

pub type TypeListCache = Arc<dyn KeyValueCache<&'static str, Arc<Vec<String>>>>;

pub struct TypeCatalog {
    api: Arc<dyn PokeApi>,
    cache: TypeListCache,
}

impl TypeCatalog {
    pub fn new(api: Arc<dyn PokeApi>, cache: TypeListCache) -> Self {
        Self { api, cache }
    }

    /// Battle types sorted by name.
    pub async fn list_types(&self) -> Result<Arc<Vec<String>>, ServiceError> {
        if let Some(types) = self.cache.get(&TYPES_KEY) {
            return Ok(types);
        }
        let raw = self.api.types().await?;
        let mut types: Vec<String> = raw
            .results
            .into_iter()
            .map(|t| t.name.to_lowercase())
            .filter(|name| !name.is_empty() && !NON_BATTLE_TYPES.contains(&name.as_str()))
            .collect();
        types.sort();
        types.dedup();
        let types = Arc::new(types);
        self.cache.set(TYPES_KEY, types.clone());
        Ok(types)
    }
}

pub struct SpeciesCatalog {
    api: Arc<dyn PokeApi>,
    store: Arc<dyn CacheStore>,
}

impl SpeciesCatalog {
    pub fn new(api: Arc<dyn PokeApi>, store: Arc<dyn CacheStore>) -> Self {
        Self { api, store }
    }

    /// Cached record by id or name; fetched and stored on a miss.
    /// `None` when the species does not exist upstream.
    pub async fn species(&self, key: &str) -> Result<Option<SpeciesRecord>, ServiceError> {
        let key = key.trim().to_lowercase();
        let cached = match key.parse::<u32>() {
            Ok(id) => self.store.get_species(id).await?,
            Err(_) => self.store.get_species_by_name(&key).await?,
        };
        if cached.is_some() {
            return Ok(cached);
        }

        let raw = match self.api.species(&key).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = normalize_species(&raw);
        self.store.upsert_species(record.clone()).await?;
        Ok(Some(record))
    }

    /// Evolution line of a species, breadth-first. `None` for an unknown species.
    pub async fn evolution_line(&self, key: &str) -> Result<Option<Vec<EvolutionStage>>, ServiceError> {
        let Some(species) = self.species(key).await? else {
            return Ok(None);
        };
        let Some(chain_id) = species.evolution_chain_id else {
            debug!("Species {} has no evolution chain", species.name);
            return Ok(Some(Vec::new()));
        };
        let chain = self.api.evolution_chain(chain_id).await?;
        Ok(Some(flatten_evolution_chain(&chain)))
    }
}
