//! Top-level handle that wires the client, the store and every service together.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pokedex = Pokedex::connect(Settings::new()?).await?;
//! let page = pokedex.list(&ListQuery::page(20, 0).with_generation(1)).await?;
//! ```

use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::aggregation::{FormsAggregator, PopulationReport, Populator, RegionAggregator};
use crate::catalog::{SpeciesCatalog, TypeCatalog};
use crate::database::PgStore;
use crate::error::ServiceError;
use crate::favorites::Favorites;
use crate::gender_descriptions::GenderDescriptionService;
use crate::poke_api::{PokeApi, PokeApiClient};
use crate::query_service::{ListQuery, Page, QueryService};
use crate::regional_dex::RegionalDexService;
use crate::settings::{Database, Settings};
use crate::store::{CacheScope, CacheStore, MemoryStore};
use crate::ttl_cache::TtlCache;
use crate::types::{
    EvolutionStage, Favorite, GenderDifferenceDescription, PokemonEntity, PokemonForm,
    RegionalDexEntry, SpeciesForms, SpeciesRecord,
};

const TYPE_CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Postgres when a URL is configured, in-memory otherwise. A failed connection
/// falls back to memory unless `database.require` is set.
pub async fn open_store(settings: &Database) -> Result<Arc<dyn CacheStore>> {
    if crate::database::database_url(settings).is_none() {
        info!("No database configured, using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    match PgStore::connect(settings).await {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) if !settings.require => {
            warn!("⚠️ Postgres unavailable ({}), using the in-memory store", e);
            Ok(Arc::new(MemoryStore::new()))
        }
        Err(e) => Err(e),
    }
}

pub struct Pokedex {
    settings: Arc<Settings>,
    store: Arc<dyn CacheStore>,
    populator: Arc<Populator>,
    query: QueryService,
    forms: FormsAggregator,
    regions: RegionalDexService,
    gender: GenderDescriptionService,
    favorites: Favorites,
    types: TypeCatalog,
    species: SpeciesCatalog,
}

impl Pokedex {
    pub fn new(settings: Settings, api: Arc<dyn PokeApi>, store: Arc<dyn CacheStore>) -> Self {
        let populator = Arc::new(Populator::new(api.clone(), store.clone(), &settings.population));
        Self {
            query: QueryService::new(store.clone(), populator.clone(), &settings.query),
            forms: FormsAggregator::new(api.clone(), store.clone(), &settings.aggregation),
            regions: RegionalDexService::new(
                RegionAggregator::new(api.clone()),
                store.clone(),
                populator.clone(),
                settings.query.max_limit,
            ),
            gender: GenderDescriptionService::new(api.clone(), store.clone(), &settings.gender),
            favorites: Favorites::new(store.clone()),
            types: TypeCatalog::new(
                api.clone(),
                Arc::new(TtlCache::new("type_catalog", 1, TYPE_CATALOG_TTL)),
            ),
            species: SpeciesCatalog::new(api, store.clone()),
            populator,
            store,
            settings: Arc::new(settings),
        }
    }

    /// Builds the HTTP client and opens the configured store.
    pub async fn connect(settings: Settings) -> Result<Self> {
        let api: Arc<dyn PokeApi> = Arc::new(PokeApiClient::new(&settings.api)?);
        let store = open_store(&settings.database).await?;
        info!("✅ Pokedex ready ({} store)", store.name());
        Ok(Self::new(settings, api, store))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub fn query_service(&self) -> &QueryService {
        &self.query
    }

    pub fn regional_dex(&self) -> &RegionalDexService {
        &self.regions
    }

    pub fn populator(&self) -> &Arc<Populator> {
        &self.populator
    }

    // Entities

    pub async fn list(&self, query: &ListQuery) -> Result<Page<PokemonEntity>, ServiceError> {
        self.query.list(query).await
    }

    pub async fn pokemon(&self, id: u32) -> Result<Option<PokemonEntity>, ServiceError> {
        self.query.get(id).await
    }

    pub async fn pokemon_by_name(&self, name: &str) -> Result<Option<PokemonEntity>, ServiceError> {
        self.query.get_by_name(name).await
    }

    pub async fn pokemon_forms(&self, id: u32) -> Result<Vec<PokemonForm>, ServiceError> {
        self.query.forms_of(id).await
    }

    pub async fn populate(&self, from_id: u32, to_id: u32) -> PopulationReport {
        self.populator.populate_range(from_id, to_id).await
    }

    // Forms and species

    pub async fn species_forms(&self, species_name: &str) -> Result<SpeciesForms, ServiceError> {
        Ok(self.forms.forms_for_species(species_name).await?)
    }

    pub async fn species_forms_batch(&self, names: &[String]) -> Vec<SpeciesForms> {
        self.forms.aggregate(names).await
    }

    pub async fn species(&self, key: &str) -> Result<Option<SpeciesRecord>, ServiceError> {
        self.species.species(key).await
    }

    pub async fn evolution_line(&self, key: &str) -> Result<Option<Vec<EvolutionStage>>, ServiceError> {
        self.species.evolution_line(key).await
    }

    pub async fn types(&self) -> Result<Arc<Vec<String>>, ServiceError> {
        self.types.list_types().await
    }

    // Gender differences

    /// Looks the name up through the entity cache (backfilling on a miss).
    pub async fn gender_description(
        &self,
        pokemon_id: u32,
    ) -> Result<Option<GenderDifferenceDescription>, ServiceError> {
        let Some(entity) = self.query.get(pokemon_id).await? else {
            return Ok(None);
        };
        self.gender.describe(entity.id, &entity.name).await
    }

    pub async fn gender_description_by_name(
        &self,
        name: &str,
    ) -> Result<Option<GenderDifferenceDescription>, ServiceError> {
        self.gender.describe_by_name(name).await
    }

    // Regional dex

    pub async fn regional_page(
        &self,
        region: &str,
        limit: i64,
        offset: i64,
        reset: bool,
    ) -> Result<Page<RegionalDexEntry>, ServiceError> {
        self.regions.page(region, limit, offset, reset).await
    }

    // Favorites

    pub async fn add_favorite(&self, user_id: &str, pokemon_id: u32) -> Result<Favorite, ServiceError> {
        self.favorites.add(user_id, pokemon_id).await
    }

    pub async fn remove_favorite(&self, user_id: &str, pokemon_id: u32) -> Result<(), ServiceError> {
        self.favorites.remove(user_id, pokemon_id).await
    }

    pub async fn toggle_favorite(&self, user_id: &str, pokemon_id: u32) -> Result<bool, ServiceError> {
        self.favorites.toggle(user_id, pokemon_id).await
    }

    pub async fn favorites(&self, user_id: &str) -> Result<Vec<Favorite>, ServiceError> {
        self.favorites.list(user_id).await
    }

    // Maintenance

    /// Wipes the named scopes. Favorites are never part of a scope.
    pub async fn clear<S: AsRef<str>>(&self, scopes: &[S]) -> Result<Vec<CacheScope>, ServiceError> {
        if scopes.is_empty() {
            return Err(ServiceError::validation("at least one cache scope is required"));
        }
        let mut parsed: Vec<CacheScope> = scopes
            .iter()
            .map(|s| s.as_ref().parse::<CacheScope>())
            .collect::<Result<_, _>>()
            .map_err(ServiceError::Validation)?;
        parsed.sort();
        parsed.dedup();
        self.store.clear(&parsed).await?;
        info!(
            "🧹 Cleared cache scopes: {}",
            parsed.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(parsed)
    }
}
