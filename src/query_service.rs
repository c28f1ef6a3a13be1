//! Cache-aside query service.
//!
//! Reads are served from the cache store. When the window a query covers is not
//! fully cached, a backfill through the population pipeline is started: awaited
//! when nothing is cached yet (first fill), spawned in the background otherwise.
//! Concurrent queries over the same window share one backfill.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::aggregation::Populator;
use crate::backfill::Backfills;
use crate::error::ServiceError;
use crate::metrics;
use crate::normalization::{GENERATION_RANGES, MAX_GENERATION};
use crate::settings::Query;
use crate::store::{CacheStore, EntityIndex, FormIndex};
use crate::types::{FormCategory, PokemonEntity, PokemonForm};

/// Highest national-dex id the id-window backfill reaches for.
pub const NATIONAL_DEX_MAX: u32 = 1025;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: i64,
    pub offset: i64,
    pub search: Option<String>,
    pub types: Vec<String>,
    pub generation: Option<i64>,
    /// Category names or aliases (`gmax`, `gender-diff`, ...).
    pub form_categories: Vec<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            search: None,
            types: Vec::new(),
            generation: None,
            form_categories: Vec::new(),
        }
    }
}

impl ListQuery {
    pub fn page(limit: i64, offset: i64) -> Self {
        Self {
            limit,
            offset,
            ..Default::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.form_categories = categories.into_iter().map(Into::into).collect();
        self
    }
}

/// `ListQuery` after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidatedQuery {
    limit: usize,
    offset: usize,
    search: Option<String>,
    types: BTreeSet<String>,
    generation: Option<u8>,
    categories: BTreeSet<FormCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
    /// Offset actually applied; 0 when the requested one was past the end.
    pub offset: usize,
    pub limit: usize,
}

pub struct QueryService {
    store: Arc<dyn CacheStore>,
    populator: Arc<Populator>,
    settings: Query,
    backfills: Backfills<(u32, u32)>,
}

impl QueryService {
    pub fn new(store: Arc<dyn CacheStore>, populator: Arc<Populator>, settings: &Query) -> Self {
        Self {
            store,
            populator,
            settings: settings.clone(),
            backfills: Backfills::new(),
        }
    }

    fn validate(&self, query: &ListQuery) -> Result<ValidatedQuery, ServiceError> {
        if query.limit < 0 || query.limit > self.settings.max_limit {
            return Err(ServiceError::validation(format!(
                "limit must be within [0, {}], got {}",
                self.settings.max_limit, query.limit
            )));
        }
        if query.offset < 0 {
            return Err(ServiceError::validation(format!(
                "offset must be >= 0, got {}",
                query.offset
            )));
        }
        let generation = match query.generation {
            Some(g) if (1..=MAX_GENERATION as i64).contains(&g) => Some(g as u8),
            Some(g) => {
                return Err(ServiceError::validation(format!(
                    "generation must be within [1, {}], got {}",
                    MAX_GENERATION, g
                )))
            }
            None => None,
        };
        let categories = query
            .form_categories
            .iter()
            .filter(|c| !c.trim().is_empty())
            .map(|c| c.parse::<FormCategory>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(|e| ServiceError::validation(e.to_string()))?;

        Ok(ValidatedQuery {
            limit: query.limit as usize,
            offset: query.offset as usize,
            search: query
                .search
                .as_ref()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
            types: query
                .types
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            generation,
            categories,
        })
    }

    /// Most selective index first: generation, then name search, then full scan.
    fn choose_index(query: &ValidatedQuery) -> EntityIndex {
        if let Some(generation) = query.generation {
            EntityIndex::ByGeneration(generation)
        } else if let Some(ref term) = query.search {
            EntityIndex::NameSearch(term.clone())
        } else {
            EntityIndex::All
        }
    }

    /// Id window a query is expected to cover, if it can be known up front.
    fn backfill_window(query: &ValidatedQuery) -> Option<(u32, u32)> {
        if let Some(generation) = query.generation {
            return GENERATION_RANGES
                .iter()
                .find(|(_, _, g)| *g == generation)
                .map(|(start, end, _)| (*start, *end));
        }
        if query.search.is_some() || query.limit == 0 {
            return None;
        }
        // offsets beyond the id space have nothing to backfill
        let offset = u32::try_from(query.offset).ok()?;
        let limit = u32::try_from(query.limit).ok()?;
        let start = offset.saturating_add(1);
        let end = offset.saturating_add(limit).min(NATIONAL_DEX_MAX);
        (start <= end).then_some((start, end))
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page<PokemonEntity>, ServiceError> {
        let query = self.validate(query)?;
        let index = Self::choose_index(&query);
        metrics::increment_query(index.label());

        let mut rows = self.store.query_entities(&index).await?;

        if self.settings.backfill_on_miss {
            if let Some(window) = Self::backfill_window(&query) {
                let missing = missing_in_window(&rows, window);
                if missing > 0 {
                    if rows.is_empty() && self.settings.blocking_first_fill {
                        info!("Cache empty for {:?}, filling window {:?}", index, window);
                        self.populator.populate_range(window.0, window.1).await;
                        rows = self.store.query_entities(&index).await?;
                    } else {
                        debug!("{} ids missing in window {:?}", missing, window);
                        self.spawn_backfill(window);
                    }
                }
            }
        }

        Ok(paginate(filter_rows(rows, &query), query.offset, query.limit))
    }

    /// Cache-aside point read. An id unknown upstream reads as `None`.
    pub async fn get(&self, id: u32) -> Result<Option<PokemonEntity>, ServiceError> {
        if let Some(entity) = self.store.get_entity(id).await? {
            return Ok(Some(entity));
        }
        if !self.settings.backfill_on_miss {
            return Ok(None);
        }
        match self.populator.refresh(id).await {
            Ok(entity) => Ok(Some(entity)),
            Err(ServiceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<PokemonEntity>, ServiceError> {
        let name = name.trim().to_lowercase();
        let cached = self
            .store
            .query_entities(&EntityIndex::ByName(name.clone()))
            .await?;
        // names are not strictly unique: first match by id
        if let Some(entity) = cached.into_iter().next() {
            return Ok(Some(entity));
        }
        if !self.settings.backfill_on_miss {
            return Ok(None);
        }
        match self.populator.refresh_by_name(&name).await {
            Ok(entity) => Ok(Some(entity)),
            Err(ServiceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Cached forms owned by `pokemon_id`.
    pub async fn forms_of(&self, pokemon_id: u32) -> Result<Vec<PokemonForm>, ServiceError> {
        Ok(self
            .store
            .query_forms(&FormIndex::ByPokemonId(pokemon_id))
            .await?)
    }

    fn spawn_backfill(&self, window: (u32, u32)) {
        let populator = self.populator.clone();
        self.backfills.spawn(window, async move {
            let report = populator.populate_range(window.0, window.1).await;
            if !report.failed.is_empty() {
                warn!(
                    "⚠️ Backfill {:?} left {} ids uncached",
                    window,
                    report.failed.len()
                );
            }
        });
    }

    pub fn backfills_in_flight(&self) -> usize {
        self.backfills.in_flight()
    }

    /// Waits for every background backfill started so far.
    pub async fn wait_for_backfills(&self) {
        self.backfills.wait().await;
    }
}

fn missing_in_window(rows: &[PokemonEntity], (start, end): (u32, u32)) -> usize {
    let cached: HashSet<u32> = rows
        .iter()
        .map(|e| e.id)
        .filter(|id| (start..=end).contains(id))
        .collect();
    (end - start + 1) as usize - cached.len()
}

/// generation → search → types (any-of) → categories (any-of), then dedup by id
/// and sort by id, name.
fn filter_rows(rows: Vec<PokemonEntity>, query: &ValidatedQuery) -> Vec<PokemonEntity> {
    let mut seen = HashSet::new();
    let mut filtered: Vec<PokemonEntity> = rows
        .into_iter()
        .filter(|e| query.generation.map_or(true, |g| e.generation == Some(g)))
        .filter(|e| {
            query
                .search
                .as_ref()
                .map_or(true, |term| e.name.contains(term.as_str()))
        })
        .filter(|e| query.types.is_empty() || e.types.iter().any(|t| query.types.contains(t)))
        .filter(|e| {
            query.categories.is_empty() || e.form_tags.iter().any(|c| query.categories.contains(c))
        })
        .filter(|e| seen.insert(e.id))
        .collect();
    filtered.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
    filtered
}

/// Slices `[offset, offset + limit)`. An offset past the end restarts at 0.
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Page<T> {
    let total = items.len();
    let offset = if offset >= total { 0 } else { offset };
    let items: Vec<T> = items.into_iter().skip(offset).take(limit).collect();
    Page {
        has_more: offset + limit < total,
        items,
        total,
        offset,
        limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poke_api::testing::{raw_pokemon, raw_species, FakePokeApi};
    use crate::settings::Population;
    use crate::store::MemoryStore;

    fn entity(id: u32, name: &str, types: &[&str], tags: &[FormCategory]) -> PokemonEntity {
        let mut e = PokemonEntity::stub(id, name);
        e.types = types.iter().map(|t| t.to_string()).collect();
        e.form_tags = tags.iter().copied().collect();
        e
    }

    async fn seeded(settings: Query) -> (QueryService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for e in [
            entity(1, "bulbasaur", &["grass", "poison"], &[]),
            entity(4, "charmander", &["fire"], &[]),
            entity(6, "charizard", &["fire", "flying"], &[FormCategory::Mega, FormCategory::Gigantamax]),
            entity(25, "pikachu", &["electric"], &[FormCategory::Gigantamax]),
            entity(52, "meowth", &["normal"], &[FormCategory::Regional]),
            entity(152, "chikorita", &["grass"], &[]),
        ] {
            store.upsert_entity(e).await.unwrap();
        }
        let populator = Arc::new(Populator::new(
            Arc::new(FakePokeApi::new()),
            store.clone(),
            &Population::default(),
        ));
        (QueryService::new(store.clone(), populator, &settings), store)
    }

    fn window_for(offset: usize, limit: usize) -> Option<(u32, u32)> {
        QueryService::backfill_window(&ValidatedQuery {
            limit,
            offset,
            search: None,
            types: BTreeSet::new(),
            generation: None,
            categories: BTreeSet::new(),
        })
    }

    #[test]
    fn test_backfill_window_bounds() {
        assert_eq!(window_for(0, 20), Some((1, 20)));
        assert_eq!(window_for(1020, 20), Some((1021, 1025)));
        assert_eq!(window_for(2000, 20), None);
        assert_eq!(window_for(0, 0), None);
        // must not wrap around into the low ids
        assert_eq!(window_for((u32::MAX as usize) + 6, 20), None);
    }

    fn no_backfill() -> Query {
        Query {
            backfill_on_miss: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_validation_rejects_out_of_range() {
        let (service, _) = seeded(no_backfill()).await;
        for query in [
            ListQuery::page(-1, 0),
            ListQuery::page(1026, 0),
            ListQuery::page(10, -5),
            ListQuery::page(10, 0).with_generation(0),
            ListQuery::page(10, 0).with_generation(10),
            ListQuery::page(10, 0).with_categories(["shiny"]),
        ] {
            let err = service.list(&query).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR", "{:?}", query);
        }
        assert!(service.list(&ListQuery::page(1025, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_pagination_invariant() {
        let (service, _) = seeded(no_backfill()).await;
        let total = 6usize;
        for limit in 0..=7usize {
            for offset in 0..total {
                let page = service
                    .list(&ListQuery::page(limit as i64, offset as i64))
                    .await
                    .unwrap();
                assert_eq!(page.total, total);
                assert_eq!(page.items.len(), limit.min(total - offset));
                assert_eq!(page.has_more, offset + limit < total);
            }
        }
    }

    #[tokio::test]
    async fn test_offset_past_end_resets() {
        let (service, _) = seeded(no_backfill()).await;
        let page = service.list(&ListQuery::page(2, 40)).await.unwrap();
        assert_eq!(page.offset, 0);
        assert_eq!(page.items.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 4]);
    }

    #[tokio::test]
    async fn test_filters_apply_in_order() {
        let (service, _) = seeded(no_backfill()).await;

        let gen1_fire = service
            .list(&ListQuery::page(10, 0).with_generation(1).with_types(["fire", "electric"]))
            .await
            .unwrap();
        assert_eq!(gen1_fire.items.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4, 6, 25]);

        let gmax = service
            .list(&ListQuery::page(10, 0).with_categories(["gmax"]))
            .await
            .unwrap();
        assert_eq!(gmax.items.iter().map(|e| e.id).collect::<Vec<_>>(), vec![6, 25]);

        let search = service
            .list(&ListQuery::page(10, 0).with_search("CHAR").with_categories(["mega"]))
            .await
            .unwrap();
        assert_eq!(search.items.iter().map(|e| e.id).collect::<Vec<_>>(), vec![6]);

        let grass = service
            .list(&ListQuery::page(10, 0).with_types(["grass"]))
            .await
            .unwrap();
        assert_eq!(grass.total, 2);
    }

    #[test]
    fn test_filter_dedups_by_id() {
        let query = ValidatedQuery {
            limit: 10,
            offset: 0,
            search: None,
            types: BTreeSet::new(),
            generation: None,
            categories: BTreeSet::new(),
        };
        let mut duplicate = entity(4, "charmander-copy", &["fire"], &[]);
        duplicate.id = 4;
        let rows = vec![
            entity(6, "charizard", &["fire"], &[]),
            entity(4, "charmander", &["fire"], &[]),
            duplicate,
        ];
        let filtered = filter_rows(rows, &query);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].name, "charmander");
    }

    #[tokio::test]
    async fn test_first_fill_blocks_then_backfill_runs_in_background() {
        let api = Arc::new(FakePokeApi::new());
        for (id, name) in [(1, "bulbasaur"), (2, "ivysaur"), (3, "venusaur"), (4, "charmander")] {
            api.add_pokemon(raw_pokemon(id, name, &["grass"]));
            api.add_species(raw_species(id, name, &[(id, name, true)]));
        }
        let store = Arc::new(MemoryStore::new());
        let population = Population {
            inter_batch_pause_ms: 0,
            ..Default::default()
        };
        let populator = Arc::new(Populator::new(api, store.clone(), &population));
        let service = QueryService::new(store.clone(), populator, &Query::default());

        let first = service.list(&ListQuery::page(2, 0)).await.unwrap();
        assert_eq!(first.items.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);

        // ids 3-4 are not cached: served from what is there, filled in the background
        let second = service.list(&ListQuery::page(2, 2)).await.unwrap();
        assert_eq!(second.total, 2);
        assert_eq!(second.offset, 0);
        service.wait_for_backfills().await;
        assert_eq!(service.backfills_in_flight(), 0);

        let third = service.list(&ListQuery::page(2, 2)).await.unwrap();
        assert_eq!(third.items.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_get_reads_through_and_unknown_is_none() {
        let api = Arc::new(FakePokeApi::new());
        api.add_pokemon(raw_pokemon(7, "squirtle", &["water"]));
        api.add_species(raw_species(7, "squirtle", &[(7, "squirtle", true)]));
        let store = Arc::new(MemoryStore::new());
        let populator = Arc::new(Populator::new(api, store.clone(), &Population::default()));
        let service = QueryService::new(store.clone(), populator, &Query::default());

        assert_eq!(service.get(7).await.unwrap().unwrap().name, "squirtle");
        assert!(store.get_entity(7).await.unwrap().is_some());
        assert!(service.get(9999).await.unwrap().is_none());
        assert_eq!(service.get_by_name("Squirtle").await.unwrap().unwrap().id, 7);
    }
}
