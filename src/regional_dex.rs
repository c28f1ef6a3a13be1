// Materialised regional dex pages.
//
// First request for a region builds every row synchronously from the region
// aggregation plus whatever the entity cache already holds, denormalising the
// requested window before answering. Rows still missing types or sprite are
// completed by a background backfill; later pages heal themselves the same way.

use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::aggregation::{region_slugs, Populator, RegionAggregator, RegionSpecies};
use crate::backfill::Backfills;
use crate::error::ServiceError;
use crate::query_service::{paginate, Page};
use crate::store::{sort_forms, CacheStore, EntityIndex, FormIndex, StoreError};
use crate::types::{FormCategory, PokemonEntity, PokemonForm, RegionalDexEntry};

pub struct RegionalDexService {
    aggregator: RegionAggregator,
    store: Arc<dyn CacheStore>,
    populator: Arc<Populator>,
    max_limit: i64,
    backfills: Backfills<String>,
}

impl RegionalDexService {
    pub fn new(
        aggregator: RegionAggregator,
        store: Arc<dyn CacheStore>,
        populator: Arc<Populator>,
        max_limit: i64,
    ) -> Self {
        Self {
            aggregator,
            store,
            populator,
            max_limit,
            backfills: Backfills::new(),
        }
    }

    pub async fn page(
        &self,
        region: &str,
        limit: i64,
        offset: i64,
        reset: bool,
    ) -> Result<Page<RegionalDexEntry>, ServiceError> {
        let region = region.trim().to_lowercase();
        if region.is_empty() {
            return Err(ServiceError::validation("region is required"));
        }
        if region_slugs(&region).is_none() {
            return Err(ServiceError::validation(format!("Unknown region: {}", region)));
        }
        if limit < 0 || limit > self.max_limit {
            return Err(ServiceError::validation(format!(
                "limit must be within [0, {}], got {}",
                self.max_limit, limit
            )));
        }
        if offset < 0 {
            return Err(ServiceError::validation(format!("offset must be >= 0, got {}", offset)));
        }
        let (limit, offset) = (limit as usize, offset as usize);

        if reset {
            let purged = self.store.purge_region(&region).await?;
            info!("🧹 Purged {} cached rows of region {}", purged, region);
        }

        let mut rows = self.store.query_region(&region).await?;
        if rows.is_empty() {
            rows = self.build(&region, offset, limit).await?;
        }

        let page = paginate(rows, offset, limit);
        let incomplete: Vec<u32> = page
            .items
            .iter()
            .filter(|e| !e.is_denormalized())
            .map(|e| e.dex_id)
            .collect();
        if !incomplete.is_empty() {
            self.spawn_backfill(&region, incomplete);
        }
        Ok(page)
    }

    /// Aggregates the region, fills the requested window, stores every row.
    async fn build(
        &self,
        region: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RegionalDexEntry>, ServiceError> {
        let aggregate = self.aggregator.aggregate_region(region).await?;
        if aggregate.is_partial() {
            warn!(
                "⚠️ Region {} built without {:?}",
                region, aggregate.failed_slugs
            );
        }
        let species = aggregate.species;

        let window_start = if offset >= species.len() { 0 } else { offset };
        let window: Vec<u32> = species
            .iter()
            .skip(window_start)
            .take(limit)
            .map(|s| s.id)
            .collect();
        let mut missing = Vec::new();
        for id in &window {
            if self.store.get_entity(*id).await?.is_none() {
                missing.push(*id);
            }
        }
        if !missing.is_empty() {
            let report = self.populator.populate_ids(&missing).await;
            if !report.failed.is_empty() {
                warn!(
                    "⚠️ Region {}: {} entries served without details",
                    region,
                    report.failed.len()
                );
            }
        }

        let rows = denormalize(self.store.as_ref(), region, &species).await?;
        self.store.upsert_regional_entries(rows.clone()).await?;
        info!("✅ Region {} materialised with {} entries", region, rows.len());
        Ok(rows)
    }

    fn spawn_backfill(&self, region: &str, ids: Vec<u32>) {
        let store = self.store.clone();
        let populator = self.populator.clone();
        let key = region.to_string();
        let region = region.to_string();
        self.backfills.spawn(key, async move {
            populator.populate_ids(&ids).await;
            if let Err(e) = refresh_rows(store.as_ref(), &region, &ids).await {
                warn!("⚠️ Backfill of region {} failed: {}", region, e);
            }
        });
    }

    pub fn backfills_in_flight(&self) -> usize {
        self.backfills.in_flight()
    }

    pub async fn wait_for_backfills(&self) {
        self.backfills.wait().await;
    }
}

/// Rebuilds the stored rows of `ids` from the current entity and form cache.
async fn refresh_rows(store: &dyn CacheStore, region: &str, ids: &[u32]) -> Result<(), StoreError> {
    let species: Vec<RegionSpecies> = store
        .query_region(region)
        .await?
        .into_iter()
        .filter(|e| ids.contains(&e.dex_id))
        .map(|e| RegionSpecies {
            id: e.dex_id,
            name: e.name,
        })
        .collect();
    if species.is_empty() {
        return Ok(());
    }
    let rows = denormalize(store, region, &species).await?;
    store.upsert_regional_entries(rows).await?;
    Ok(())
}

async fn denormalize(
    store: &dyn CacheStore,
    region: &str,
    species: &[RegionSpecies],
) -> Result<Vec<RegionalDexEntry>, StoreError> {
    let (Some(first), Some(last)) = (species.first(), species.last()) else {
        return Ok(Vec::new());
    };
    let entities: HashMap<u32, PokemonEntity> = store
        .query_entities(&EntityIndex::IdRange(first.id.min(last.id), first.id.max(last.id)))
        .await?
        .into_iter()
        .map(|e| (e.id, e))
        .collect();

    let mut regional_forms: BTreeMap<u32, Vec<PokemonForm>> = BTreeMap::new();
    let mut forms = store
        .query_forms(&FormIndex::ByCategory(FormCategory::Regional))
        .await?;
    sort_forms(&mut forms);
    for form in forms {
        regional_forms.entry(form.pokemon_id).or_default().push(form);
    }

    Ok(species
        .iter()
        .map(|s| {
            let entity = entities.get(&s.id);
            RegionalDexEntry {
                region: region.to_string(),
                dex_id: s.id,
                name: entity.map(|e| e.name.clone()).unwrap_or_else(|| s.name.clone()),
                types: entity.map(|e| e.types.clone()).unwrap_or_default(),
                sprite: entity.and_then(|e| e.sprites.display().map(str::to_string)),
                forms: regional_forms.get(&s.id).cloned().unwrap_or_default(),
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poke_api::testing::{raw_pokemon, raw_species, FakePokeApi};
    use crate::settings::Population;
    use crate::store::MemoryStore;

    fn kanto_api(count: u32) -> Arc<FakePokeApi> {
        let api = FakePokeApi::new();
        let names: Vec<(u32, String)> = (1..=count).map(|id| (id, format!("mon-{}", id))).collect();
        let entries: Vec<(u32, &str)> = names.iter().map(|(id, n)| (*id, n.as_str())).collect();
        api.add_pokedex("kanto", &entries);
        for (id, name) in &names {
            api.add_pokemon(raw_pokemon(*id, name, &["normal"]));
            api.add_species(raw_species(*id, name, &[(*id, name, true)]));
        }
        Arc::new(api)
    }

    fn service(api: Arc<FakePokeApi>, store: Arc<MemoryStore>) -> RegionalDexService {
        let populator = Arc::new(Populator::new(
            api.clone(),
            store.clone(),
            &Population {
                inter_batch_pause_ms: 0,
                ..Default::default()
            },
        ));
        RegionalDexService::new(RegionAggregator::new(api), store, populator, 1025)
    }

    #[tokio::test]
    async fn test_first_request_builds_and_denormalises_window() {
        let store = Arc::new(MemoryStore::new());
        let service = service(kanto_api(6), store.clone());

        let page = service.page("kanto", 3, 0, false).await.unwrap();

        assert_eq!(page.total, 6);
        assert!(page.has_more);
        assert_eq!(page.items.iter().map(|e| e.dex_id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(page.items.iter().all(|e| e.is_denormalized()));
        assert_eq!(store.query_region("kanto").await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_later_pages_heal_in_background() {
        let store = Arc::new(MemoryStore::new());
        let service = service(kanto_api(6), store.clone());
        service.page("kanto", 3, 0, false).await.unwrap();

        let second = service.page("kanto", 3, 3, false).await.unwrap();
        assert!(second.items.iter().all(|e| !e.is_denormalized()));
        service.wait_for_backfills().await;

        let healed = service.page("kanto", 3, 3, false).await.unwrap();
        assert!(healed.items.iter().all(|e| e.is_denormalized()));
        assert_eq!(healed.items[0].types, vec!["normal".to_string()]);
        assert!(!healed.has_more);
    }

    #[tokio::test]
    async fn test_reset_purges_before_rebuild() {
        let store = Arc::new(MemoryStore::new());
        let service = service(kanto_api(2), store.clone());
        store
            .upsert_regional_entries(vec![RegionalDexEntry {
                region: "kanto".to_string(),
                dex_id: 999,
                name: "stale".to_string(),
                types: Vec::new(),
                sprite: None,
                forms: Vec::new(),
            }])
            .await
            .unwrap();

        let page = service.page("kanto", 10, 0, true).await.unwrap();
        assert_eq!(page.items.iter().map(|e| e.dex_id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_validation() {
        let service = service(kanto_api(1), Arc::new(MemoryStore::new()));
        for (region, limit, offset) in [("", 10, 0), ("orre", 10, 0), ("kanto", -1, 0), ("kanto", 10, -1)] {
            let err = service.page(region, limit, offset, false).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_all_slugs_failing_is_internal() {
        let api = kanto_api(1);
        api.fail("pokedex/kanto");
        let service = service(api, Arc::new(MemoryStore::new()));
        let err = service.page("kanto", 10, 0, false).await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
