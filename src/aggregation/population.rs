// Bulk population: pokemon + species (+ first form) per id, in small paced batches.

use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

use super::run_bounded;
use crate::error::ServiceError;
use crate::form_classifier::{classify_all, FormInput};
use crate::metrics;
use crate::normalization::{normalize_pokemon, normalize_species};
use crate::poke_api::PokeApi;
use crate::settings::{CompletenessPolicy, Population};
use crate::store::CacheStore;
use crate::types::raw::RawSpecies;
use crate::types::{FormCategory, PokemonEntity};
use crate::utils::{create_id_chunks, parse_id_from_url};

const PIPELINE: &str = "population";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Skipped,
    Upserted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulationReport {
    pub requested: usize,
    pub upserted: usize,
    pub skipped: usize,
    /// Ids whose fetch or store failed; ascending.
    pub failed: Vec<u32>,
}

impl CompletenessPolicy {
    pub fn is_complete(&self, cached: &PokemonEntity) -> bool {
        match self {
            CompletenessPolicy::RequireFormTags => cached.has_form_tags(),
            CompletenessPolicy::PresenceOnly => true,
        }
    }
}

/// Tags implied by the species' variety list (megas, gmax, regionals, ...).
pub fn variety_tags(species: &RawSpecies) -> BTreeSet<FormCategory> {
    classify_all(
        species
            .varieties
            .iter()
            .map(|v| FormInput::variety(&v.pokemon.name, v.is_default)),
    )
}

pub struct Populator {
    api: Arc<dyn PokeApi>,
    store: Arc<dyn CacheStore>,
    settings: Population,
}

impl Populator {
    pub fn new(api: Arc<dyn PokeApi>, store: Arc<dyn CacheStore>, settings: &Population) -> Self {
        Self {
            api,
            store,
            settings: settings.clone(),
        }
    }

    fn concurrency_for(&self, id_count: usize) -> usize {
        if id_count <= self.settings.small_range_threshold as usize {
            self.settings.small_range_concurrency
        } else {
            self.settings.batch_concurrency
        }
        .max(1)
    }

    /// Populates `[from_id, to_id]`. Per-id failures are logged and reported,
    /// never raised.
    pub async fn populate_range(&self, from_id: u32, to_id: u32) -> PopulationReport {
        let from_id = from_id.max(1);
        if from_id > to_id {
            return PopulationReport::default();
        }
        let ids: Vec<u32> = (from_id..=to_id).collect();
        self.populate_ids(&ids).await
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn populate_ids(&self, ids: &[u32]) -> PopulationReport {
        let start = Instant::now();
        let mut report = PopulationReport {
            requested: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            return report;
        }

        let concurrency = self.concurrency_for(ids.len());
        let pause = Duration::from_millis(self.settings.inter_batch_pause_ms);
        let batches: Vec<&[u32]> = ids.chunks(concurrency).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            let results = run_bounded(batch.iter().copied(), concurrency, |id| async move {
                (id, self.populate_one(id, false).await)
            })
            .await;

            for (id, result) in results {
                match result {
                    Ok((Outcome::Upserted, _)) => report.upserted += 1,
                    Ok((Outcome::Skipped, _)) => report.skipped += 1,
                    Err(e) => {
                        warn!("⚠️ Population of id {} failed: {}", id, e);
                        metrics::increment_aggregation_failure(PIPELINE);
                        report.failed.push(id);
                    }
                }
            }

            if index + 1 < batch_count && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        report.failed.sort_unstable();
        metrics::record_aggregation(PIPELINE, start.elapsed(), report.upserted as u64);
        info!(
            "✅ Population: {} requested, {} upserted, {} skipped, {} failed in {:?}",
            report.requested,
            report.upserted,
            report.skipped,
            report.failed.len(),
            start.elapsed()
        );
        report
    }

    /// Fetches and upserts one id regardless of completeness; returns the stored entity.
    pub async fn refresh(&self, id: u32) -> Result<PokemonEntity, ServiceError> {
        let (_, entity) = self.populate_one(id, true).await?;
        entity.ok_or_else(|| ServiceError::Internal(format!("entity {} missing after upsert", id)))
    }

    /// Same as [`Populator::refresh`] but keyed by name.
    pub async fn refresh_by_name(&self, name: &str) -> Result<PokemonEntity, ServiceError> {
        let raw = self.api.pokemon(&name.trim().to_lowercase()).await?;
        self.refresh(raw.id).await
    }

    /// Generates the `(from, to)` windows a range will be processed in.
    pub fn plan(&self, from_id: u32, to_id: u32) -> Vec<(u32, u32)> {
        let count = to_id.saturating_sub(from_id) as usize + 1;
        create_id_chunks(from_id.max(1), to_id, self.concurrency_for(count) as u32)
    }

    async fn populate_one(
        &self,
        id: u32,
        force: bool,
    ) -> Result<(Outcome, Option<PokemonEntity>), ServiceError> {
        let cached = self.store.get_entity(id).await?;
        if !force {
            if let Some(ref entity) = cached {
                if self.settings.completeness.is_complete(entity) {
                    debug!("Id {} already complete, skipping", id);
                    return Ok((Outcome::Skipped, cached));
                }
            }
        }

        let key = id.to_string();
        let (pokemon, species) = tokio::join!(self.api.pokemon(&key), self.api.species(&key));
        let pokemon = pokemon?;
        let species = match species {
            Ok(species) => Some(species),
            Err(e) => {
                // varieties (non-default pokemon ids) have no species of their own
                debug!("Species {} unavailable: {}", id, e);
                match pokemon.species.as_ref().and_then(|s| parse_id_from_url(&s.url)) {
                    Some(species_id) if species_id != id => {
                        self.api.species(&species_id.to_string()).await.ok()
                    }
                    _ => None,
                }
            }
        };

        let form = if self.settings.fetch_forms {
            match pokemon.forms.first() {
                Some(form_ref) => {
                    let form_key = parse_id_from_url(&form_ref.url)
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| form_ref.name.clone());
                    match self.api.pokemon_form(&form_key).await {
                        Ok(form) => Some(form),
                        Err(e) => {
                            debug!("Form {} of {} unavailable: {}", form_key, id, e);
                            None
                        }
                    }
                }
                None => None,
            }
        } else {
            None
        };

        let mut entity = normalize_pokemon(&pokemon, species.as_ref(), form.as_ref(), cached.as_ref());
        entity.id = id;
        if let Some(ref species) = species {
            if species.id == id {
                entity.form_tags.extend(variety_tags(species));
            }
            self.store.upsert_species(normalize_species(species)).await?;
        }

        self.store.upsert_entity(entity).await?;
        let stored = self.store.get_entity(id).await?;
        Ok((Outcome::Upserted, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poke_api::testing::{raw_pokemon, raw_species, FakePokeApi};
    use crate::store::MemoryStore;

    fn settings() -> Population {
        Population {
            inter_batch_pause_ms: 0,
            ..Default::default()
        }
    }

    fn api_with(ids: &[(u32, &str)]) -> FakePokeApi {
        let api = FakePokeApi::new();
        for (id, name) in ids {
            api.add_pokemon(raw_pokemon(*id, name, &["grass"]));
            api.add_species(raw_species(*id, name, &[(*id, name, true)]));
        }
        api
    }

    #[tokio::test]
    async fn test_failure_on_one_id_does_not_abort_batch() {
        let api = api_with(&[(1, "bulbasaur"), (2, "ivysaur"), (3, "venusaur")]);
        api.fail("pokemon/2");
        let store = Arc::new(MemoryStore::new());
        let populator = Populator::new(Arc::new(api), store.clone(), &settings());

        let report = populator.populate_range(1, 3).await;

        assert_eq!(report.upserted, 2);
        assert_eq!(report.failed, vec![2]);
        assert!(store.get_entity(1).await.unwrap().is_some());
        assert!(store.get_entity(2).await.unwrap().is_none());
        assert!(store.get_entity(3).await.unwrap().is_some());
        assert_eq!(store.get_species(3).await.unwrap().unwrap().name, "venusaur");
    }

    #[tokio::test]
    async fn test_complete_entities_are_skipped() {
        let api = Arc::new(api_with(&[(6, "charizard")]));
        api.add_species(raw_species(
            6,
            "charizard",
            &[(6, "charizard", true), (10034, "charizard-mega-x", false)],
        ));
        let store = Arc::new(MemoryStore::new());
        let populator = Populator::new(api.clone(), store.clone(), &settings());

        let first = populator.populate_range(6, 6).await;
        assert_eq!(first.upserted, 1);
        let entity = store.get_entity(6).await.unwrap().unwrap();
        assert!(entity.form_tags.contains(&FormCategory::Mega));

        let calls = api.calls();
        let second = populator.populate_range(6, 6).await;
        assert_eq!(second.skipped, 1);
        assert_eq!(api.calls(), calls);
    }

    #[tokio::test]
    async fn test_untagged_entities_are_refetched_under_tag_policy() {
        let api = Arc::new(api_with(&[(1, "bulbasaur")]));
        let store = Arc::new(MemoryStore::new());
        let populator = Populator::new(api.clone(), store.clone(), &settings());

        populator.populate_range(1, 1).await;
        let again = populator.populate_range(1, 1).await;
        assert_eq!(again.upserted, 1);

        let presence = Population {
            completeness: CompletenessPolicy::PresenceOnly,
            ..settings()
        };
        let populator = Populator::new(api, store, &presence);
        assert_eq!(populator.populate_range(1, 1).await.skipped, 1);
    }

    #[tokio::test]
    async fn test_rerun_converges() {
        let api = Arc::new(api_with(&[(4, "charmander"), (5, "charmeleon")]));
        let store = Arc::new(MemoryStore::new());
        let populator = Populator::new(api, store.clone(), &settings());

        populator.populate_range(4, 5).await;
        let first = store.get_entity(4).await.unwrap();
        populator.populate_range(4, 5).await;
        assert_eq!(store.get_entity(4).await.unwrap(), first);
        assert_eq!(store.count_entities().await.unwrap(), 2);
    }

    #[test]
    fn test_plan_uses_small_range_concurrency() {
        let populator = Populator::new(
            Arc::new(FakePokeApi::new()),
            Arc::new(MemoryStore::new()),
            &settings(),
        );
        assert_eq!(populator.plan(1, 20), vec![(1, 16), (17, 20)]);
        assert_eq!(populator.plan(1, 100).len(), 13);
    }

    #[test]
    fn test_variety_tags() {
        let species = raw_species(
            37,
            "vulpix",
            &[(37, "vulpix", true), (10103, "vulpix-alola", false)],
        );
        assert_eq!(
            variety_tags(&species).into_iter().collect::<Vec<_>>(),
            vec![FormCategory::Regional]
        );
    }
}
