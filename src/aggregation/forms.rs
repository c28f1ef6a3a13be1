// Alternate-forms aggregation.
//
// species → varieties → pokemon → forms[] → pokemon-form detail. The form detail
// is the only place the numeric form id lives, hence the fourth level.

use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

use super::{run_bounded, Pacing};
use crate::metrics;
use crate::normalization::normalize_form;
use crate::poke_api::PokeApi;
use crate::retry_fetch::FetchError;
use crate::settings::Aggregation;
use crate::store::CacheStore;
use crate::types::raw::{NamedResource, RawPokemon, RawVariety};
use crate::types::{FormCategory, PokemonForm, SpeciesForms};
use crate::utils::parse_id_from_url;

const PIPELINE: &str = "forms";

pub struct FormsAggregator {
    api: Arc<dyn PokeApi>,
    store: Arc<dyn CacheStore>,
    species_workers: usize,
    form_workers: usize,
    pacing: Pacing,
}

impl FormsAggregator {
    pub fn new(api: Arc<dyn PokeApi>, store: Arc<dyn CacheStore>, settings: &Aggregation) -> Self {
        Self {
            api,
            store,
            species_workers: settings.species_workers,
            form_workers: settings.form_workers,
            pacing: Pacing::from(settings),
        }
    }

    /// Aggregates every species in `names`. Failed species come back as
    /// placeholders (id 0, no forms). Sorted by species id, then name.
    pub async fn aggregate(&self, names: &[String]) -> Vec<SpeciesForms> {
        let start = Instant::now();
        let mut batch = run_bounded(names.to_vec(), self.species_workers, |name| async move {
            self.aggregate_species(&name).await
        })
        .await;
        batch.sort_by(|a, b| {
            a.species_id
                .cmp(&b.species_id)
                .then_with(|| a.name.cmp(&b.name))
        });

        let forms: usize = batch.iter().map(|s| s.forms.len()).sum();
        let placeholders = batch.iter().filter(|s| s.is_placeholder()).count();
        metrics::record_aggregation(PIPELINE, start.elapsed(), forms as u64);
        info!(
            "✅ Forms aggregation: {} species, {} forms, {} placeholders in {:?}",
            batch.len(),
            forms,
            placeholders,
            start.elapsed()
        );
        batch
    }

    /// One species. Never fails: an unreachable species yields a placeholder.
    #[instrument(skip(self, species_name), fields(species = %species_name))]
    pub async fn aggregate_species(&self, species_name: &str) -> SpeciesForms {
        let key = species_name.trim().to_lowercase();
        match self.collect_species(&key).await {
            Ok(result) => result,
            Err(e) => {
                warn!("⚠️ Species {} unavailable, emitting placeholder: {}", key, e);
                metrics::increment_aggregation_failure(PIPELINE);
                SpeciesForms::placeholder(key)
            }
        }
    }

    /// Like `aggregate_species`, but a species that cannot be fetched is an error.
    pub async fn forms_for_species(&self, species_name: &str) -> Result<SpeciesForms, FetchError> {
        self.collect_species(&species_name.trim().to_lowercase()).await
    }

    /// Only the species fetch is fatal; failed varieties and forms are skipped.
    async fn collect_species(&self, key: &str) -> Result<SpeciesForms, FetchError> {
        self.pacing.pause().await;
        let mut species = self.api.species(key).await?;
        let species_id = species.id;
        let species_name = if species.name.is_empty() {
            key.to_string()
        } else {
            species.name.to_lowercase()
        };

        // level 2: varieties → pokemon
        let varieties = run_bounded(
            std::mem::take(&mut species.varieties),
            self.form_workers,
            |variety| async move { self.fetch_variety(&variety).await },
        )
        .await;

        // level 3: pokemon → form refs
        let form_refs: Vec<(u32, NamedResource)> = varieties
            .into_iter()
            .flatten()
            .flat_map(|pokemon| {
                let variety_id = pokemon.id;
                pokemon
                    .forms
                    .into_iter()
                    .map(move |form_ref| (variety_id, form_ref))
            })
            .collect();

        // level 4: form refs → form detail
        let details = run_bounded(form_refs, self.form_workers, |(variety_id, form_ref)| {
            let species_name = species_name.as_str();
            async move {
                self.pacing.pause().await;
                let key = form_key(&form_ref);
                match self.api.pokemon_form(&key).await {
                    Ok(raw) => Some(normalize_form(&raw, species_id, species_name, Some(variety_id))),
                    Err(e) => {
                        warn!("⚠️ Form {} of {} skipped: {}", key, species_name, e);
                        metrics::increment_aggregation_failure(PIPELINE);
                        None
                    }
                }
            }
        })
        .await;

        let mut by_id: BTreeMap<u32, PokemonForm> = BTreeMap::new();
        for form in details.into_iter().flatten() {
            by_id
                .entry(form.form_id)
                .and_modify(|existing| existing.categories.extend(form.categories.iter().copied()))
                .or_insert(form);
        }
        let forms: Vec<PokemonForm> = by_id.into_values().collect();

        self.persist(species_id, &forms).await;

        Ok(SpeciesForms {
            species_id,
            name: species_name,
            forms,
        })
    }

    async fn fetch_variety(&self, variety: &RawVariety) -> Option<RawPokemon> {
        self.pacing.pause().await;
        let key = parse_id_from_url(&variety.pokemon.url)
            .map(|id| id.to_string())
            .unwrap_or_else(|| variety.pokemon.name.clone());
        match self.api.pokemon(&key).await {
            Ok(pokemon) => Some(pokemon),
            Err(e) => {
                warn!("⚠️ Variety {} skipped: {}", variety.pokemon.name, e);
                metrics::increment_aggregation_failure(PIPELINE);
                None
            }
        }
    }

    /// Upserts forms, then unions their categories into the species entity.
    /// The entity may not be cached yet; its tags catch up on a later pass.
    async fn persist(&self, species_id: u32, forms: &[PokemonForm]) {
        for form in forms {
            if let Err(e) = self.store.upsert_form(form.clone()).await {
                warn!("⚠️ Failed to store form {}: {}", form.form_id, e);
            }
        }

        let tags: BTreeSet<FormCategory> = forms
            .iter()
            .flat_map(|f| f.categories.iter().copied())
            .collect();
        if tags.is_empty() {
            return;
        }
        if let Err(e) = self.store.merge_entity_tags(species_id, &tags).await {
            warn!("⚠️ Failed to merge tags into {}: {}", species_id, e);
        }
    }
}

fn form_key(form_ref: &NamedResource) -> String {
    parse_id_from_url(&form_ref.url)
        .map(|id| id.to_string())
        .unwrap_or_else(|| form_ref.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poke_api::testing::{raw_form, raw_pokemon, raw_species, FakePokeApi};
    use crate::store::{FormIndex, MemoryStore};
    use crate::types::PokemonEntity;

    fn charizard_api() -> Arc<FakePokeApi> {
        let api = FakePokeApi::new();
        api.add_species(raw_species(
            6,
            "charizard",
            &[(6, "charizard", true), (10034, "charizard-mega-x", false), (10196, "charizard-gmax", false)],
        ));
        api.add_pokemon(raw_pokemon(6, "charizard", &["fire", "flying"]));
        api.add_pokemon(raw_pokemon(10034, "charizard-mega-x", &["fire", "dragon"]));
        api.add_pokemon(raw_pokemon(10196, "charizard-gmax", &["fire", "flying"]));

        let mut base = raw_form(6, "charizard", "", 6);
        base.form_name = None;
        api.add_form(base);
        let mut mega = raw_form(10034, "charizard-mega-x", "mega-x", 10034);
        mega.is_battle_only = Some(true);
        api.add_form(mega);
        let mut gmax = raw_form(10196, "charizard-gmax", "gmax", 10196);
        gmax.is_battle_only = Some(true);
        api.add_form(gmax);
        Arc::new(api)
    }

    fn aggregator(api: Arc<FakePokeApi>, store: Arc<MemoryStore>) -> FormsAggregator {
        let settings = Aggregation {
            pacing_min_ms: 0,
            pacing_max_ms: 0,
            ..Default::default()
        };
        FormsAggregator::new(api, store, &settings)
    }

    #[tokio::test]
    async fn test_aggregates_all_levels_sorted_by_form_id() {
        let store = Arc::new(MemoryStore::new());
        let agg = aggregator(charizard_api(), store.clone());

        let result = agg.aggregate_species("Charizard").await;

        assert_eq!(result.species_id, 6);
        assert_eq!(
            result.forms.iter().map(|f| f.form_id).collect::<Vec<_>>(),
            vec![6, 10034, 10196]
        );
        assert!(result.forms[1].has_category(FormCategory::Mega));
        assert!(result.forms[2].has_category(FormCategory::Gigantamax));
        assert!(result.forms.iter().all(|f| f.pokemon_id == 6));
        assert_eq!(result.forms[1].variety_id, Some(10034));

        let stored = store.query_forms(&FormIndex::ByPokemonId(6)).await.unwrap();
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_tags_merge_into_cached_entity() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_entity(PokemonEntity::stub(6, "charizard"))
            .await
            .unwrap();
        let agg = aggregator(charizard_api(), store.clone());

        agg.aggregate_species("charizard").await;
        // second run converges on the same state
        agg.aggregate_species("charizard").await;

        let entity = store.get_entity(6).await.unwrap().unwrap();
        assert_eq!(
            entity.form_tags.into_iter().collect::<Vec<_>>(),
            vec![FormCategory::Mega, FormCategory::Gigantamax]
        );
        assert_eq!(store.query_forms(&FormIndex::ByPokemonId(6)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_species_yields_placeholder() {
        let api = charizard_api();
        api.add_species(raw_species(25, "pikachu", &[(25, "pikachu", true)]));
        api.add_pokemon(raw_pokemon(25, "pikachu", &["electric"]));
        api.fail("species/missingno");
        let agg = aggregator(api, Arc::new(MemoryStore::new()));

        let batch = agg
            .aggregate(&["pikachu".to_string(), "missingno".to_string(), "charizard".to_string()])
            .await;

        assert_eq!(batch.len(), 3);
        assert!(batch[0].is_placeholder());
        assert_eq!(batch[0].name, "missingno");
        assert!(batch[0].forms.is_empty());
        assert_eq!(batch[1].species_id, 6);
        assert_eq!(batch[2].species_id, 25);
        // pikachu's form detail is missing: skipped, species still present
        assert!(batch[2].forms.is_empty());
    }

    #[tokio::test]
    async fn test_forms_for_species_surfaces_not_found() {
        let agg = aggregator(charizard_api(), Arc::new(MemoryStore::new()));
        let err = agg.forms_for_species("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_forms_for_species_never_returns_placeholder() {
        let api = charizard_api();
        api.fail_once("species/charizard");
        let agg = aggregator(api.clone(), Arc::new(MemoryStore::new()));

        let err = agg.forms_for_species("charizard").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        // one species read, no second fetch just to report the error
        assert_eq!(api.calls(), 1);

        let result = agg.forms_for_species("charizard").await.unwrap();
        assert_eq!(result.species_id, 6);
        assert_eq!(result.forms.len(), 3);
    }
}
