// In-memory cache store. One DashMap per logical table; secondary indexes are
// evaluated by scan, which is fine at national-dex scale (~1k entities, ~2k forms).

use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use std::collections::BTreeSet;

use super::{sort_forms, CacheScope, CacheStore, EntityIndex, FormIndex, StoreError};
use crate::metrics;
use crate::types::{
    Favorite, FormCategory, GenderDifferenceDescription, PokemonEntity, PokemonForm,
    RegionalDexEntry, SpeciesRecord,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entities: DashMap<u32, PokemonEntity>,
    forms: DashMap<u32, PokemonForm>,
    species: DashMap<u32, SpeciesRecord>,
    gender: DashMap<u32, GenderDifferenceDescription>,
    regional: DashMap<(String, u32), RegionalDexEntry>,
    favorites: DashMap<(String, u32), Favorite>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_sizes(&self) {
        metrics::set_cache_size("entities", self.entities.len() as f64);
        metrics::set_cache_size("forms", self.forms.len() as f64);
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert_entity(&self, entity: PokemonEntity) -> Result<u32, StoreError> {
        let id = entity.id;
        if id == 0 {
            return Err(StoreError::Conflict("entity id 0 is reserved".to_string()));
        }
        self.entities
            .entry(id)
            .and_modify(|cached| cached.merge_from(entity.clone()))
            .or_insert(entity);
        self.record_sizes();
        Ok(id)
    }

    async fn get_entity(&self, id: u32) -> Result<Option<PokemonEntity>, StoreError> {
        Ok(self.entities.get(&id).map(|e| e.clone()))
    }

    async fn query_entities(&self, index: &EntityIndex) -> Result<Vec<PokemonEntity>, StoreError> {
        if let EntityIndex::ById(id) = index {
            return Ok(self.get_entity(*id).await?.into_iter().collect());
        }
        let mut rows: Vec<PokemonEntity> = self
            .entities
            .iter()
            .filter(|e| index.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
        Ok(rows)
    }

    async fn merge_entity_tags(
        &self,
        id: u32,
        tags: &BTreeSet<FormCategory>,
    ) -> Result<bool, StoreError> {
        match self.entities.get_mut(&id) {
            Some(mut entity) => Ok(entity.merge_form_tags(tags.iter().copied())),
            None => {
                debug!("Tag merge skipped, entity {} not cached yet", id);
                Ok(false)
            }
        }
    }

    async fn count_entities(&self) -> Result<usize, StoreError> {
        Ok(self.entities.len())
    }

    async fn upsert_form(&self, form: PokemonForm) -> Result<u32, StoreError> {
        let form_id = form.form_id;
        self.forms
            .entry(form_id)
            .and_modify(|cached| cached.merge_from(form.clone()))
            .or_insert(form);
        self.record_sizes();
        Ok(form_id)
    }

    async fn query_forms(&self, index: &FormIndex) -> Result<Vec<PokemonForm>, StoreError> {
        let mut rows: Vec<PokemonForm> = match index {
            FormIndex::ByFormId(id) => self.forms.get(id).map(|f| f.clone()).into_iter().collect(),
            _ => self
                .forms
                .iter()
                .filter(|f| index.matches(f.value()))
                .map(|f| f.value().clone())
                .collect(),
        };
        sort_forms(&mut rows);
        Ok(rows)
    }

    async fn upsert_species(&self, species: SpeciesRecord) -> Result<u32, StoreError> {
        let id = species.id;
        self.species.insert(id, species);
        Ok(id)
    }

    async fn get_species(&self, id: u32) -> Result<Option<SpeciesRecord>, StoreError> {
        Ok(self.species.get(&id).map(|s| s.clone()))
    }

    async fn get_species_by_name(&self, name: &str) -> Result<Option<SpeciesRecord>, StoreError> {
        let name = name.to_lowercase();
        Ok(self
            .species
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.value().clone())
            .min_by_key(|s| s.id))
    }

    async fn upsert_gender_description(
        &self,
        description: GenderDifferenceDescription,
    ) -> Result<u32, StoreError> {
        let id = description.pokemon_id;
        self.gender.insert(id, description);
        Ok(id)
    }

    async fn get_gender_description(
        &self,
        pokemon_id: u32,
    ) -> Result<Option<GenderDifferenceDescription>, StoreError> {
        Ok(self.gender.get(&pokemon_id).map(|g| g.clone()))
    }

    async fn get_gender_description_by_name(
        &self,
        name: &str,
    ) -> Result<Option<GenderDifferenceDescription>, StoreError> {
        let name = name.to_lowercase();
        Ok(self
            .gender
            .iter()
            .filter(|g| g.name == name)
            .map(|g| g.value().clone())
            .min_by_key(|g| g.pokemon_id))
    }

    async fn upsert_regional_entries(&self, entries: Vec<RegionalDexEntry>) -> Result<usize, StoreError> {
        let count = entries.len();
        for entry in entries {
            self.regional
                .insert((entry.region.clone(), entry.dex_id), entry);
        }
        Ok(count)
    }

    async fn query_region(&self, region: &str) -> Result<Vec<RegionalDexEntry>, StoreError> {
        let mut rows: Vec<RegionalDexEntry> = self
            .regional
            .iter()
            .filter(|e| e.key().0 == region)
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|e| e.dex_id);
        Ok(rows)
    }

    async fn purge_region(&self, region: &str) -> Result<usize, StoreError> {
        let before = self.regional.len();
        self.regional.retain(|(r, _), _| r != region);
        Ok(before - self.regional.len())
    }

    async fn insert_favorite(&self, favorite: Favorite) -> Result<(), StoreError> {
        let key = (favorite.user_id.clone(), favorite.pokemon_id);
        match self.favorites.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "pokemon {} is already a favorite of {}",
                favorite.pokemon_id, favorite.user_id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(favorite);
                Ok(())
            }
        }
    }

    async fn delete_favorite(&self, user_id: &str, pokemon_id: u32) -> Result<(), StoreError> {
        self.favorites
            .remove(&(user_id.to_string(), pokemon_id))
            .map(|_| ())
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "pokemon {} is not a favorite of {}",
                    pokemon_id, user_id
                ))
            })
    }

    async fn get_favorite(&self, user_id: &str, pokemon_id: u32) -> Result<Option<Favorite>, StoreError> {
        Ok(self
            .favorites
            .get(&(user_id.to_string(), pokemon_id))
            .map(|f| f.clone()))
    }

    async fn list_favorites(&self, user_id: &str) -> Result<Vec<Favorite>, StoreError> {
        let mut rows: Vec<Favorite> = self
            .favorites
            .iter()
            .filter(|f| f.user_id == user_id)
            .map(|f| f.value().clone())
            .collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.pokemon_id.cmp(&b.pokemon_id))
        });
        Ok(rows)
    }

    async fn clear(&self, scopes: &[CacheScope]) -> Result<(), StoreError> {
        for scope in scopes {
            match scope {
                CacheScope::Pokemon => self.entities.clear(),
                CacheScope::Species => self.species.clear(),
                CacheScope::Forms => self.forms.clear(),
                CacheScope::Regional => self.regional.clear(),
                CacheScope::Gender => self.gender.clear(),
            }
            debug!("Cleared {} cache", scope);
        }
        self.record_sizes();
        Ok(())
    }
}
