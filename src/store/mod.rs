//! Cache store: the indexed, durable home of every aggregated record.
//!
//! Upserts are "insert or patch by unique key": an incoming entity is merged
//! into the cached one (`PokemonEntity::merge_from`), so repeating an upsert
//! converges on the same row and `form_tags` only ever grows. Lookups on
//! non-unique keys (name) take the first match by id instead of failing.
//!
//! Two backends ship with the crate: [`memory::MemoryStore`] (DashMap tables)
//! and [`crate::database::PgStore`] (Postgres via sqlx).

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::types::{
    Favorite, FormCategory, GenderDifferenceDescription, PokemonEntity, PokemonForm,
    RegionalDexEntry, SpeciesRecord,
};

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Tables a cache clear can target. Favorites are never clearable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheScope {
    Pokemon,
    Species,
    Forms,
    Regional,
    Gender,
}

impl CacheScope {
    pub const ALL: [CacheScope; 5] = [
        CacheScope::Pokemon,
        CacheScope::Species,
        CacheScope::Forms,
        CacheScope::Regional,
        CacheScope::Gender,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheScope::Pokemon => "pokemon",
            CacheScope::Species => "species",
            CacheScope::Forms => "forms",
            CacheScope::Regional => "regional",
            CacheScope::Gender => "gender",
        }
    }
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheScope::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("Unknown cache scope: {}", s))
    }
}

/// Secondary indexes over the entities table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityIndex {
    ById(u32),
    /// Exact lowercase name; may match several rows.
    ByName(String),
    ByGeneration(u8),
    /// Case-insensitive substring on name.
    NameSearch(String),
    ByFormTag(FormCategory),
    /// Inclusive id range.
    IdRange(u32, u32),
    All,
}

impl EntityIndex {
    pub fn label(&self) -> &'static str {
        match self {
            EntityIndex::ById(_) => "by_id",
            EntityIndex::ByName(_) => "by_name",
            EntityIndex::ByGeneration(_) => "by_generation",
            EntityIndex::NameSearch(_) => "name_search",
            EntityIndex::ByFormTag(_) => "by_form_tag",
            EntityIndex::IdRange(_, _) => "id_range",
            EntityIndex::All => "full_scan",
        }
    }

    pub fn matches(&self, entity: &PokemonEntity) -> bool {
        match self {
            EntityIndex::ById(id) => entity.id == *id,
            EntityIndex::ByName(name) => entity.name == name.to_lowercase(),
            EntityIndex::ByGeneration(generation) => entity.generation == Some(*generation),
            EntityIndex::NameSearch(term) => entity.name.contains(&term.trim().to_lowercase()),
            EntityIndex::ByFormTag(tag) => entity.form_tags.contains(tag),
            EntityIndex::IdRange(from, to) => (*from..=*to).contains(&entity.id),
            EntityIndex::All => true,
        }
    }
}

/// Secondary indexes over the forms table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormIndex {
    ByFormId(u32),
    ByPokemonId(u32),
    ByPokemonName(String),
    ByCategory(FormCategory),
}

impl FormIndex {
    pub fn matches(&self, form: &PokemonForm) -> bool {
        match self {
            FormIndex::ByFormId(id) => form.form_id == *id,
            FormIndex::ByPokemonId(id) => form.pokemon_id == *id,
            FormIndex::ByPokemonName(name) => form.pokemon_name == name.to_lowercase(),
            FormIndex::ByCategory(category) => form.has_category(*category),
        }
    }
}

/// Forms of one species in display order: form order, then form id.
pub fn sort_forms(forms: &mut [PokemonForm]) {
    forms.sort_by(|a, b| {
        (a.pokemon_id, a.form_order.unwrap_or(i32::MAX), a.form_id).cmp(&(
            b.pokemon_id,
            b.form_order.unwrap_or(i32::MAX),
            b.form_id,
        ))
    });
}

/// Persistence contract shared by every backend.
///
/// Read paths return `Ok(None)` / empty vectors for absent rows; only
/// mutations that require existence (favorites) return `NotFound`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn name(&self) -> &'static str;

    // Entities

    /// Inserts or merges by id; returns the stored id.
    async fn upsert_entity(&self, entity: PokemonEntity) -> Result<u32, StoreError>;

    async fn get_entity(&self, id: u32) -> Result<Option<PokemonEntity>, StoreError>;

    /// Rows matching `index`, ascending by id.
    async fn query_entities(&self, index: &EntityIndex) -> Result<Vec<PokemonEntity>, StoreError>;

    /// Unions `tags` into the cached entity's `form_tags`. Returns false when the
    /// entity is not cached or nothing new was added.
    async fn merge_entity_tags(
        &self,
        id: u32,
        tags: &BTreeSet<FormCategory>,
    ) -> Result<bool, StoreError>;

    async fn count_entities(&self) -> Result<usize, StoreError>;

    // Forms

    /// Inserts or merges by form id; categories are unioned.
    async fn upsert_form(&self, form: PokemonForm) -> Result<u32, StoreError>;

    /// Rows matching `index` in [`sort_forms`] order.
    async fn query_forms(&self, index: &FormIndex) -> Result<Vec<PokemonForm>, StoreError>;

    // Species

    async fn upsert_species(&self, species: SpeciesRecord) -> Result<u32, StoreError>;

    async fn get_species(&self, id: u32) -> Result<Option<SpeciesRecord>, StoreError>;

    async fn get_species_by_name(&self, name: &str) -> Result<Option<SpeciesRecord>, StoreError>;

    // Gender-difference descriptions

    async fn upsert_gender_description(
        &self,
        description: GenderDifferenceDescription,
    ) -> Result<u32, StoreError>;

    async fn get_gender_description(
        &self,
        pokemon_id: u32,
    ) -> Result<Option<GenderDifferenceDescription>, StoreError>;

    async fn get_gender_description_by_name(
        &self,
        name: &str,
    ) -> Result<Option<GenderDifferenceDescription>, StoreError>;

    // Regional dex

    /// Inserts or replaces by `(region, dex_id)`.
    async fn upsert_regional_entries(&self, entries: Vec<RegionalDexEntry>) -> Result<usize, StoreError>;

    /// Entries of `region` ascending by dex id.
    async fn query_region(&self, region: &str) -> Result<Vec<RegionalDexEntry>, StoreError>;

    /// Removes every entry of `region`; returns how many were removed.
    async fn purge_region(&self, region: &str) -> Result<usize, StoreError>;

    // Favorites

    /// Fails with `Conflict` when the pair already exists.
    async fn insert_favorite(&self, favorite: Favorite) -> Result<(), StoreError>;

    /// Fails with `NotFound` when the pair does not exist.
    async fn delete_favorite(&self, user_id: &str, pokemon_id: u32) -> Result<(), StoreError>;

    async fn get_favorite(&self, user_id: &str, pokemon_id: u32) -> Result<Option<Favorite>, StoreError>;

    /// Favorites of `user_id`, oldest first.
    async fn list_favorites(&self, user_id: &str) -> Result<Vec<Favorite>, StoreError>;

    // Maintenance

    /// Wipes exactly the tables named by `scopes`.
    async fn clear(&self, scopes: &[CacheScope]) -> Result<(), StoreError>;
}
