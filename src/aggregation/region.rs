// Region aggregation: one region key → one or more upstream pokedex slugs →
// merged, deduplicated species list.

use futures::future::join_all;
use indexmap::IndexMap;
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

use super::AggregationError;
use crate::metrics;
use crate::poke_api::PokeApi;
use crate::retry_fetch::FetchError;
use crate::types::raw::RawPokedex;
use crate::utils::parse_id_from_url;

const PIPELINE: &str = "region";

/// Region key → upstream pokedex slugs, merged in this order.
pub const REGIONS: &[(&str, &[&str])] = &[
    ("kanto", &["kanto"]),
    ("johto", &["original-johto"]),
    ("hoenn", &["hoenn"]),
    ("sinnoh", &["original-sinnoh"]),
    ("unova", &["original-unova"]),
    ("kalos", &["kalos-central", "kalos-coastal", "kalos-mountain"]),
    ("alola", &["original-alola"]),
    ("galar", &["galar", "isle-of-armor", "crown-tundra"]),
    ("hisui", &["hisui"]),
    ("paldea", &["paldea", "kitakami", "blueberry"]),
    ("national", &["national"]),
];

pub fn region_slugs(region: &str) -> Option<&'static [&'static str]> {
    let region = region.trim().to_lowercase();
    REGIONS
        .iter()
        .find(|(key, _)| *key == region)
        .map(|(_, slugs)| *slugs)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSpecies {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionAggregate {
    pub region: String,
    /// Ascending by species id.
    pub species: Vec<RegionSpecies>,
    pub failed_slugs: Vec<String>,
}

impl RegionAggregate {
    pub fn is_partial(&self) -> bool {
        !self.failed_slugs.is_empty()
    }
}

/// First-seen name wins; the result is sorted by id.
pub fn merge_pokedexes<'a, I>(pokedexes: I) -> Vec<RegionSpecies>
where
    I: IntoIterator<Item = &'a RawPokedex>,
{
    let mut merged: IndexMap<u32, String> = IndexMap::new();
    for pokedex in pokedexes {
        for entry in &pokedex.pokemon_entries {
            let species = &entry.pokemon_species;
            match parse_id_from_url(&species.url) {
                Some(id) => {
                    merged.entry(id).or_insert_with(|| species.name.clone());
                }
                None => warn!("⚠️ Pokedex entry without species id: {}", species.name),
            }
        }
    }
    merged.sort_keys();
    merged
        .into_iter()
        .map(|(id, name)| RegionSpecies { id, name })
        .collect()
}

pub struct RegionAggregator {
    api: Arc<dyn PokeApi>,
}

impl RegionAggregator {
    pub fn new(api: Arc<dyn PokeApi>) -> Self {
        Self { api }
    }

    /// Fetches every slug of `region` and merges them. A failing slug is logged
    /// and skipped; only when all of them fail is the region an error.
    #[instrument(skip(self))]
    pub async fn aggregate_region(&self, region: &str) -> Result<RegionAggregate, AggregationError> {
        let start = Instant::now();
        let key = region.trim().to_lowercase();
        let slugs = region_slugs(&key).ok_or_else(|| AggregationError::UnknownRegion(key.clone()))?;

        let results = join_all(slugs.iter().map(|slug| self.api.pokedex(slug))).await;

        let mut pokedexes = Vec::with_capacity(slugs.len());
        let mut failed_slugs = Vec::new();
        let mut last_error: Option<FetchError> = None;
        for (slug, result) in slugs.iter().zip(results) {
            match result {
                Ok(pokedex) => pokedexes.push(pokedex),
                Err(e) => {
                    warn!("⚠️ Pokedex {} of region {} failed: {}", slug, key, e);
                    metrics::increment_aggregation_failure(PIPELINE);
                    failed_slugs.push(slug.to_string());
                    last_error = Some(e);
                }
            }
        }

        if pokedexes.is_empty() {
            if let Some(last) = last_error {
                return Err(AggregationError::AllSourcesFailed { region: key, last });
            }
        }

        let species = merge_pokedexes(&pokedexes);
        metrics::record_aggregation(PIPELINE, start.elapsed(), species.len() as u64);
        info!(
            "✅ Region {}: {} species from {}/{} pokedexes",
            key,
            species.len(),
            pokedexes.len(),
            slugs.len()
        );

        Ok(RegionAggregate {
            region: key,
            species,
            failed_slugs,
        })
    }
}
