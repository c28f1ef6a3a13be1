// src/normalization.rs
//
// Entity normalizer: flattens nested upstream payloads into the canonical cached shapes.
// Every fallback rule (sprites, generation, flavor text) lives here so call sites never
// coalesce optional upstream fields themselves.

use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::form_classifier::{classify, FormInput};
use crate::types::raw::{
    RawChainLink, RawEvolutionChain, RawForm, RawPokemon, RawSpecies, RawSprites,
};
use crate::types::{
    Ability, EvolutionStage, PokemonEntity, PokemonForm, SpeciesRecord, SpriteSet, Stat,
};
use crate::utils::parse_id_from_url;

/// Inclusive national-dex id ranges per generation.
pub const GENERATION_RANGES: [(u32, u32, u8); 9] = [
    (1, 151, 1),
    (152, 251, 2),
    (252, 386, 3),
    (387, 493, 4),
    (494, 649, 5),
    (650, 721, 6),
    (722, 809, 7),
    (810, 905, 8),
    (906, 1025, 9),
];

pub const MAX_GENERATION: u8 = 9;

/// Generation bucket for a national-dex id. Ids outside the table (form ids
/// above 10000, future dex numbers) have no derivable generation.
pub fn generation_for_id(id: u32) -> Option<u8> {
    GENERATION_RANGES
        .iter()
        .find(|(start, end, _)| (*start..=*end).contains(&id))
        .map(|(_, _, generation)| *generation)
}

/// Parses upstream generation names (`generation-iv`) into their number.
pub fn parse_generation_name(name: &str) -> Option<u8> {
    let numeral = name.trim().to_lowercase();
    let numeral = numeral.strip_prefix("generation-").unwrap_or(&numeral);
    let generation = match numeral {
        "i" => 1,
        "ii" => 2,
        "iii" => 3,
        "iv" => 4,
        "v" => 5,
        "vi" => 6,
        "vii" => 7,
        "viii" => 8,
        "ix" => 9,
        other => other.parse().ok()?,
    };
    (1..=MAX_GENERATION).contains(&generation).then_some(generation)
}

/// First English flavor text, reduced to one trimmed line.
pub fn select_flavor_text(species: &RawSpecies) -> Option<String> {
    species
        .flavor_text_entries
        .iter()
        .find(|entry| is_english(entry.language.as_ref().map(|l| l.name.as_str())))
        .map(|entry| clean_text(&entry.flavor_text))
        .filter(|text| !text.is_empty())
}

fn select_genus(species: &RawSpecies) -> Option<String> {
    species
        .genera
        .iter()
        .find(|g| is_english(g.language.as_ref().map(|l| l.name.as_str())))
        .map(|g| clean_text(&g.genus))
        .filter(|g| !g.is_empty())
}

fn is_english(language: Option<&str>) -> bool {
    language == Some("en")
}

/// Drops form feeds and line breaks and collapses runs of whitespace.
pub fn clean_text(text: &str) -> String {
    text.replace(['\u{c}', '\n', '\r'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Official artwork > front_default > previously cached > none.
pub fn resolve_sprites(raw: Option<&RawSprites>, previous: Option<&SpriteSet>) -> SpriteSet {
    let artwork = raw.and_then(|s| s.official_artwork()).map(str::to_string);
    let front = raw.and_then(|s| s.front_default.clone());
    let shiny = raw.and_then(|s| s.front_shiny.clone());

    SpriteSet {
        official_artwork: artwork
            .or_else(|| front.clone())
            .or_else(|| previous.and_then(|p| p.official_artwork.clone()))
            .or_else(|| previous.and_then(|p| p.front_default.clone())),
        front_default: front.or_else(|| previous.and_then(|p| p.front_default.clone())),
        front_shiny: shiny.or_else(|| previous.and_then(|p| p.front_shiny.clone())),
    }
}

fn flatten_types(raw: &RawPokemon) -> Vec<String> {
    let mut slots: Vec<(u8, String)> = raw
        .types
        .iter()
        .enumerate()
        .filter_map(|(i, t)| {
            let name = t.type_ref.as_ref()?.name.clone();
            Some((t.slot.unwrap_or(i as u8 + 1), name))
        })
        .filter(|(_, name)| !name.is_empty())
        .collect();
    // stable: missing slots keep payload order
    slots.sort_by_key(|(slot, _)| *slot);
    let mut seen = HashSet::new();
    slots
        .into_iter()
        .map(|(_, name)| name)
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

fn flatten_abilities(raw: &RawPokemon) -> Vec<Ability> {
    let mut seen = HashSet::new();
    raw.abilities
        .iter()
        .filter_map(|slot| {
            let name = slot.ability.as_ref()?.name.clone();
            (!name.is_empty() && seen.insert(name.clone())).then_some(Ability {
                name,
                is_hidden: slot.is_hidden,
            })
        })
        .collect()
}

fn flatten_stats(raw: &RawPokemon) -> Vec<Stat> {
    raw.stats
        .iter()
        .filter_map(|s| {
            let name = s.stat.as_ref()?.name.clone();
            Some(Stat {
                name,
                base_stat: s.base_stat.unwrap_or(0),
                effort: s.effort.unwrap_or(0),
            })
        })
        .collect()
}

/// Builds the canonical entity.
///
/// Generation precedence: the species' explicit generation, then the id table,
/// then whatever the previously cached copy had. The form payload, when given,
/// contributes its classification to `form_tags` and its sprites as a fallback.
pub fn normalize_pokemon(
    raw: &RawPokemon,
    species: Option<&RawSpecies>,
    form: Option<&RawForm>,
    previous: Option<&PokemonEntity>,
) -> PokemonEntity {
    let id = previous.map(|p| p.id).unwrap_or(raw.id);

    let fallback_sprites = match (previous, form.and_then(|f| f.sprites.as_ref())) {
        (Some(p), _) => Some(p.sprites.clone()),
        (None, Some(form_sprites)) => Some(resolve_sprites(Some(form_sprites), None)),
        (None, None) => None,
    };
    let sprites = resolve_sprites(raw.sprites.as_ref(), fallback_sprites.as_ref());

    let generation = species
        .and_then(|s| s.generation.as_ref())
        .and_then(|g| parse_generation_name(&g.name))
        .or_else(|| generation_for_id(id))
        .or_else(|| previous.and_then(|p| p.generation));

    let mut form_tags: BTreeSet<_> = previous
        .map(|p| p.form_tags.clone())
        .unwrap_or_default();
    if let Some(form) = form {
        form_tags.extend(classify(&FormInput::from(form)).categories());
    }

    let name = if raw.name.is_empty() {
        previous.map(|p| p.name.clone()).unwrap_or_default()
    } else {
        raw.name.to_lowercase()
    };

    PokemonEntity {
        id,
        name,
        height: raw.height.or(previous.map(|p| p.height)).unwrap_or(0),
        weight: raw.weight.or(previous.map(|p| p.weight)).unwrap_or(0),
        base_experience: raw
            .base_experience
            .or_else(|| previous.and_then(|p| p.base_experience)),
        types: flatten_types(raw),
        abilities: flatten_abilities(raw),
        stats: flatten_stats(raw),
        sprites,
        generation,
        form_tags,
    }
}

pub fn normalize_species(raw: &RawSpecies) -> SpeciesRecord {
    SpeciesRecord {
        id: raw.id,
        name: raw.name.to_lowercase(),
        flavor_text: select_flavor_text(raw),
        genus: select_genus(raw),
        capture_rate: raw.capture_rate,
        base_happiness: raw.base_happiness,
        growth_rate: raw.growth_rate.as_ref().map(|r| r.name.clone()),
        habitat: raw.habitat.as_ref().map(|r| r.name.clone()),
        evolution_chain_id: raw
            .evolution_chain
            .as_ref()
            .and_then(|c| parse_id_from_url(&c.url)),
        generation: raw
            .generation
            .as_ref()
            .and_then(|g| parse_generation_name(&g.name))
            .or_else(|| generation_for_id(raw.id)),
        varieties: raw
            .varieties
            .iter()
            .map(|v| v.pokemon.name.clone())
            .filter(|n| !n.is_empty())
            .collect(),
    }
}

/// Builds a cached form row. `species_id`/`species_name` identify the owning
/// national-dex entity; `variety_id` is the pokemon resource the form hangs off.
pub fn normalize_form(
    raw: &RawForm,
    species_id: u32,
    species_name: &str,
    variety_id: Option<u32>,
) -> PokemonForm {
    let variety_id = variety_id.or_else(|| {
        raw.pokemon
            .as_ref()
            .and_then(|p| parse_id_from_url(&p.url))
    });
    PokemonForm {
        form_id: raw.id,
        pokemon_id: species_id,
        pokemon_name: species_name.to_lowercase(),
        variety_id,
        name: raw.name.to_lowercase(),
        form_name: raw
            .form_name
            .as_ref()
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty()),
        categories: classify(&FormInput::from(raw)).categories(),
        is_default: raw.is_default.unwrap_or(true),
        is_battle_only: raw.is_battle_only.unwrap_or(false),
        form_order: raw.form_order,
        sprites: resolve_sprites(raw.sprites.as_ref(), None),
    }
}

/// Breadth-first flattening of an evolution tree; the root is stage 1.
pub fn flatten_evolution_chain(raw: &RawEvolutionChain) -> Vec<EvolutionStage> {
    let mut stages = Vec::new();
    let mut queue: VecDeque<(&RawChainLink, u8, Option<u32>)> = VecDeque::new();
    queue.push_back((&raw.chain, 1, None));

    while let Some((link, stage, evolves_from)) = queue.pop_front() {
        let Some(species_id) = parse_id_from_url(&link.species.url) else {
            continue;
        };
        stages.push(EvolutionStage {
            species_id,
            name: link.species.name.clone(),
            stage,
            evolves_from,
        });
        for next in &link.evolves_to {
            queue.push_back((next, stage.saturating_add(1), Some(species_id)));
        }
    }
    stages
}
