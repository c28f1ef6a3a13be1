//! Data shapes shared across the SDK.
//!
//! `raw` models the upstream PokeAPI payloads with every field optional;
//! `entity` holds the canonical, cached records the rest of the crate works with.

pub mod entity;
pub mod raw;

pub use entity::{
    Ability, EvolutionStage, Favorite, FormCategory, GenderDifferenceDescription, PokemonEntity,
    PokemonForm, RegionalDexEntry, SpeciesForms, SpeciesRecord, SpriteSet, Stat,
    UnknownCategoryError,
};
