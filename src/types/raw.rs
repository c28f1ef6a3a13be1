// Upstream payloads as PokeAPI returns them. Every field tolerates absence:
// arrays default to empty, scalars to `None`, so a partial payload still parses.

use serde::{Deserialize, Serialize};

/// `{ name, url }` reference used all over the upstream API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamedResource {
    pub name: String,
    pub url: String,
}

/// Bare `{ url }` reference (e.g. `evolution_chain`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlResource {
    pub url: String,
}

/// `GET /pokemon/{name|id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPokemon {
    pub id: u32,
    pub name: String,
    pub height: Option<u32>,
    pub weight: Option<u32>,
    pub base_experience: Option<u32>,
    pub is_default: Option<bool>,
    pub types: Vec<RawTypeSlot>,
    pub abilities: Vec<RawAbilitySlot>,
    pub stats: Vec<RawStat>,
    pub sprites: Option<RawSprites>,
    pub forms: Vec<NamedResource>,
    pub species: Option<NamedResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTypeSlot {
    pub slot: Option<u8>,
    #[serde(rename = "type")]
    pub type_ref: Option<NamedResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAbilitySlot {
    pub ability: Option<NamedResource>,
    pub is_hidden: bool,
    pub slot: Option<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawStat {
    pub stat: Option<NamedResource>,
    pub base_stat: Option<u32>,
    pub effort: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSprites {
    pub front_default: Option<String>,
    pub front_shiny: Option<String>,
    pub other: Option<RawOtherSprites>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOtherSprites {
    #[serde(rename = "official-artwork")]
    pub official_artwork: Option<RawArtwork>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawArtwork {
    pub front_default: Option<String>,
    pub front_shiny: Option<String>,
}

impl RawSprites {
    pub fn official_artwork(&self) -> Option<&str> {
        self.other
            .as_ref()
            .and_then(|o| o.official_artwork.as_ref())
            .and_then(|a| a.front_default.as_deref())
    }
}

/// `GET /pokemon-species/{name|id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSpecies {
    pub id: u32,
    pub name: String,
    pub varieties: Vec<RawVariety>,
    pub flavor_text_entries: Vec<RawFlavorText>,
    pub genera: Vec<RawGenus>,
    pub capture_rate: Option<u32>,
    pub base_happiness: Option<u32>,
    pub growth_rate: Option<NamedResource>,
    pub habitat: Option<NamedResource>,
    pub evolution_chain: Option<UrlResource>,
    pub generation: Option<NamedResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawVariety {
    pub is_default: bool,
    pub pokemon: NamedResource,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFlavorText {
    pub flavor_text: String,
    pub language: Option<NamedResource>,
    pub version: Option<NamedResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawGenus {
    pub genus: String,
    pub language: Option<NamedResource>,
}

/// `GET /pokemon-form/{name|id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawForm {
    pub id: u32,
    pub name: String,
    pub form_name: Option<String>,
    pub is_default: Option<bool>,
    pub is_battle_only: Option<bool>,
    pub is_mega: Option<bool>,
    pub is_gigantamax: Option<bool>,
    pub form_order: Option<i32>,
    pub version_group: Option<NamedResource>,
    pub pokemon: Option<NamedResource>,
    pub sprites: Option<RawSprites>,
}

/// `GET /pokedex/{slug}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPokedex {
    pub id: Option<u32>,
    pub name: Option<String>,
    pub pokemon_entries: Vec<RawPokedexEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawPokedexEntry {
    pub entry_number: Option<u32>,
    pub pokemon_species: NamedResource,
}

/// `GET /type`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTypeList {
    pub count: Option<u32>,
    pub results: Vec<NamedResource>,
}

/// `GET /evolution-chain/{id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEvolutionChain {
    pub id: u32,
    pub chain: RawChainLink,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawChainLink {
    pub species: NamedResource,
    pub evolves_to: Vec<RawChainLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_pokemon_payload_parses() {
        let json = r#"{"id": 25, "name": "pikachu", "base_experience": null}"#;
        let raw: RawPokemon = serde_json::from_str(json).unwrap();
        assert_eq!(raw.id, 25);
        assert!(raw.types.is_empty());
        assert!(raw.sprites.is_none());
        assert!(raw.base_experience.is_none());
    }

    #[test]
    fn test_official_artwork_lookup() {
        let json = r#"{
            "front_default": "front.png",
            "other": {"official-artwork": {"front_default": "art.png"}}
        }"#;
        let sprites: RawSprites = serde_json::from_str(json).unwrap();
        assert_eq!(sprites.official_artwork(), Some("art.png"));
    }
}
