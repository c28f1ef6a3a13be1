use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Fixed form taxonomy. Declaration order is the classifier's precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormCategory {
    Mega,
    Gigantamax,
    Regional,
    Gender,
    Cosmetic,
    Alternate,
}

impl FormCategory {
    pub const ALL: [FormCategory; 6] = [
        FormCategory::Mega,
        FormCategory::Gigantamax,
        FormCategory::Regional,
        FormCategory::Gender,
        FormCategory::Cosmetic,
        FormCategory::Alternate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FormCategory::Mega => "mega",
            FormCategory::Gigantamax => "gigantamax",
            FormCategory::Regional => "regional",
            FormCategory::Gender => "gender",
            FormCategory::Cosmetic => "cosmetic",
            FormCategory::Alternate => "alternate",
        }
    }
}

impl fmt::Display for FormCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown form category: {0}")]
pub struct UnknownCategoryError(pub String);

impl FromStr for FormCategory {
    type Err = UnknownCategoryError;

    /// Accepts canonical names and the aliases used by filter UIs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "mega" => Ok(FormCategory::Mega),
            "gigantamax" | "gmax" => Ok(FormCategory::Gigantamax),
            "regional" | "region" => Ok(FormCategory::Regional),
            "gender" | "gender-diff" | "gender-difference" | "gender_diff" => {
                Ok(FormCategory::Gender)
            }
            "cosmetic" => Ok(FormCategory::Cosmetic),
            "alternate" | "alt" | "other" => Ok(FormCategory::Alternate),
            _ => Err(UnknownCategoryError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ability {
    pub name: String,
    pub is_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    pub name: String,
    pub base_stat: u32,
    pub effort: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpriteSet {
    pub front_default: Option<String>,
    pub front_shiny: Option<String>,
    pub official_artwork: Option<String>,
}

impl SpriteSet {
    /// Best single image for grids: artwork first, then the plain front sprite.
    pub fn display(&self) -> Option<&str> {
        self.official_artwork
            .as_deref()
            .or(self.front_default.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.front_default.is_none() && self.front_shiny.is_none() && self.official_artwork.is_none()
    }

    fn fill_missing_from(&mut self, previous: &SpriteSet) {
        if self.front_default.is_none() {
            self.front_default = previous.front_default.clone();
        }
        if self.front_shiny.is_none() {
            self.front_shiny = previous.front_shiny.clone();
        }
        if self.official_artwork.is_none() {
            self.official_artwork = previous.official_artwork.clone();
        }
    }
}

/// Canonical cached pokemon record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PokemonEntity {
    pub id: u32,
    pub name: String,
    pub height: u32,
    pub weight: u32,
    pub base_experience: Option<u32>,
    pub types: Vec<String>,
    pub abilities: Vec<Ability>,
    pub stats: Vec<Stat>,
    pub sprites: SpriteSet,
    pub generation: Option<u8>,
    pub form_tags: BTreeSet<FormCategory>,
}

impl PokemonEntity {
    /// Minimal record for an id known only by name (e.g. from a dex listing).
    pub fn stub(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            height: 0,
            weight: 0,
            base_experience: None,
            types: Vec::new(),
            abilities: Vec::new(),
            stats: Vec::new(),
            sprites: SpriteSet::default(),
            generation: crate::normalization::generation_for_id(id),
            form_tags: BTreeSet::new(),
        }
    }

    pub fn has_form_tags(&self) -> bool {
        !self.form_tags.is_empty()
    }

    /// Applies a fresher copy of the same record.
    ///
    /// `id` never changes, mutable fields are last-write-wins, optional fields keep
    /// the cached value when the incoming copy lacks one, and `form_tags` only grows.
    pub fn merge_from(&mut self, incoming: PokemonEntity) {
        let PokemonEntity {
            id: _,
            name,
            height,
            weight,
            base_experience,
            types,
            abilities,
            stats,
            mut sprites,
            generation,
            form_tags,
        } = incoming;

        if !name.is_empty() {
            self.name = name;
        }
        if height > 0 {
            self.height = height;
        }
        if weight > 0 {
            self.weight = weight;
        }
        if base_experience.is_some() {
            self.base_experience = base_experience;
        }
        if !types.is_empty() {
            self.types = types;
        }
        if !abilities.is_empty() {
            self.abilities = abilities;
        }
        if !stats.is_empty() {
            self.stats = stats;
        }
        sprites.fill_missing_from(&self.sprites);
        self.sprites = sprites;
        if generation.is_some() {
            self.generation = generation;
        }
        self.form_tags.extend(form_tags);
    }

    /// Returns true when at least one new tag was added.
    pub fn merge_form_tags<I: IntoIterator<Item = FormCategory>>(&mut self, tags: I) -> bool {
        let before = self.form_tags.len();
        self.form_tags.extend(tags);
        self.form_tags.len() > before
    }
}

/// A named game variant owned by a national-dex entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PokemonForm {
    pub form_id: u32,
    /// Owning national-dex entity (the species id).
    pub pokemon_id: u32,
    pub pokemon_name: String,
    /// The variety (pokemon resource) the form belongs to; differs from
    /// `pokemon_id` for megas, regionals and other non-default varieties.
    pub variety_id: Option<u32>,
    pub name: String,
    pub form_name: Option<String>,
    pub categories: BTreeSet<FormCategory>,
    pub is_default: bool,
    pub is_battle_only: bool,
    pub form_order: Option<i32>,
    pub sprites: SpriteSet,
}

impl PokemonForm {
    pub fn has_category(&self, category: FormCategory) -> bool {
        self.categories.contains(&category)
    }

    pub fn merge_from(&mut self, incoming: PokemonForm) {
        let categories = std::mem::take(&mut self.categories);
        let previous_sprites = std::mem::take(&mut self.sprites);
        *self = incoming;
        self.categories.extend(categories);
        self.sprites.fill_missing_from(&previous_sprites);
    }
}

/// Species-level details not carried by the pokemon resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesRecord {
    pub id: u32,
    pub name: String,
    pub flavor_text: Option<String>,
    pub genus: Option<String>,
    pub capture_rate: Option<u32>,
    pub base_happiness: Option<u32>,
    pub growth_rate: Option<String>,
    pub habitat: Option<String>,
    pub evolution_chain_id: Option<u32>,
    pub generation: Option<u8>,
    pub varieties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionStage {
    pub species_id: u32,
    pub name: String,
    pub stage: u8,
    pub evolves_from: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenderDifferenceDescription {
    pub pokemon_id: u32,
    pub name: String,
    pub description: String,
    pub fetched_at: DateTime<Utc>,
    pub source_url: String,
}

impl GenderDifferenceDescription {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: ChronoDuration) -> bool {
        now.signed_duration_since(self.fetched_at) < ttl
    }
}

/// Read-optimised row of a regional dex; rebuilt wholesale per region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalDexEntry {
    pub region: String,
    pub dex_id: u32,
    pub name: String,
    pub types: Vec<String>,
    pub sprite: Option<String>,
    pub forms: Vec<PokemonForm>,
}

impl RegionalDexEntry {
    pub fn is_denormalized(&self) -> bool {
        !self.types.is_empty() && self.sprite.is_some()
    }
}

/// Result of the alternate-forms aggregation for one species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesForms {
    pub species_id: u32,
    pub name: String,
    pub forms: Vec<PokemonForm>,
}

impl SpeciesForms {
    /// Visible stand-in for a species whose fetch failed.
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            species_id: 0,
            name: name.into(),
            forms: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.species_id == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub user_id: String,
    pub pokemon_id: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: u32) -> PokemonEntity {
        let mut e = PokemonEntity::stub(id, "charizard");
        e.types = vec!["fire".to_string(), "flying".to_string()];
        e.sprites.official_artwork = Some("art.png".to_string());
        e
    }

    #[test]
    fn test_category_aliases() {
        assert_eq!("gmax".parse::<FormCategory>().unwrap(), FormCategory::Gigantamax);
        assert_eq!("gender-diff".parse::<FormCategory>().unwrap(), FormCategory::Gender);
        assert_eq!(" MEGA ".parse::<FormCategory>().unwrap(), FormCategory::Mega);
        assert!("shiny".parse::<FormCategory>().is_err());
    }

    #[test]
    fn test_merge_keeps_id_and_grows_tags() {
        let mut cached = entity(6);
        cached.form_tags.insert(FormCategory::Mega);

        let mut incoming = entity(6);
        incoming.id = 999;
        incoming.sprites = SpriteSet::default();
        incoming.form_tags.insert(FormCategory::Gigantamax);
        incoming.height = 17;

        cached.merge_from(incoming);

        assert_eq!(cached.id, 6);
        assert_eq!(cached.height, 17);
        assert_eq!(cached.sprites.official_artwork.as_deref(), Some("art.png"));
        assert_eq!(
            cached.form_tags.iter().copied().collect::<Vec<_>>(),
            vec![FormCategory::Mega, FormCategory::Gigantamax]
        );
    }

    #[test]
    fn test_merge_form_tags_reports_growth() {
        let mut e = entity(6);
        assert!(e.merge_form_tags([FormCategory::Mega]));
        assert!(!e.merge_form_tags([FormCategory::Mega]));
        assert_eq!(e.form_tags.len(), 1);
    }

    #[test]
    fn test_gender_description_freshness() {
        let now = Utc::now();
        let row = GenderDifferenceDescription {
            pokemon_id: 25,
            name: "pikachu".to_string(),
            description: "tail".to_string(),
            fetched_at: now - ChronoDuration::days(31),
            source_url: "https://example.test".to_string(),
        };
        assert!(!row.is_fresh(now, ChronoDuration::days(30)));
        assert!(row.is_fresh(now, ChronoDuration::days(45)));
    }
}
