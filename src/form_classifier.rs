// Form Classifier - maps a form/variety record onto the fixed category taxonomy.
// Rule order is significant: changing it changes the outcome for edge-case names.

use std::collections::BTreeSet;

use crate::types::raw::RawForm;
use crate::types::FormCategory;

/// Name fragments that mark a regional variant.
pub const REGIONAL_HINTS: [&str; 8] = [
    "alola", "alolan", "galar", "galarian", "hisui", "hisuian", "paldea", "paldean",
];

/// The fields the rules look at. Flags are tri-state: `None` means the source
/// did not say.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormInput<'a> {
    pub name: &'a str,
    pub form_name: Option<&'a str>,
    pub is_mega: Option<bool>,
    pub is_gigantamax: Option<bool>,
    pub is_battle_only: Option<bool>,
    pub is_default: Option<bool>,
}

impl<'a> FormInput<'a> {
    /// A species variety (pokemon reference) carries only a name and the default flag.
    pub fn variety(name: &'a str, is_default: bool) -> Self {
        Self {
            name,
            is_default: Some(is_default),
            ..Default::default()
        }
    }
}

impl<'a> From<&'a RawForm> for FormInput<'a> {
    fn from(raw: &'a RawForm) -> Self {
        Self {
            name: &raw.name,
            form_name: raw.form_name.as_deref(),
            is_mega: raw.is_mega,
            is_gigantamax: raw.is_gigantamax,
            is_battle_only: raw.is_battle_only,
            is_default: raw.is_default,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormClassification {
    pub is_mega: bool,
    pub is_gigantamax: bool,
    pub is_regional: bool,
    pub is_gender: bool,
    pub is_cosmetic: bool,
    pub is_alternate: bool,
}

impl FormClassification {
    pub fn categories(&self) -> BTreeSet<FormCategory> {
        let flags = [
            (self.is_mega, FormCategory::Mega),
            (self.is_gigantamax, FormCategory::Gigantamax),
            (self.is_regional, FormCategory::Regional),
            (self.is_gender, FormCategory::Gender),
            (self.is_cosmetic, FormCategory::Cosmetic),
            (self.is_alternate, FormCategory::Alternate),
        ];
        flags
            .into_iter()
            .filter(|(set, _)| *set)
            .map(|(_, category)| category)
            .collect()
    }

    /// First category in precedence order.
    pub fn primary(&self) -> Option<FormCategory> {
        self.categories().into_iter().next()
    }

    pub fn count(&self) -> usize {
        self.categories().len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

fn contains_any(haystacks: &[&str], needles: &[&str]) -> bool {
    haystacks
        .iter()
        .any(|h| needles.iter().any(|n| h.contains(n)))
}

/// Returns the regional hint matched by `name`, if any.
pub fn regional_hint(name: &str) -> Option<&'static str> {
    let lower = name.to_lowercase();
    REGIONAL_HINTS.iter().copied().find(|hint| lower.contains(hint))
}

/// Pure, total classification of one form record.
pub fn classify(input: &FormInput<'_>) -> FormClassification {
    let name = input.name.to_lowercase();
    let form_name = input
        .form_name
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty());
    let fields: Vec<&str> = match form_name.as_deref() {
        Some(f) => vec![name.as_str(), f],
        None => vec![name.as_str()],
    };

    let is_mega = contains_any(&fields, &["mega"]) || input.is_mega == Some(true);
    let is_gigantamax =
        contains_any(&fields, &["gmax", "gigantamax"]) || input.is_gigantamax == Some(true);
    let is_regional = contains_any(&fields, &REGIONAL_HINTS);
    let is_gender = name.ends_with("-m")
        || name.ends_with("-f")
        || contains_any(&fields, &["male", "female"]);

    let special = is_mega || is_gigantamax || is_regional || is_gender;

    // absent battle-only flag never qualifies as cosmetic
    let is_cosmetic = form_name.is_some() && !special && input.is_battle_only == Some(false);

    // absent default flag is read as "default"
    let is_alternate = input.is_default == Some(false) && !special && !is_cosmetic;

    FormClassification {
        is_mega,
        is_gigantamax,
        is_regional,
        is_gender,
        is_cosmetic,
        is_alternate,
    }
}

/// Union of the categories of every input.
pub fn classify_all<'a, I>(inputs: I) -> BTreeSet<FormCategory>
where
    I: IntoIterator<Item = FormInput<'a>>,
{
    inputs
        .into_iter()
        .flat_map(|input| classify(&input).categories())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form<'a>(
        name: &'a str,
        form_name: Option<&'a str>,
        is_default: bool,
        is_battle_only: Option<bool>,
    ) -> FormInput<'a> {
        FormInput {
            name,
            form_name,
            is_mega: None,
            is_gigantamax: None,
            is_battle_only,
            is_default: Some(is_default),
        }
    }

    #[test]
    fn test_classify_fixture_set_is_exclusive() {
        let fixtures = [
            (form("charizard-mega-x", Some("mega-x"), false, Some(true)), FormCategory::Mega),
            (form("charizard-gmax", Some("gmax"), false, Some(true)), FormCategory::Gigantamax),
            (form("vulpix-alola", Some("alola"), false, Some(false)), FormCategory::Regional),
            (form("meowth-galar", Some("galar"), false, Some(false)), FormCategory::Regional),
            (form("growlithe-hisui", Some("hisui"), false, Some(false)), FormCategory::Regional),
            (form("wooper-paldea", Some("paldea"), false, Some(false)), FormCategory::Regional),
            (form("meowstic-female", Some("female"), false, Some(false)), FormCategory::Gender),
            (form("indeedee-f", None, false, None), FormCategory::Gender),
            (form("unown-b", Some("b"), false, Some(false)), FormCategory::Cosmetic),
            (form("vivillon-polar", Some("polar"), false, Some(false)), FormCategory::Cosmetic),
            (form("deoxys-attack", None, false, None), FormCategory::Alternate),
            (form("rotom-wash", Some("wash"), false, None), FormCategory::Alternate),
            (form("aegislash-blade", Some("blade"), false, Some(true)), FormCategory::Alternate),
        ];

        for (input, expected) in fixtures {
            let result = classify(&input);
            assert_eq!(result.count(), 1, "{} should have one category", input.name);
            assert_eq!(result.primary(), Some(expected), "{}", input.name);
        }
    }

    #[test]
    fn test_default_form_without_name_is_unclassified() {
        let result = classify(&form("pikachu", Some(""), true, Some(false)));
        assert!(result.is_empty());
    }

    #[test]
    fn test_explicit_flags_win_without_name_match() {
        let input = FormInput {
            name: "venusaur-x",
            is_mega: Some(true),
            ..Default::default()
        };
        assert!(classify(&input).is_mega);

        let input = FormInput {
            name: "lapras-x",
            is_gigantamax: Some(true),
            ..Default::default()
        };
        assert!(classify(&input).is_gigantamax);
    }

    #[test]
    fn test_cosmetic_requires_explicit_false_battle_only() {
        let absent = classify(&form("burmy-sandy", Some("sandy"), false, None));
        assert!(!absent.is_cosmetic);
        assert!(absent.is_alternate);

        let explicit = classify(&form("burmy-sandy", Some("sandy"), false, Some(false)));
        assert!(explicit.is_cosmetic);
        assert!(!explicit.is_alternate);
    }

    #[test]
    fn test_absent_default_flag_is_not_alternate() {
        let input = FormInput {
            name: "deoxys-speed",
            ..Default::default()
        };
        assert!(classify(&input).is_empty());
    }

    #[test]
    fn test_classify_all_unions_varieties() {
        let tags = classify_all([
            FormInput::variety("charizard", true),
            FormInput::variety("charizard-mega-x", false),
            FormInput::variety("charizard-mega-y", false),
            FormInput::variety("charizard-gmax", false),
        ]);
        assert_eq!(
            tags.into_iter().collect::<Vec<_>>(),
            vec![FormCategory::Mega, FormCategory::Gigantamax]
        );
    }

    #[test]
    fn test_regional_hint() {
        assert_eq!(regional_hint("Raichu-Alola"), Some("alola"));
        assert_eq!(regional_hint("slowbro-galar"), Some("galar"));
        assert_eq!(regional_hint("pikachu"), None);
    }
}
