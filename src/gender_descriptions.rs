// Gender-difference descriptions scraped from a wiki page, cached with a TTL.
//
// Only whitelisted species have a visible male/female difference worth
// describing; everything else short-circuits to `None` without I/O.

use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ServiceError;
use crate::normalization::clean_text;
use crate::poke_api::PokeApi;
use crate::settings::Gender;
use crate::store::{CacheStore, EntityIndex};
use crate::types::GenderDifferenceDescription;

static GENDER_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)id="Gender_differences"[^>]*>.*?</h[23]>(?P<body>.*?)(?:<h[1-3][\s>]|\z)"#,
    )
    .expect("Failed to compile gender section regex")
});

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("Failed to compile tag regex"));

static NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|sup)[^>]*>.*?</(script|style|sup)>|\[edit\]|\[\d+\]")
        .expect("Failed to compile noise regex")
});

/// Plain text of the "Gender differences" section, if the page has one.
pub fn extract_gender_section(html: &str) -> Option<String> {
    let body = GENDER_SECTION.captures(html)?.name("body")?.as_str();
    let without_noise = NOISE.replace_all(body, " ");
    let text = TAG.replace_all(&without_noise, " ");
    let text = decode_entities(&text);
    let text = clean_text(&text);
    (!text.is_empty()).then_some(text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

pub struct GenderDescriptionService {
    api: Arc<dyn PokeApi>,
    store: Arc<dyn CacheStore>,
    whitelist: HashSet<String>,
    ttl: ChronoDuration,
    timeout: Duration,
    source_base_url: String,
}

impl GenderDescriptionService {
    pub fn new(api: Arc<dyn PokeApi>, store: Arc<dyn CacheStore>, settings: &Gender) -> Self {
        Self {
            api,
            store,
            whitelist: settings
                .whitelist
                .iter()
                .map(|s| s.trim().to_lowercase())
                .collect(),
            ttl: ChronoDuration::days(settings.ttl_days),
            timeout: Duration::from_millis(settings.scrape_timeout_ms),
            source_base_url: settings.source_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.whitelist.contains(&name.trim().to_lowercase())
    }

    /// Wiki article for `name`, e.g. `.../Pikachu_(Pok%C3%A9mon)`.
    pub fn source_url(&self, name: &str) -> String {
        let name = name.trim().to_lowercase().replace(' ', "_");
        let mut chars = name.chars();
        let title = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{}/{}_(Pok%C3%A9mon)", self.source_base_url, title)
    }

    /// Fresh cached row, else a new scrape, else the stale row.
    pub async fn describe(
        &self,
        pokemon_id: u32,
        name: &str,
    ) -> Result<Option<GenderDifferenceDescription>, ServiceError> {
        let name = name.trim().to_lowercase();
        if !self.is_whitelisted(&name) {
            return Ok(None);
        }

        let cached = self.store.get_gender_description(pokemon_id).await?;
        if let Some(ref row) = cached {
            if row.is_fresh(Utc::now(), self.ttl) {
                debug!("Gender description for {} served from cache", name);
                return Ok(cached);
            }
        }

        let url = self.source_url(&name);
        let html = match self.api.text(&url, self.timeout).await {
            Ok(html) => html,
            Err(e) if cached.is_some() => {
                warn!("⚠️ Gender page for {} unavailable, serving stale row: {}", name, e);
                return Ok(cached);
            }
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(description) = extract_gender_section(&html) else {
            warn!("⚠️ No gender-differences section on {}", url);
            return Ok(cached);
        };

        let row = GenderDifferenceDescription {
            pokemon_id,
            name: name.clone(),
            description,
            fetched_at: Utc::now(),
            source_url: url,
        };
        self.store.upsert_gender_description(row.clone()).await?;
        info!("✅ Gender description for {} refreshed", name);
        Ok(Some(row))
    }

    /// Resolves the pokemon id from the cache (or upstream) and describes it.
    pub async fn describe_by_name(
        &self,
        name: &str,
    ) -> Result<Option<GenderDifferenceDescription>, ServiceError> {
        let name = name.trim().to_lowercase();
        if !self.is_whitelisted(&name) {
            return Ok(None);
        }
        if let Some(row) = self.store.get_gender_description_by_name(&name).await? {
            return self.describe(row.pokemon_id, &name).await;
        }
        let cached = self
            .store
            .query_entities(&EntityIndex::ByName(name.clone()))
            .await?;
        let pokemon_id = match cached.first() {
            Some(entity) => entity.id,
            None => self.api.pokemon(&name).await?.id,
        };
        self.describe(pokemon_id, &name).await
    }
}
