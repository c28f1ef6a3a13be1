use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::retry_fetch::RetryPolicy;

fn default_false() -> bool {
    false
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct Api {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Per-attempt deadline for interactive fetches.
    #[serde(default = "default_api_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
    /// Optional client-side request quota (requests/second).
    #[serde(default)]
    pub qps_limit: Option<u32>,
    #[serde(default = "default_response_cache_ttl_seconds")]
    pub response_cache_ttl_seconds: u64,
    #[serde(default = "default_response_cache_capacity")]
    pub response_cache_capacity: usize,
}

fn default_api_base_url() -> String {
    "https://pokeapi.co/api/v2".to_string()
}
fn default_api_timeout_ms() -> u64 {
    15_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    300
}
fn default_retry_jitter_ms() -> u64 {
    100
}
fn default_response_cache_ttl_seconds() -> u64 {
    600
}
fn default_response_cache_capacity() -> usize {
    2048
}

impl Default for Api {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_ms: default_api_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            qps_limit: None,
            response_cache_ttl_seconds: default_response_cache_ttl_seconds(),
            response_cache_capacity: default_response_cache_capacity(),
        }
    }
}

impl Api {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry_attempts,
            base_delay_ms: self.retry_base_delay_ms,
            timeout_ms: self.timeout_ms,
            jitter_ms: self.retry_jitter_ms,
        }
    }

    pub fn response_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.response_cache_ttl_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Aggregation {
    #[serde(default = "default_species_workers")]
    pub species_workers: usize,
    #[serde(default = "default_form_workers")]
    pub form_workers: usize,
    #[serde(default = "default_pacing_min_ms")]
    pub pacing_min_ms: u64,
    #[serde(default = "default_pacing_max_ms")]
    pub pacing_max_ms: u64,
}

fn default_species_workers() -> usize {
    3
}
fn default_form_workers() -> usize {
    3
}
fn default_pacing_min_ms() -> u64 {
    60
}
fn default_pacing_max_ms() -> u64 {
    120
}

impl Default for Aggregation {
    fn default() -> Self {
        Self {
            species_workers: default_species_workers(),
            form_workers: default_form_workers(),
            pacing_min_ms: default_pacing_min_ms(),
            pacing_max_ms: default_pacing_max_ms(),
        }
    }
}

/// What counts as "already cached" for bulk population.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessPolicy {
    /// Cached and carrying at least one form tag.
    RequireFormTags,
    /// Cached at all.
    PresenceOnly,
}

impl Default for CompletenessPolicy {
    fn default() -> Self {
        CompletenessPolicy::RequireFormTags
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Population {
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_small_range_concurrency")]
    pub small_range_concurrency: usize,
    #[serde(default = "default_small_range_threshold")]
    pub small_range_threshold: u32,
    #[serde(default = "default_inter_batch_pause_ms")]
    pub inter_batch_pause_ms: u64,
    #[serde(default = "default_true")]
    pub fetch_forms: bool,
    #[serde(default)]
    pub completeness: CompletenessPolicy,
}

fn default_batch_concurrency() -> usize {
    8
}
fn default_small_range_concurrency() -> usize {
    16
}
fn default_small_range_threshold() -> u32 {
    50
}
fn default_inter_batch_pause_ms() -> u64 {
    250
}

impl Default for Population {
    fn default() -> Self {
        Self {
            batch_concurrency: default_batch_concurrency(),
            small_range_concurrency: default_small_range_concurrency(),
            small_range_threshold: default_small_range_threshold(),
            inter_batch_pause_ms: default_inter_batch_pause_ms(),
            fetch_forms: default_true(),
            completeness: CompletenessPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Gender {
    #[serde(default = "default_gender_ttl_days")]
    pub ttl_days: i64,
    #[serde(default = "default_scrape_timeout_ms")]
    pub scrape_timeout_ms: u64,
    #[serde(default = "default_gender_source_base_url")]
    pub source_base_url: String,
    #[serde(default = "default_gender_whitelist")]
    pub whitelist: Vec<String>,
}

fn default_gender_ttl_days() -> i64 {
    30
}
fn default_scrape_timeout_ms() -> u64 {
    20_000
}
fn default_gender_source_base_url() -> String {
    "https://bulbapedia.bulbagarden.net/wiki".to_string()
}
fn default_gender_whitelist() -> Vec<String> {
    [
        "venusaur", "butterfree", "rattata", "raticate", "pikachu", "raichu", "zubat", "golbat",
        "gloom", "vileplume", "kadabra", "alakazam", "doduo", "dodrio", "hypno", "rhyhorn",
        "rhydon", "goldeen", "seaking", "scyther", "magikarp", "gyarados", "meganium", "ledyba",
        "ledian", "xatu", "sudowoodo", "politoed", "aipom", "wooper", "quagsire", "murkrow",
        "wobbuffet", "girafarig", "gligar", "steelix", "scizor", "heracross", "sneasel",
        "ursaring", "piloswine", "octillery", "houndoom", "donphan", "torchic", "combusken",
        "blaziken", "beautifly", "dustox", "ludicolo", "nuzleaf", "shiftry", "meditite",
        "medicham", "roselia", "gulpin", "swalot", "numel", "camerupt", "cacturne", "milotic",
        "relicanth", "starly", "staravia", "staraptor", "bidoof", "bibarel", "kricketot",
        "kricketune", "shinx", "luxio", "luxray", "roserade", "combee", "pachirisu", "buizel",
        "floatzel", "ambipom", "gible", "gabite", "garchomp", "hippopotas", "hippowdon",
        "croagunk", "toxicroak", "finneon", "lumineon", "snover", "abomasnow", "weavile",
        "rhyperior", "tangrowth", "mamoswine", "unfezant", "frillish", "jellicent", "pyroar",
        "meowstic", "indeedee", "basculegion", "oinkologne",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for Gender {
    fn default() -> Self {
        Self {
            ttl_days: default_gender_ttl_days(),
            scrape_timeout_ms: default_scrape_timeout_ms(),
            source_base_url: default_gender_source_base_url(),
            whitelist: default_gender_whitelist(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Query {
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
    #[serde(default = "default_true")]
    pub backfill_on_miss: bool,
    /// Wait for the first fill when the cache has nothing for a page.
    #[serde(default = "default_true")]
    pub blocking_first_fill: bool,
}

fn default_max_limit() -> i64 {
    1025
}

impl Default for Query {
    fn default() -> Self {
        Self {
            max_limit: default_max_limit(),
            backfill_on_miss: default_true(),
            blocking_first_fill: default_true(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for Server {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    /// Postgres URL. When unset the in-memory store is used.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_false")]
    pub require: bool,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            require: default_false(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub population: Population,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub query: Query,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub database: Database,
}

impl Settings {
    /// Loads `Config.toml` (optional) and `POKEDEX__SECTION__KEY` overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::build(File::with_name("Config").required(false))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_string_lossy().to_string();
        Self::build(File::with_name(&path).required(true))
    }

    fn build<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let s = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("POKEDEX")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // DATABASE_URL wins over the config file, like the rest of the sqlx ecosystem expects.
        if let Ok(url) = std::env::var("DATABASE_URL") {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                settings.database.url = Some(trimmed.to_string());
            }
        }

        settings.sanitize();
        Ok(settings)
    }

    fn sanitize(&mut self) {
        self.api.base_url = self.api.base_url.trim_end_matches('/').to_string();
        if self.api.retry_attempts == 0 {
            self.api.retry_attempts = 1;
        }
        if self.aggregation.pacing_max_ms < self.aggregation.pacing_min_ms {
            self.aggregation.pacing_max_ms = self.aggregation.pacing_min_ms;
        }
        self.aggregation.species_workers = self.aggregation.species_workers.max(1);
        self.aggregation.form_workers = self.aggregation.form_workers.max(1);
        self.population.batch_concurrency = self.population.batch_concurrency.max(1);
        self.population.small_range_concurrency = self.population.small_range_concurrency.max(1);
        self.gender.whitelist = self
            .gender
            .whitelist
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    /// Settings tuned for tests and offline tools: no pacing, fast retries.
    pub fn for_testing(base_url: &str) -> Self {
        let mut settings = Settings::default();
        settings.api.base_url = base_url.trim_end_matches('/').to_string();
        settings.api.retry_base_delay_ms = 10;
        settings.api.retry_jitter_ms = 0;
        settings.api.timeout_ms = 2_000;
        settings.aggregation.pacing_min_ms = 0;
        settings.aggregation.pacing_max_ms = 0;
        settings.population.inter_batch_pause_ms = 0;
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.api.timeout_ms, 15_000);
        assert_eq!(settings.api.retry_attempts, 3);
        assert_eq!(settings.aggregation.species_workers, 3);
        assert_eq!(settings.gender.ttl_days, 30);
        assert_eq!(settings.gender.scrape_timeout_ms, 20_000);
        assert_eq!(settings.query.max_limit, 1025);
        assert_eq!(settings.population.completeness, CompletenessPolicy::RequireFormTags);
    }

    #[test]
    fn test_sanitize_fixes_inverted_pacing() {
        let mut settings = Settings::default();
        settings.aggregation.pacing_min_ms = 200;
        settings.aggregation.pacing_max_ms = 100;
        settings.api.base_url = "https://pokeapi.co/api/v2/".to_string();
        settings.sanitize();
        assert_eq!(settings.aggregation.pacing_max_ms, 200);
        assert_eq!(settings.api.base_url, "https://pokeapi.co/api/v2");
    }
}
