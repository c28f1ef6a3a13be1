// src/poke_api.rs
//
// Upstream client. Everything that talks to PokeAPI goes through the `PokeApi`
// trait so pipelines can run against a fake in tests.

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use crate::retry_fetch::{fetch_text_once, retry_with_policy, validate_url, FetchError, RetryPolicy};
use crate::settings::Api;
use crate::ttl_cache::{KeyValueCache, TtlCache};
use crate::types::raw::{RawEvolutionChain, RawForm, RawPokedex, RawPokemon, RawSpecies, RawTypeList};

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Response memo keyed by absolute URL.
pub type ResponseCache = Arc<dyn KeyValueCache<String, Arc<str>>>;

/// Read-only access to the upstream REST API.
///
/// Keys accept either the numeric id or the lowercase resource name, as the
/// upstream does. Every method surfaces `FetchError` after the retry budget is
/// spent; a missing resource is `FetchError::Status { status: 404, .. }`.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: aggregation pipelines share one
/// client across their worker pools.
#[async_trait]
pub trait PokeApi: Send + Sync {
    /// `GET /pokemon/{name|id}`
    async fn pokemon(&self, key: &str) -> Result<RawPokemon, FetchError>;

    /// `GET /pokemon-species/{name|id}`
    async fn species(&self, key: &str) -> Result<RawSpecies, FetchError>;

    /// `GET /pokemon-form/{name|id}`
    async fn pokemon_form(&self, key: &str) -> Result<RawForm, FetchError>;

    /// `GET /pokedex/{slug}`
    async fn pokedex(&self, slug: &str) -> Result<RawPokedex, FetchError>;

    /// `GET /type`
    async fn types(&self) -> Result<RawTypeList, FetchError>;

    /// `GET /evolution-chain/{id}`
    async fn evolution_chain(&self, id: u32) -> Result<RawEvolutionChain, FetchError>;

    /// Raw page body for scraping, with its own deadline.
    async fn text(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// `reqwest`-backed `PokeApi` with retry, optional QPS limiting and a
/// response memo.
pub struct PokeApiClient {
    http: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    responses: ResponseCache,
}

impl PokeApiClient {
    pub fn new(settings: &Api) -> anyhow::Result<Self> {
        let responses: ResponseCache = Arc::new(TtlCache::new(
            "api_responses",
            settings.response_cache_capacity,
            settings.response_cache_ttl(),
        ));
        Self::with_cache(settings, responses)
    }

    /// Same as `new` but with a caller-provided response cache.
    pub fn with_cache(settings: &Api, responses: ResponseCache) -> anyhow::Result<Self> {
        validate_url(&settings.base_url)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("pokedex-sdk/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let limiter = match settings.qps_limit {
            Some(qps) => {
                let qps = NonZeroU32::new(qps)
                    .ok_or_else(|| anyhow::anyhow!("QPS must be non-zero"))?;
                info!("Upstream requests limited to {} per second", qps);
                Some(Arc::new(RateLimiter::direct(Quota::per_second(qps))))
            }
            None => None,
        };

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            policy: settings.retry_policy(),
            limiter,
            responses,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn resource_url(&self, resource: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            resource,
            key.trim().trim_matches('/').to_lowercase()
        )
    }

    async fn get_body(
        &self,
        label: &str,
        url: &str,
        policy: &RetryPolicy,
    ) -> Result<String, FetchError> {
        validate_url(url)?;
        let http = &self.http;
        let limiter = self.limiter.as_deref();
        let timeout = policy.timeout();

        retry_with_policy(policy, label, || async move {
            if let Some(limiter) = limiter {
                limiter.until_ready().await;
            }
            fetch_text_once(http, url, timeout).await
        })
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, label: &str, url: String) -> Result<T, FetchError> {
        let body = match self.responses.get(&url) {
            Some(body) => body,
            None => {
                let body: Arc<str> = self.get_body(label, &url, &self.policy).await?.into();
                // only successful bodies are memoised
                self.responses.set(url.clone(), body.clone());
                body
            }
        };
        serde_json::from_str(&body).map_err(|e| {
            self.responses.invalidate(&url);
            FetchError::Decode(format!("{}: {}", url, e))
        })
    }
}

#[async_trait]
impl PokeApi for PokeApiClient {
    async fn pokemon(&self, key: &str) -> Result<RawPokemon, FetchError> {
        self.get_json("pokemon", self.resource_url("pokemon", key)).await
    }

    async fn species(&self, key: &str) -> Result<RawSpecies, FetchError> {
        self.get_json("species", self.resource_url("pokemon-species", key))
            .await
    }

    async fn pokemon_form(&self, key: &str) -> Result<RawForm, FetchError> {
        self.get_json("form", self.resource_url("pokemon-form", key))
            .await
    }

    async fn pokedex(&self, slug: &str) -> Result<RawPokedex, FetchError> {
        self.get_json("pokedex", self.resource_url("pokedex", slug))
            .await
    }

    async fn types(&self) -> Result<RawTypeList, FetchError> {
        // the default page size truncates the list
        let url = format!("{}/type?limit=100", self.base_url);
        self.get_json("type", url).await
    }

    async fn evolution_chain(&self, id: u32) -> Result<RawEvolutionChain, FetchError> {
        self.get_json(
            "evolution_chain",
            self.resource_url("evolution-chain", &id.to_string()),
        )
        .await
    }

    async fn text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        debug!("Fetching page {}", url);
        let policy = self.policy.with_timeout(timeout.as_millis() as u64);
        self.get_body("page", url, &policy).await
    }
}

/// In-memory `PokeApi` for unit tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::types::raw::{NamedResource, RawPokedexEntry, RawVariety};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn named(name: &str, url: &str) -> NamedResource {
        NamedResource {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    pub fn species_url(id: u32) -> String {
        format!("https://pokeapi.co/api/v2/pokemon-species/{}/", id)
    }

    pub fn pokemon_url(id: u32) -> String {
        format!("https://pokeapi.co/api/v2/pokemon/{}/", id)
    }

    pub fn form_url(id: u32) -> String {
        format!("https://pokeapi.co/api/v2/pokemon-form/{}/", id)
    }

    pub fn raw_pokemon(id: u32, name: &str, types: &[&str]) -> RawPokemon {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "height": 7,
            "weight": 69,
            "types": types.iter().enumerate().map(|(i, t)| serde_json::json!({
                "slot": i + 1, "type": {"name": t, "url": ""}
            })).collect::<Vec<_>>(),
            "sprites": {
                "front_default": format!("{}.png", name),
                "other": {"official-artwork": {"front_default": format!("{}-art.png", name)}}
            },
            "forms": [{"name": name, "url": form_url(id)}],
            "species": {"name": name, "url": species_url(id)}
        }))
        .unwrap()
    }

    pub fn raw_species(id: u32, name: &str, varieties: &[(u32, &str, bool)]) -> RawSpecies {
        RawSpecies {
            id,
            name: name.to_string(),
            varieties: varieties
                .iter()
                .map(|(vid, vname, is_default)| RawVariety {
                    is_default: *is_default,
                    pokemon: named(vname, &pokemon_url(*vid)),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn raw_form(id: u32, name: &str, form_name: &str, variety_id: u32) -> RawForm {
        RawForm {
            id,
            name: name.to_string(),
            form_name: Some(form_name.to_string()),
            is_default: Some(true),
            is_battle_only: Some(false),
            pokemon: Some(named(name, &pokemon_url(variety_id))),
            ..Default::default()
        }
    }

    #[derive(Default)]
    pub struct FakePokeApi {
        pokemon: Mutex<HashMap<String, RawPokemon>>,
        species: Mutex<HashMap<String, RawSpecies>>,
        forms: Mutex<HashMap<String, RawForm>>,
        pokedexes: Mutex<HashMap<String, RawPokedex>>,
        chains: Mutex<HashMap<u32, RawEvolutionChain>>,
        types: Mutex<Vec<NamedResource>>,
        pages: Mutex<HashMap<String, String>>,
        failing: Mutex<HashSet<String>>,
        failing_once: Mutex<HashSet<String>>,
        calls: AtomicUsize,
    }

    impl FakePokeApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_pokemon(&self, raw: RawPokemon) {
            let mut map = self.pokemon.lock().unwrap();
            map.insert(raw.id.to_string(), raw.clone());
            map.insert(raw.name.clone(), raw);
        }

        pub fn add_species(&self, raw: RawSpecies) {
            let mut map = self.species.lock().unwrap();
            map.insert(raw.id.to_string(), raw.clone());
            map.insert(raw.name.clone(), raw);
        }

        pub fn add_form(&self, raw: RawForm) {
            let mut map = self.forms.lock().unwrap();
            map.insert(raw.id.to_string(), raw.clone());
            map.insert(raw.name.clone(), raw);
        }

        pub fn add_pokedex(&self, slug: &str, entries: &[(u32, &str)]) {
            let pokedex = RawPokedex {
                id: None,
                name: Some(slug.to_string()),
                pokemon_entries: entries
                    .iter()
                    .enumerate()
                    .map(|(i, (id, name))| RawPokedexEntry {
                        entry_number: Some(i as u32 + 1),
                        pokemon_species: named(name, &species_url(*id)),
                    })
                    .collect(),
            };
            self.pokedexes
                .lock()
                .unwrap()
                .insert(slug.to_string(), pokedex);
        }

        pub fn add_chain(&self, raw: RawEvolutionChain) {
            self.chains.lock().unwrap().insert(raw.id, raw);
        }

        pub fn set_types(&self, names: &[&str]) {
            *self.types.lock().unwrap() = names.iter().map(|n| named(n, "")).collect();
        }

        pub fn add_page(&self, url: &str, body: &str) {
            self.pages
                .lock()
                .unwrap()
                .insert(url.to_string(), body.to_string());
        }

        /// Makes `resource/key` (e.g. `pokemon/2`) fail with a 500.
        pub fn fail(&self, path: &str) {
            self.failing.lock().unwrap().insert(path.to_string());
        }

        /// Like `fail`, but only the next request to `path` fails.
        pub fn fail_once(&self, path: &str) {
            self.failing_once.lock().unwrap().insert(path.to_string());
        }

        pub fn heal(&self, path: &str) {
            self.failing.lock().unwrap().remove(path);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn lookup<T: Clone>(
            &self,
            resource: &str,
            key: &str,
            map: &Mutex<HashMap<String, T>>,
        ) -> Result<T, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let path = format!("{}/{}", resource, key);
            if self.failing.lock().unwrap().contains(&path)
                || self.failing_once.lock().unwrap().remove(&path)
            {
                return Err(FetchError::Status { status: 500, url: path });
            }
            map.lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or(FetchError::Status { status: 404, url: path })
        }
    }

    #[async_trait]
    impl PokeApi for FakePokeApi {
        async fn pokemon(&self, key: &str) -> Result<RawPokemon, FetchError> {
            self.lookup("pokemon", key, &self.pokemon)
        }

        async fn species(&self, key: &str) -> Result<RawSpecies, FetchError> {
            self.lookup("species", key, &self.species)
        }

        async fn pokemon_form(&self, key: &str) -> Result<RawForm, FetchError> {
            self.lookup("form", key, &self.forms)
        }

        async fn pokedex(&self, slug: &str) -> Result<RawPokedex, FetchError> {
            self.lookup("pokedex", slug, &self.pokedexes)
        }

        async fn types(&self) -> Result<RawTypeList, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let results = self.types.lock().unwrap().clone();
            Ok(RawTypeList {
                count: Some(results.len() as u32),
                results,
            })
        }

        async fn evolution_chain(&self, id: u32) -> Result<RawEvolutionChain, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.chains
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(FetchError::Status {
                    status: 404,
                    url: format!("evolution-chain/{}", id),
                })
        }

        async fn text(&self, url: &str, _timeout: Duration) -> Result<String, FetchError> {
            self.lookup("page", url, &self.pages)
        }
    }
}
