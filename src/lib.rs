//! # Pokedex SDK
//!
//! A fetch-merge-cache pipeline over the public PokeAPI: resilient upstream reads,
//! form classification, normalisation into canonical records, fan-out aggregation
//! and an indexed cache served through paginated, cache-aside queries.
//!
//! ## Architecture
//!
//! ### Fetch Layer
//! Retrying, timeout-bounded HTTP reads with exponential backoff and jitter. The
//! [`poke_api::PokeApi`] trait is the seam every pipeline talks through.
//!
//! ### Normalization Layer
//! Loosely-typed upstream payloads (`types::raw`) become canonical entities with
//! explicit fallback rules; forms are classified into a fixed taxonomy.
//!
//! ### Aggregation Layer
//! Bounded, paced fan-out over sub-resources (forms, regional pokedexes, bulk id
//! ranges). Partial failures are logged and skipped; reruns converge.
//!
//! ### Cache & Query Layer
//! A [`store::CacheStore`] (in-memory or Postgres) with secondary indexes, queried
//! by the cache-aside [`query_service::QueryService`] which backfills on a miss.
//!
//! ### Surface
//! [`pokedex::Pokedex`] wires everything; [`server`] exposes it over HTTP and
//! [`list_controller`] drives incremental, paginated lists.

// Core Types
/// Upstream payloads and canonical records
pub mod types;
/// User-facing error taxonomy
pub mod error;

// Fetch Layer
/// Retry/timeout/backoff around single HTTP reads
pub mod retry_fetch;
/// PokeAPI client trait and reqwest implementation
pub mod poke_api;
/// TTL + LRU memo injected into the client and catalogs
pub mod ttl_cache;

// Normalization Layer
/// Ordered-rule form classifier
pub mod form_classifier;
/// Payload → canonical record conversion
pub mod normalization;

// Aggregation Layer
/// Forms, region and bulk population pipelines
pub mod aggregation;
/// Background backfill bookkeeping
pub mod backfill;

// Cache & Query Layer
/// Cache store contract and in-memory backend
pub mod store;
/// PostgreSQL cache store
pub mod database;
/// Cache-aside paginated queries
pub mod query_service;
/// Materialised regional dex pages
pub mod regional_dex;
/// Type catalog, species detail, evolution lines
pub mod catalog;
/// Gender-difference descriptions
pub mod gender_descriptions;
/// Per-user favorites
pub mod favorites;

// Surface
/// Incremental list state machine
pub mod list_controller;
/// Service wiring
pub mod pokedex;
/// HTTP facade
pub mod server;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// General utilities
pub mod utils;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use error::ServiceError;
pub use pokedex::Pokedex;
pub use poke_api::{PokeApi, PokeApiClient};
pub use query_service::{ListQuery, Page, QueryService};
pub use settings::Settings;
pub use store::{CacheStore, MemoryStore};
pub use types::{FormCategory, PokemonEntity, PokemonForm};
