//! HTTP facade over [`Pokedex`].
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /health` | liveness |
//! | `GET /api/regional-pokedex?region=&limit=&offset=&reset=` | regional dex page |
//! | `GET /api/pokemon?limit=&offset=&search=&types=&generation=&formCategories=` | cache-aside list |
//! | `GET /api/pokemon/:id`, `GET /api/pokemon/:id/forms` | entity, cached forms |
//! | `GET /api/species/:name`, `/forms`, `/evolution` | species detail, forms aggregation, evolution line |
//! | `GET /api/types` | type catalog |
//! | `GET /api/gender-differences/:id` | gender-difference description |
//! | `POST /api/cache/clear` | `{ "scopes": [...] }` |
//! | `GET /api/users/:user/favorites`, `POST`/`DELETE .../:id` | favorites |
//!
//! Errors are `{ "error": "CODE: message", "code": "CODE" }`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::pokedex::Pokedex;
use crate::query_service::ListQuery;
use crate::types::RegionalDexEntry;

pub type AppState = Arc<Pokedex>;

const DEFAULT_PAGE_SIZE: i64 = 20;

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::TransientNetwork(_) | ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Store(_) | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("❌ {}", self);
        }
        let body = json!({ "error": self.to_string(), "code": self.code() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ServiceError>;

fn parse_int(name: &str, raw: Option<&str>, default: i64) -> Result<i64, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(value) => value
            .parse::<i64>()
            .map_err(|_| ServiceError::validation(format!("{} must be an integer, got {:?}", name, value))),
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_id(raw: &str) -> Result<u32, ServiceError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ServiceError::validation(format!("invalid pokemon id: {:?}", raw)))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegionalParams {
    region: Option<String>,
    limit: Option<String>,
    offset: Option<String>,
    reset: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalResponse {
    data: Vec<RegionalDexEntry>,
    total_count: usize,
    has_more: bool,
}

async fn regional_pokedex(
    State(pokedex): State<AppState>,
    Query(params): Query<RegionalParams>,
) -> ApiResult<RegionalResponse> {
    let region = params
        .region
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ServiceError::validation("region is required"))?;
    let limit = parse_int("limit", params.limit.as_deref(), DEFAULT_PAGE_SIZE)?;
    let offset = parse_int("offset", params.offset.as_deref(), 0)?;
    let reset = matches!(params.reset.as_deref(), Some("true") | Some("1"));

    let page = pokedex.regional_page(region, limit, offset, reset).await?;
    Ok(Json(RegionalResponse {
        data: page.items,
        total_count: page.total,
        has_more: page.has_more,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    limit: Option<String>,
    offset: Option<String>,
    search: Option<String>,
    types: Option<String>,
    generation: Option<String>,
    form_categories: Option<String>,
}

async fn list_pokemon(
    State(pokedex): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, ServiceError> {
    let generation = match params.generation.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        Some(raw) => Some(parse_int("generation", Some(raw), 0)?),
        None => None,
    };
    let query = ListQuery {
        limit: parse_int("limit", params.limit.as_deref(), DEFAULT_PAGE_SIZE)?,
        offset: parse_int("offset", params.offset.as_deref(), 0)?,
        search: params.search.filter(|s| !s.trim().is_empty()),
        types: split_list(params.types.as_deref()),
        generation,
        form_categories: split_list(params.form_categories.as_deref()),
    };
    let page = pokedex.list(&query).await?;
    Ok(Json(page).into_response())
}

async fn get_pokemon(State(pokedex): State<AppState>, Path(id): Path<String>) -> Result<Response, ServiceError> {
    let id = parse_id(&id)?;
    match pokedex.pokemon(id).await? {
        Some(entity) => Ok(Json(entity).into_response()),
        None => Err(ServiceError::not_found(format!("pokemon {}", id))),
    }
}

async fn get_pokemon_forms(State(pokedex): State<AppState>, Path(id): Path<String>) -> Result<Response, ServiceError> {
    let forms = pokedex.pokemon_forms(parse_id(&id)?).await?;
    Ok(Json(forms).into_response())
}

async fn get_species(State(pokedex): State<AppState>, Path(name): Path<String>) -> Result<Response, ServiceError> {
    match pokedex.species(&name).await? {
        Some(record) => Ok(Json(record).into_response()),
        None => Err(ServiceError::not_found(format!("species {}", name))),
    }
}

async fn get_species_forms(State(pokedex): State<AppState>, Path(name): Path<String>) -> Result<Response, ServiceError> {
    let forms = pokedex.species_forms(&name).await?;
    Ok(Json(forms).into_response())
}

async fn get_evolution(State(pokedex): State<AppState>, Path(name): Path<String>) -> Result<Response, ServiceError> {
    match pokedex.evolution_line(&name).await? {
        Some(line) => Ok(Json(line).into_response()),
        None => Err(ServiceError::not_found(format!("species {}", name))),
    }
}

async fn get_types(State(pokedex): State<AppState>) -> Result<Response, ServiceError> {
    let types = pokedex.types().await?;
    Ok(Json(types.as_ref()).into_response())
}

async fn get_gender_difference(State(pokedex): State<AppState>, Path(id): Path<String>) -> Result<Response, ServiceError> {
    let description = pokedex.gender_description(parse_id(&id)?).await?;
    // `null` for species without a visible difference
    Ok(Json(description).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    scopes: Vec<String>,
}

async fn clear_cache(State(pokedex): State<AppState>, Json(request): Json<ClearRequest>) -> Result<Response, ServiceError> {
    let cleared = pokedex.clear(&request.scopes).await?;
    let cleared: Vec<&str> = cleared.iter().map(|s| s.as_str()).collect();
    Ok(Json(json!({ "cleared": cleared })).into_response())
}

async fn list_favorites(State(pokedex): State<AppState>, Path(user): Path<String>) -> Result<Response, ServiceError> {
    Ok(Json(pokedex.favorites(&user).await?).into_response())
}

async fn add_favorite(
    State(pokedex): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let favorite = pokedex.add_favorite(&user, parse_id(&id)?).await?;
    Ok((StatusCode::CREATED, Json(favorite)).into_response())
}

async fn remove_favorite(
    State(pokedex): State<AppState>,
    Path((user, id)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    pokedex.remove_favorite(&user, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/regional-pokedex", get(regional_pokedex))
        .route("/api/pokemon", get(list_pokemon))
        .route("/api/pokemon/:id", get(get_pokemon))
        .route("/api/pokemon/:id/forms", get(get_pokemon_forms))
        .route("/api/species/:name", get(get_species))
        .route("/api/species/:name/forms", get(get_species_forms))
        .route("/api/species/:name/evolution", get(get_evolution))
        .route("/api/types", get(get_types))
        .route("/api/gender-differences/:id", get(get_gender_difference))
        .route("/api/cache/clear", post(clear_cache))
        .route("/api/users/:user/favorites", get(list_favorites))
        .route(
            "/api/users/:user/favorites/:id",
            post(add_favorite).delete(remove_favorite),
        )
        .with_state(state)
}

/// Binds `bind_address` and serves until the process stops.
pub async fn serve(pokedex: Pokedex, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🚀 Pokedex API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(Arc::new(pokedex))).await?;
    Ok(())
}
