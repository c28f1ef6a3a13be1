//! Integration tests for cache-aside queries over a mocked PokeAPI
//!
//! Tests cover:
//! - First query on an empty cache fills the requested window before answering
//! - Later misses are backfilled in the background and show up on the next query
//! - Type and name filters applied on top of the chosen index
//! - Point reads by id and name, unknown ids read as None

use pokedex_sdk::poke_api::{PokeApi, PokeApiClient};
use pokedex_sdk::{ListQuery, MemoryStore, Pokedex, Settings};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STARTERS: [(u32, &str, &str); 6] = [
    (1, "bulbasaur", "grass"),
    (2, "ivysaur", "grass"),
    (3, "venusaur", "grass"),
    (4, "charmander", "fire"),
    (5, "charmeleon", "fire"),
    (6, "charizard", "fire"),
];

async fn mock_upstream() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();
    for (id, name, kind) in STARTERS {
        let pokemon = json!({
            "id": id,
            "name": name,
            "types": [{"slot": 1, "type": {"name": kind, "url": ""}}],
            "sprites": {"front_default": format!("{}.png", name)},
            "species": {"name": name, "url": format!("{}/pokemon-species/{}/", base, id)}
        });
        let species = json!({
            "id": id,
            "name": name,
            "varieties": [{"is_default": true, "pokemon": {"name": name, "url": format!("{}/pokemon/{}/", base, id)}}]
        });
        for (route, body) in [
            (format!("/pokemon/{}", id), pokemon.clone()),
            (format!("/pokemon/{}", name), pokemon),
            (format!("/pokemon-species/{}", id), species),
        ] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&server)
                .await;
        }
    }
    server
}

fn pokedex_for(server: &MockServer) -> Pokedex {
    let settings = Settings::for_testing(&server.uri());
    let api: Arc<dyn PokeApi> = Arc::new(PokeApiClient::new(&settings.api).unwrap());
    Pokedex::new(settings, api, Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn test_first_page_fills_cache_then_background_backfill_extends_it() {
    let server = mock_upstream().await;
    let pokedex = pokedex_for(&server);

    let first = pokedex.list(&ListQuery::page(3, 0)).await.unwrap();
    assert_eq!(
        first.items.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(first.total, 3);
    assert!(!first.has_more);

    // ids 4..6 are not cached yet: served from what is there, backfilled behind
    let _ = pokedex.list(&ListQuery::page(3, 3)).await.unwrap();
    pokedex.query_service().wait_for_backfills().await;

    let second = pokedex.list(&ListQuery::page(3, 3)).await.unwrap();
    assert_eq!(
        second.items.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![4, 5, 6]
    );
    assert_eq!(second.total, 6);
    assert!(!second.has_more);
}

#[tokio::test]
async fn test_filters_narrow_cached_rows() {
    let server = mock_upstream().await;
    let pokedex = pokedex_for(&server);
    pokedex.populate(1, 6).await;

    let fire = pokedex
        .list(&ListQuery::page(10, 0).with_types(["FIRE"]))
        .await
        .unwrap();
    assert_eq!(fire.total, 3);
    assert!(fire.items.iter().all(|e| e.types == vec!["fire"]));

    let search = pokedex
        .list(&ListQuery::page(10, 0).with_search("char"))
        .await
        .unwrap();
    assert_eq!(
        search.items.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
        vec!["charmander", "charmeleon", "charizard"]
    );

    let paged = pokedex.list(&ListQuery::page(4, 0)).await.unwrap();
    assert_eq!(paged.items.len(), 4);
    assert!(paged.has_more);
}

#[tokio::test]
async fn test_point_reads() {
    let server = mock_upstream().await;
    let pokedex = pokedex_for(&server);

    let charizard = pokedex.pokemon(6).await.unwrap().unwrap();
    assert_eq!(charizard.name, "charizard");
    assert_eq!(charizard.generation, Some(1));

    let by_name = pokedex.pokemon_by_name("Bulbasaur").await.unwrap().unwrap();
    assert_eq!(by_name.id, 1);

    assert!(pokedex.pokemon(9999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_queries_are_rejected() {
    let server = mock_upstream().await;
    let pokedex = pokedex_for(&server);

    for query in [
        ListQuery::page(-1, 0),
        ListQuery::page(2000, 0),
        ListQuery::page(10, -5),
        ListQuery::page(10, 0).with_generation(12),
        ListQuery::page(10, 0).with_categories(["shiny"]),
    ] {
        let err = pokedex.list(&query).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
