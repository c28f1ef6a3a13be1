//! Integration tests for the aggregation pipelines over a mocked PokeAPI
//!
//! Tests cover:
//! - Forms aggregation walks species → varieties → forms and classifies them
//! - A species that cannot be fetched becomes a placeholder in a batch
//! - Region aggregation merges several pokedexes and builds a denormalised page
//! - Bulk population reports partial failures without aborting

use pokedex_sdk::poke_api::{PokeApi, PokeApiClient};
use pokedex_sdk::store::{CacheStore, EntityIndex};
use pokedex_sdk::{FormCategory, MemoryStore, Pokedex, Settings};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_json(server: &MockServer, route: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn pokemon_body(base: &str, id: u32, name: &str, types: &[&str]) -> Value {
    json!({
        "id": id,
        "name": name,
        "height": 8,
        "weight": 300,
        "types": types.iter().enumerate().map(|(i, t)| json!({
            "slot": i + 1, "type": {"name": t, "url": format!("{}/type/{}/", base, t)}
        })).collect::<Vec<_>>(),
        "sprites": {"front_default": format!("{}.png", name)},
        "forms": [{"name": name, "url": format!("{}/pokemon-form/{}/", base, id)}],
        "species": {"name": name, "url": format!("{}/pokemon-species/{}/", base, id)}
    })
}

fn species_body(base: &str, id: u32, name: &str, varieties: &[(u32, &str, bool)]) -> Value {
    json!({
        "id": id,
        "name": name,
        "varieties": varieties.iter().map(|(vid, vname, is_default)| json!({
            "is_default": is_default,
            "pokemon": {"name": vname, "url": format!("{}/pokemon/{}/", base, vid)}
        })).collect::<Vec<_>>()
    })
}

fn form_body(id: u32, name: &str, form_name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "form_name": form_name,
        "is_default": true,
        "is_battle_only": false,
        "is_mega": false
    })
}

fn pokedex_body(base: &str, entries: &[(u32, &str)]) -> Value {
    json!({
        "pokemon_entries": entries.iter().enumerate().map(|(i, (id, name))| json!({
            "entry_number": i + 1,
            "pokemon_species": {"name": name, "url": format!("{}/pokemon-species/{}/", base, id)}
        })).collect::<Vec<_>>()
    })
}

async fn pokedex_for(server: &MockServer) -> Pokedex {
    let settings = Settings::for_testing(&server.uri());
    let api: Arc<dyn PokeApi> = Arc::new(PokeApiClient::new(&settings.api).unwrap());
    Pokedex::new(settings, api, Arc::new(MemoryStore::new()))
}

async fn mount_raichu(server: &MockServer) {
    let base = server.uri();
    mount_json(
        server,
        "/pokemon-species/raichu",
        species_body(&base, 26, "raichu", &[(26, "raichu", true), (10100, "raichu-alola", false)]),
    )
    .await;
    mount_json(server, "/pokemon/26", pokemon_body(&base, 26, "raichu", &["electric"])).await;
    mount_json(
        server,
        "/pokemon/10100",
        pokemon_body(&base, 10100, "raichu-alola", &["electric", "psychic"]),
    )
    .await;
    mount_json(server, "/pokemon-form/26", form_body(26, "raichu", "")).await;
    mount_json(server, "/pokemon-form/10100", form_body(10100, "raichu-alola", "alola")).await;
}

#[tokio::test]
async fn test_forms_aggregation_classifies_regional_variant() {
    let server = MockServer::start().await;
    mount_raichu(&server).await;
    let pokedex = pokedex_for(&server).await;

    let result = pokedex.species_forms("Raichu").await.unwrap();

    assert_eq!(result.species_id, 26);
    let ids: Vec<u32> = result.forms.iter().map(|f| f.form_id).collect();
    assert_eq!(ids, vec![26, 10100]);
    assert!(result.forms[1].categories.contains(&FormCategory::Regional));
    assert!(result.forms[0].categories.is_empty());

    // forms are persisted and queryable by species
    let cached = pokedex.pokemon_forms(26).await.unwrap();
    assert_eq!(cached.len(), 2);
}

#[tokio::test]
async fn test_forms_batch_keeps_going_past_missing_species() {
    let server = MockServer::start().await;
    mount_raichu(&server).await;
    let pokedex = pokedex_for(&server).await;

    let results = pokedex
        .species_forms_batch(&["missingno".to_string(), "raichu".to_string()])
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().any(|r| r.is_placeholder() && r.name == "missingno"));
    assert!(results.iter().any(|r| r.species_id == 26 && r.forms.len() == 2));

    let err = pokedex.species_forms("missingno").await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_region_page_merges_pokedexes_and_denormalises() {
    let server = MockServer::start().await;
    let base = server.uri();
    // kalos is split over three upstream pokedexes; 25 appears twice
    mount_json(&server, "/pokedex/kalos-central", pokedex_body(&base, &[(25, "pikachu"), (133, "eevee")])).await;
    mount_json(&server, "/pokedex/kalos-coastal", pokedex_body(&base, &[(25, "pikachu"), (131, "lapras")])).await;
    mount_json(&server, "/pokedex/kalos-mountain", pokedex_body(&base, &[(94, "gengar")])).await;
    for (id, name, kind) in [(25, "pikachu", "electric"), (133, "eevee", "normal"), (131, "lapras", "water"), (94, "gengar", "ghost")] {
        mount_json(&server, &format!("/pokemon/{}", id), pokemon_body(&base, id, name, &[kind])).await;
        mount_json(
            &server,
            &format!("/pokemon-species/{}", id),
            species_body(&base, id, name, &[(id, name, true)]),
        )
        .await;
    }
    let pokedex = pokedex_for(&server).await;

    let page = pokedex.regional_page("kalos", 10, 0, false).await.unwrap();

    assert_eq!(page.total, 4);
    assert!(!page.has_more);
    let ids: Vec<u32> = page.items.iter().map(|e| e.dex_id).collect();
    assert_eq!(ids, vec![25, 94, 131, 133]);
    assert!(page.items.iter().all(|e| e.is_denormalized()));
    assert_eq!(page.items[0].types, vec!["electric"]);

    let second = pokedex.regional_page("kalos", 2, 2, false).await.unwrap();
    assert_eq!(second.items.len(), 2);
    assert!(!second.has_more);
}

#[tokio::test]
async fn test_population_reports_failed_ids() {
    let server = MockServer::start().await;
    let base = server.uri();
    for (id, name) in [(1, "bulbasaur"), (3, "venusaur")] {
        mount_json(&server, &format!("/pokemon/{}", id), pokemon_body(&base, id, name, &["grass"])).await;
        mount_json(
            &server,
            &format!("/pokemon-species/{}", id),
            species_body(&base, id, name, &[(id, name, true)]),
        )
        .await;
    }
    let pokedex = pokedex_for(&server).await;

    let report = pokedex.populate(1, 3).await;

    assert_eq!(report.requested, 3);
    assert_eq!(report.upserted, 2);
    assert_eq!(report.failed, vec![2]);
    let cached = pokedex.store().query_entities(&EntityIndex::All).await.unwrap();
    assert_eq!(cached.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 3]);
}
