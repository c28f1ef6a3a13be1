// Postgres cache store.
//
// Each table keeps the full record as JSON in `data` next to the scalar columns
// the secondary indexes need. `form_tags` / `categories` are TEXT[] columns so the
// set union can happen inside the upsert statement.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Connection, Pool, Postgres, Row};
use std::collections::BTreeSet;
use std::env;
use std::time::Duration;

use crate::settings::Database;
use crate::store::{sort_forms, CacheScope, CacheStore, EntityIndex, FormIndex, StoreError};
use crate::types::{
    Favorite, FormCategory, GenderDifferenceDescription, PokemonEntity, PokemonForm,
    RegionalDexEntry, SpeciesRecord,
};

/// PostgreSQL connection pool type alias.
pub type DbPool = Pool<Postgres>;

/// Database schema name
pub const SCHEMA: &str = "pokedex";

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Resolves the connection string: `database.url`, then `DATABASE_URL`.
pub fn database_url(settings: &Database) -> Option<String> {
    settings
        .url
        .clone()
        .or_else(|| env::var("DATABASE_URL").ok())
        .filter(|url| !url.trim().is_empty())
}

pub async fn connect(settings: &Database) -> Result<DbPool> {
    // Force UTF-8 client encoding to keep server error messages decodable
    env::set_var("PGCLIENTENCODING", "UTF8");

    let database_url =
        database_url(settings).ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

    // Retries with exponential backoff survive DNS/startup races in Compose
    let mut last_err: Option<anyhow::Error> = None;
    let max_attempts: u32 = 10;
    for attempt in 1..=max_attempts {
        match PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&database_url)
            .await
        {
            Ok(pool) => {
                log::info!(
                    "✅ Connected to database (attempt {}/{}).",
                    attempt,
                    max_attempts
                );
                if let Err(e) = initialize_database(&pool).await {
                    last_err = Some(e);
                } else {
                    return Ok(pool);
                }
            }
            Err(e) => {
                last_err = Some(e.into());
            }
        }
        let delay_ms = (1u64 << attempt.min(6)) * 200;
        log::warn!(
            "DB connect/init attempt {}/{} failed. Retrying in {} ms...",
            attempt,
            max_attempts,
            delay_ms
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Unknown DB connection error")))
}

/// Creates the schema, tables and indexes. Safe to run on every start.
pub async fn initialize_database(pool: &DbPool) -> Result<()> {
    const MIGRATION_LOCK_ID: i64 = 0x504F4B4544455800; // "POKEDEX\0"

    let mut conn = pool.acquire().await?;
    let mut tx = conn.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(tx.as_mut())
        .await?;
    log::info!("✅ Database migration lock acquired.");

    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
        .execute(tx.as_mut())
        .await?;
    create_tables(&mut tx).await?;

    tx.commit().await?;
    log::info!("Database initialization complete, transaction committed.");
    Ok(())
}

async fn create_tables(tx: &mut sqlx::Transaction<'_, Postgres>) -> Result<()> {
    let statements = [
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.entities (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                generation SMALLINT,
                form_tags TEXT[] NOT NULL DEFAULT '{{}}',
                data TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            s = SCHEMA
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_entities_name ON {}.entities(name)", SCHEMA),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_entities_generation ON {}.entities(generation)",
            SCHEMA
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_entities_form_tags ON {}.entities USING GIN(form_tags)",
            SCHEMA
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_entities_name_search ON {}.entities(name text_pattern_ops)",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.forms (
                form_id INTEGER PRIMARY KEY,
                pokemon_id INTEGER NOT NULL,
                pokemon_name TEXT NOT NULL,
                categories TEXT[] NOT NULL DEFAULT '{{}}',
                data TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            s = SCHEMA
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_forms_pokemon_id ON {}.forms(pokemon_id)", SCHEMA),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_forms_pokemon_name ON {}.forms(pokemon_name)",
            SCHEMA
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_forms_categories ON {}.forms USING GIN(categories)",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.species (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            s = SCHEMA
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_species_name ON {}.species(name)", SCHEMA),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.gender_descriptions (
                pokemon_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                fetched_at TIMESTAMPTZ NOT NULL,
                data TEXT NOT NULL
            )",
            s = SCHEMA
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_gender_name ON {}.gender_descriptions(name)",
            SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.regional_dex (
                region TEXT NOT NULL,
                dex_id INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (region, dex_id)
            )",
            s = SCHEMA
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {s}.favorites (
                user_id TEXT NOT NULL,
                pokemon_id INTEGER NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (user_id, pokemon_id)
            )",
            s = SCHEMA
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_favorites_user ON {}.favorites(user_id)", SCHEMA),
    ];

    for statement in statements {
        sqlx::query(&statement).execute(tx.as_mut()).await?;
    }
    Ok(())
}

fn tags_to_column(tags: &BTreeSet<FormCategory>) -> Vec<String> {
    tags.iter().map(|t| t.as_str().to_string()).collect()
}

fn tags_from_column(values: Vec<String>) -> BTreeSet<FormCategory> {
    values
        .iter()
        .filter_map(|v| match v.parse() {
            Ok(tag) => Some(tag),
            Err(e) => {
                log::warn!("⚠️ Ignoring stored tag: {}", e);
                None
            }
        })
        .collect()
}

fn decode_entity(row: &PgRow) -> Result<PokemonEntity, StoreError> {
    let data: String = row.try_get("data")?;
    let tags: Vec<String> = row.try_get("form_tags")?;
    let mut entity: PokemonEntity = serde_json::from_str(&data)?;
    // the column is authoritative: tag merges never rewrite `data`
    entity.form_tags.extend(tags_from_column(tags));
    Ok(entity)
}

fn decode_form(row: &PgRow) -> Result<PokemonForm, StoreError> {
    let data: String = row.try_get("data")?;
    let categories: Vec<String> = row.try_get("categories")?;
    let mut form: PokemonForm = serde_json::from_str(&data)?;
    form.categories.extend(tags_from_column(categories));
    Ok(form)
}

fn decode_data<T: serde::de::DeserializeOwned>(row: &PgRow) -> Result<T, StoreError> {
    let data: String = row.try_get("data")?;
    Ok(serde_json::from_str(&data)?)
}

fn decode_favorite(row: &PgRow) -> Result<Favorite, StoreError> {
    Ok(Favorite {
        user_id: row.try_get("user_id")?,
        pokemon_id: row.try_get::<i32, _>("pokemon_id")? as u32,
        created_at: row.try_get("created_at")?,
    })
}

/// `CacheStore` over Postgres.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub async fn connect(settings: &Database) -> Result<Self> {
        Ok(Self::from_pool(connect(settings).await?))
    }

    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl CacheStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn upsert_entity(&self, entity: PokemonEntity) -> Result<u32, StoreError> {
        let id = entity.id;
        if id == 0 {
            return Err(StoreError::Conflict("entity id 0 is reserved".to_string()));
        }
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(&format!(
            "SELECT data, form_tags FROM {}.entities WHERE id = $1 FOR UPDATE",
            SCHEMA
        ))
        .bind(id as i32)
        .fetch_optional(&mut *tx)
        .await?;

        let merged = match existing {
            Some(row) => {
                let mut cached = decode_entity(&row)?;
                cached.merge_from(entity);
                cached
            }
            None => entity,
        };

        sqlx::query(&format!(
            "INSERT INTO {}.entities AS e (id, name, generation, form_tags, data, updated_at)
             VALUES ($1, $2, $3, $4, $5, NOW())
             ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                generation = EXCLUDED.generation,
                form_tags = ARRAY(SELECT DISTINCT t FROM unnest(e.form_tags || EXCLUDED.form_tags) AS t ORDER BY t),
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at",
            SCHEMA
        ))
        .bind(id as i32)
        .bind(&merged.name)
        .bind(merged.generation.map(i16::from))
        .bind(tags_to_column(&merged.form_tags))
        .bind(serde_json::to_string(&merged)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn get_entity(&self, id: u32) -> Result<Option<PokemonEntity>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT data, form_tags FROM {}.entities WHERE id = $1",
            SCHEMA
        ))
        .bind(id as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_entity).transpose()
    }

    async fn query_entities(&self, index: &EntityIndex) -> Result<Vec<PokemonEntity>, StoreError> {
        let base = format!("SELECT data, form_tags FROM {}.entities", SCHEMA);
        let order = "ORDER BY id ASC, name ASC";
        let rows = match index {
            EntityIndex::ById(id) => {
                sqlx::query(&format!("{} WHERE id = $1 {}", base, order))
                    .bind(*id as i32)
                    .fetch_all(&self.pool)
                    .await?
            }
            EntityIndex::ByName(name) => {
                sqlx::query(&format!("{} WHERE name = $1 {}", base, order))
                    .bind(name.to_lowercase())
                    .fetch_all(&self.pool)
                    .await?
            }
            EntityIndex::ByGeneration(generation) => {
                sqlx::query(&format!("{} WHERE generation = $1 {}", base, order))
                    .bind(i16::from(*generation))
                    .fetch_all(&self.pool)
                    .await?
            }
            EntityIndex::NameSearch(term) => {
                sqlx::query(&format!("{} WHERE strpos(name, $1) > 0 {}", base, order))
                    .bind(term.trim().to_lowercase())
                    .fetch_all(&self.pool)
                    .await?
            }
            EntityIndex::ByFormTag(tag) => {
                sqlx::query(&format!("{} WHERE $1 = ANY(form_tags) {}", base, order))
                    .bind(tag.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            EntityIndex::IdRange(from, to) => {
                sqlx::query(&format!("{} WHERE id BETWEEN $1 AND $2 {}", base, order))
                    .bind(*from as i32)
                    .bind(*to as i32)
                    .fetch_all(&self.pool)
                    .await?
            }
            EntityIndex::All => {
                sqlx::query(&format!("{} {}", base, order))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(decode_entity).collect()
    }

    async fn merge_entity_tags(
        &self,
        id: u32,
        tags: &BTreeSet<FormCategory>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(&format!(
            "WITH old AS (
                SELECT id, cardinality(form_tags) AS n FROM {s}.entities WHERE id = $1 FOR UPDATE
             )
             UPDATE {s}.entities e SET
                form_tags = ARRAY(SELECT DISTINCT t FROM unnest(e.form_tags || $2::text[]) AS t ORDER BY t),
                updated_at = NOW()
             FROM old WHERE e.id = old.id
             RETURNING old.n AS old_n, cardinality(e.form_tags) AS new_n",
            s = SCHEMA
        ))
        .bind(id as i32)
        .bind(tags_to_column(tags))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let old_n: i32 = row.try_get("old_n")?;
                let new_n: i32 = row.try_get("new_n")?;
                Ok(new_n > old_n)
            }
            None => Ok(false),
        }
    }

    async fn count_entities(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query(&format!("SELECT COUNT(*) AS count FROM {}.entities", SCHEMA))
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(count as usize)
    }

    async fn upsert_form(&self, form: PokemonForm) -> Result<u32, StoreError> {
        let form_id = form.form_id;
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(&format!(
            "SELECT data, categories FROM {}.forms WHERE form_id = $1 FOR UPDATE",
            SCHEMA
        ))
        .bind(form_id as i32)
        .fetch_optional(&mut *tx)
        .await?;

        let merged = match existing {
            Some(row) => {
                let mut cached = decode_form(&row)?;
                cached.merge_from(form);
                cached
            }
            None => form,
        };

        sqlx::query(&format!(
            "INSERT INTO {}.forms AS f (form_id, pokemon_id, pokemon_name, categories, data, updated_at)
             VALUES ($1, $2, $3, $4, $5, NOW())
             ON CONFLICT (form_id) DO UPDATE SET
                pokemon_id = EXCLUDED.pokemon_id,
                pokemon_name = EXCLUDED.pokemon_name,
                categories = ARRAY(SELECT DISTINCT t FROM unnest(f.categories || EXCLUDED.categories) AS t ORDER BY t),
                data = EXCLUDED.data,
                updated_at = EXCLUDED.updated_at",
            SCHEMA
        ))
        .bind(form_id as i32)
        .bind(merged.pokemon_id as i32)
        .bind(&merged.pokemon_name)
        .bind(tags_to_column(&merged.categories))
        .bind(serde_json::to_string(&merged)?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(form_id)
    }

    async fn query_forms(&self, index: &FormIndex) -> Result<Vec<PokemonForm>, StoreError> {
        let base = format!("SELECT data, categories FROM {}.forms", SCHEMA);
        let rows = match index {
            FormIndex::ByFormId(id) => {
                sqlx::query(&format!("{} WHERE form_id = $1", base))
                    .bind(*id as i32)
                    .fetch_all(&self.pool)
                    .await?
            }
            FormIndex::ByPokemonId(id) => {
                sqlx::query(&format!("{} WHERE pokemon_id = $1", base))
                    .bind(*id as i32)
                    .fetch_all(&self.pool)
                    .await?
            }
            FormIndex::ByPokemonName(name) => {
                sqlx::query(&format!("{} WHERE pokemon_name = $1", base))
                    .bind(name.to_lowercase())
                    .fetch_all(&self.pool)
                    .await?
            }
            FormIndex::ByCategory(category) => {
                sqlx::query(&format!("{} WHERE $1 = ANY(categories)", base))
                    .bind(category.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        let mut forms = rows
            .iter()
            .map(decode_form)
            .collect::<Result<Vec<_>, _>>()?;
        sort_forms(&mut forms);
        Ok(forms)
    }

    async fn upsert_species(&self, species: SpeciesRecord) -> Result<u32, StoreError> {
        sqlx::query(&format!(
            "INSERT INTO {}.species (id, name, data, updated_at) VALUES ($1, $2, $3, NOW())
             ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, data = EXCLUDED.data, updated_at = EXCLUDED.updated_at",
            SCHEMA
        ))
        .bind(species.id as i32)
        .bind(&species.name)
        .bind(serde_json::to_string(&species)?)
        .execute(&self.pool)
        .await?;
        Ok(species.id)
    }

    async fn get_species(&self, id: u32) -> Result<Option<SpeciesRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT data FROM {}.species WHERE id = $1", SCHEMA))
            .bind(id as i32)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(decode_data).transpose()
    }

    async fn get_species_by_name(&self, name: &str) -> Result<Option<SpeciesRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT data FROM {}.species WHERE name = $1 ORDER BY id LIMIT 1",
            SCHEMA
        ))
        .bind(name.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_data).transpose()
    }

    async fn upsert_gender_description(
        &self,
        description: GenderDifferenceDescription,
    ) -> Result<u32, StoreError> {
        sqlx::query(&format!(
            "INSERT INTO {}.gender_descriptions (pokemon_id, name, fetched_at, data)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (pokemon_id) DO UPDATE SET
                name = EXCLUDED.name, fetched_at = EXCLUDED.fetched_at, data = EXCLUDED.data",
            SCHEMA
        ))
        .bind(description.pokemon_id as i32)
        .bind(&description.name)
        .bind(description.fetched_at)
        .bind(serde_json::to_string(&description)?)
        .execute(&self.pool)
        .await?;
        Ok(description.pokemon_id)
    }

    async fn get_gender_description(
        &self,
        pokemon_id: u32,
    ) -> Result<Option<GenderDifferenceDescription>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT data FROM {}.gender_descriptions WHERE pokemon_id = $1",
            SCHEMA
        ))
        .bind(pokemon_id as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_data).transpose()
    }

    async fn get_gender_description_by_name(
        &self,
        name: &str,
    ) -> Result<Option<GenderDifferenceDescription>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT data FROM {}.gender_descriptions WHERE name = $1 ORDER BY pokemon_id LIMIT 1",
            SCHEMA
        ))
        .bind(name.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_data).transpose()
    }

    async fn upsert_regional_entries(&self, entries: Vec<RegionalDexEntry>) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        for entry in &entries {
            sqlx::query(&format!(
                "INSERT INTO {}.regional_dex (region, dex_id, data) VALUES ($1, $2, $3)
                 ON CONFLICT (region, dex_id) DO UPDATE SET data = EXCLUDED.data",
                SCHEMA
            ))
            .bind(&entry.region)
            .bind(entry.dex_id as i32)
            .bind(serde_json::to_string(entry)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(entries.len())
    }

    async fn query_region(&self, region: &str) -> Result<Vec<RegionalDexEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT data FROM {}.regional_dex WHERE region = $1 ORDER BY dex_id ASC",
            SCHEMA
        ))
        .bind(region)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_data).collect()
    }

    async fn purge_region(&self, region: &str) -> Result<usize, StoreError> {
        let result = sqlx::query(&format!("DELETE FROM {}.regional_dex WHERE region = $1", SCHEMA))
            .bind(region)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn insert_favorite(&self, favorite: Favorite) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO {}.favorites (user_id, pokemon_id, created_at) VALUES ($1, $2, $3)
             ON CONFLICT (user_id, pokemon_id) DO NOTHING",
            SCHEMA
        ))
        .bind(&favorite.user_id)
        .bind(favorite.pokemon_id as i32)
        .bind(favorite.created_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "pokemon {} is already a favorite of {}",
                favorite.pokemon_id, favorite.user_id
            )));
        }
        Ok(())
    }

    async fn delete_favorite(&self, user_id: &str, pokemon_id: u32) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {}.favorites WHERE user_id = $1 AND pokemon_id = $2",
            SCHEMA
        ))
        .bind(user_id)
        .bind(pokemon_id as i32)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "pokemon {} is not a favorite of {}",
                pokemon_id, user_id
            )));
        }
        Ok(())
    }

    async fn get_favorite(&self, user_id: &str, pokemon_id: u32) -> Result<Option<Favorite>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT user_id, pokemon_id, created_at FROM {}.favorites
             WHERE user_id = $1 AND pokemon_id = $2",
            SCHEMA
        ))
        .bind(user_id)
        .bind(pokemon_id as i32)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_favorite).transpose()
    }

    async fn list_favorites(&self, user_id: &str) -> Result<Vec<Favorite>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT user_id, pokemon_id, created_at FROM {}.favorites
             WHERE user_id = $1 ORDER BY created_at ASC, pokemon_id ASC",
            SCHEMA
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(decode_favorite).collect()
    }

    async fn clear(&self, scopes: &[CacheScope]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for scope in scopes {
            let table = match scope {
                CacheScope::Pokemon => "entities",
                CacheScope::Species => "species",
                CacheScope::Forms => "forms",
                CacheScope::Regional => "regional_dex",
                CacheScope::Gender => "gender_descriptions",
            };
            sqlx::query(&format!("DELETE FROM {}.{}", SCHEMA, table))
                .execute(&mut *tx)
                .await?;
            log::info!("🧹 Cleared {} cache", scope);
        }
        tx.commit().await?;
        Ok(())
    }
}
