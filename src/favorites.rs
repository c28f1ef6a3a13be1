// Per-user favorites. Mutations check existence and report conflicts instead of
// silently succeeding; cache clears never touch this table.

use chrono::Utc;
use log::info;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::store::CacheStore;
use crate::types::Favorite;

pub struct Favorites {
    store: Arc<dyn CacheStore>,
}

fn user_key(user_id: &str) -> Result<&str, ServiceError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(ServiceError::validation("user id is required"));
    }
    Ok(user_id)
}

impl Favorites {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// `NotFound` when the pokemon is not cached, `Conflict` when already a favorite.
    pub async fn add(&self, user_id: &str, pokemon_id: u32) -> Result<Favorite, ServiceError> {
        let user_id = user_key(user_id)?;
        if self.store.get_entity(pokemon_id).await?.is_none() {
            return Err(ServiceError::not_found(format!("pokemon {} is not cached", pokemon_id)));
        }
        let favorite = Favorite {
            user_id: user_id.to_string(),
            pokemon_id,
            created_at: Utc::now(),
        };
        self.store.insert_favorite(favorite.clone()).await?;
        info!("⭐ {} favorited {}", user_id, pokemon_id);
        Ok(favorite)
    }

    pub async fn remove(&self, user_id: &str, pokemon_id: u32) -> Result<(), ServiceError> {
        let user_id = user_key(user_id)?;
        self.store.delete_favorite(user_id, pokemon_id).await?;
        Ok(())
    }

    /// Flips the favorite; returns whether it is a favorite afterwards.
    pub async fn toggle(&self, user_id: &str, pokemon_id: u32) -> Result<bool, ServiceError> {
        let user_id = user_key(user_id)?;
        if self.store.get_favorite(user_id, pokemon_id).await?.is_some() {
            self.remove(user_id, pokemon_id).await?;
            Ok(false)
        } else {
            self.add(user_id, pokemon_id).await?;
            Ok(true)
        }
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Favorite>, ServiceError> {
        let user_id = user_key(user_id)?;
        Ok(self.store.list_favorites(user_id).await?)
    }
}
