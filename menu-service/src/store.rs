use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::drinks::{Drink, DrinkPatch, Ingredient, NewDrink};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a drink titled '{0}' already exists")]
    DuplicateTitle(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored recipe is not valid JSON: {0}")]
    CorruptRecipe(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for the drinks menu.
#[async_trait]
pub trait DrinkStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<Drink>>;
    async fn get(&self, id: i32) -> StoreResult<Option<Drink>>;
    async fn insert(&self, drink: NewDrink) -> StoreResult<Drink>;
    /// `Ok(None)` when no drink has `id`.
    async fn update(&self, id: i32, patch: DrinkPatch) -> StoreResult<Option<Drink>>;
    /// `Ok(false)` when no drink has `id`.
    async fn delete(&self, id: i32) -> StoreResult<bool>;
}

pub struct PgDrinkStore {
    pool: PgPool,
}

impl PgDrinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_drink(row: &sqlx::postgres::PgRow) -> StoreResult<Drink> {
    let recipe: String = row.try_get("recipe")?;
    Ok(Drink {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        recipe: serde_json::from_str::<Vec<Ingredient>>(&recipe)?,
    })
}

fn map_unique(err: sqlx::Error, title: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::DuplicateTitle(title.to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl DrinkStore for PgDrinkStore {
    async fn list(&self) -> StoreResult<Vec<Drink>> {
        let rows = sqlx::query("SELECT id, title, recipe FROM drinks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_drink).collect()
    }

    async fn get(&self, id: i32) -> StoreResult<Option<Drink>> {
        let row = sqlx::query("SELECT id, title, recipe FROM drinks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_drink).transpose()
    }

    async fn insert(&self, drink: NewDrink) -> StoreResult<Drink> {
        let recipe = serde_json::to_string(&drink.recipe)?;
        let row = sqlx::query(
            "INSERT INTO drinks (title, recipe) VALUES ($1, $2) RETURNING id, title, recipe",
        )
        .bind(&drink.title)
        .bind(recipe)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_unique(err, &drink.title))?;
        row_to_drink(&row)
    }

    async fn update(&self, id: i32, patch: DrinkPatch) -> StoreResult<Option<Drink>> {
        let recipe = patch
            .recipe
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let title = patch.title.clone().unwrap_or_default();
        let row = sqlx::query(
            "UPDATE drinks SET title = COALESCE($2, title), recipe = COALESCE($3, recipe) \
             WHERE id = $1 RETURNING id, title, recipe",
        )
        .bind(id)
        .bind(patch.title.as_deref())
        .bind(recipe)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| map_unique(err, &title))?;
        row.as_ref().map(row_to_drink).transpose()
    }

    async fn delete(&self, id: i32) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM drinks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Default)]
struct MemoryState {
    last_id: i32,
    drinks: BTreeMap<i32, Drink>,
}

impl MemoryState {
    fn title_taken(&self, title: &str, except: Option<i32>) -> bool {
        self.drinks
            .values()
            .any(|drink| drink.title == title && Some(drink.id) != except)
    }
}

/// Process-local store used when no database is configured, and by tests.
#[derive(Default)]
pub struct InMemoryDrinkStore {
    state: Mutex<MemoryState>,
}

impl InMemoryDrinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DrinkStore for InMemoryDrinkStore {
    async fn list(&self) -> StoreResult<Vec<Drink>> {
        Ok(self.lock().drinks.values().cloned().collect())
    }

    async fn get(&self, id: i32) -> StoreResult<Option<Drink>> {
        Ok(self.lock().drinks.get(&id).cloned())
    }

    async fn insert(&self, drink: NewDrink) -> StoreResult<Drink> {
        let mut state = self.lock();
        if state.title_taken(&drink.title, None) {
            return Err(StoreError::DuplicateTitle(drink.title));
        }
        state.last_id += 1;
        let stored = Drink {
            id: state.last_id,
            title: drink.title,
            recipe: drink.recipe,
        };
        state.drinks.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: i32, patch: DrinkPatch) -> StoreResult<Option<Drink>> {
        let mut state = self.lock();
        if let Some(title) = &patch.title {
            if state.title_taken(title, Some(id)) {
                return Err(StoreError::DuplicateTitle(title.clone()));
            }
        }
        let Some(drink) = state.drinks.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            drink.title = title;
        }
        if let Some(recipe) = patch.recipe {
            drink.recipe = recipe;
        }
        Ok(Some(drink.clone()))
    }

    async fn delete(&self, id: i32) -> StoreResult<bool> {
        Ok(self.lock().drinks.remove(&id).is_some())
    }
}
