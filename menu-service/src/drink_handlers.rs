use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use common_auth::AuthContext;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api_error::{ApiError, ApiResult};
use crate::app_state::AppState;
use crate::drinks::{Drink, DrinkPatch, NewDrink, RecipeInput, ShortDrink};

#[derive(Serialize)]
pub struct DrinksResponse<T> {
    pub success: bool,
    pub drinks: Vec<T>,
}

impl<T> DrinksResponse<T> {
    fn ok(drinks: Vec<T>) -> Json<Self> {
        Json(Self {
            success: true,
            drinks,
        })
    }
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub delete: i32,
}

#[derive(Deserialize)]
pub struct CreateDrink {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub recipe: Option<RecipeInput>,
}

#[derive(Deserialize)]
pub struct UpdateDrink {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub recipe: Option<RecipeInput>,
}

fn clean_title(title: String) -> ApiResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn actor(auth: &AuthContext) -> &str {
    auth.subject().unwrap_or("unknown")
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn list_drinks(State(state): State<AppState>) -> ApiResult<Json<DrinksResponse<ShortDrink>>> {
    let drinks = state.drinks.list().await?;
    Ok(DrinksResponse::ok(drinks.iter().map(Drink::short).collect()))
}

pub async fn list_drinks_detail(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthContext>,
) -> ApiResult<Json<DrinksResponse<Drink>>> {
    let drinks = state.drinks.list().await?;
    Ok(DrinksResponse::ok(drinks.iter().map(Drink::long).collect()))
}

pub async fn create_drink(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    payload: Result<Json<CreateDrink>, JsonRejection>,
) -> ApiResult<Json<DrinksResponse<Drink>>> {
    let Json(input) = payload?;
    let title = input
        .title
        .ok_or_else(|| ApiError::bad_request("title is required"))
        .and_then(clean_title)?;
    let recipe = input
        .recipe
        .ok_or_else(|| ApiError::bad_request("recipe is required"))?
        .into_vec();

    let drink = state.drinks.insert(NewDrink { title, recipe }).await?;
    info!(drink_id = drink.id, actor = actor(&auth), "drink created");
    Ok(DrinksResponse::ok(vec![drink.long()]))
}

pub async fn update_drink(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(drink_id): Path<i32>,
    payload: Result<Json<UpdateDrink>, JsonRejection>,
) -> ApiResult<Json<DrinksResponse<Drink>>> {
    let Json(input) = payload?;
    let patch = DrinkPatch {
        title: input.title.map(clean_title).transpose()?,
        // an empty recipe leaves the stored one unchanged
        recipe: input
            .recipe
            .map(RecipeInput::into_vec)
            .filter(|recipe| !recipe.is_empty()),
    };

    let found = if patch.is_empty() {
        state.drinks.get(drink_id).await?
    } else {
        state.drinks.update(drink_id, patch).await?
    };
    let drink = found.ok_or(ApiError::NotFound)?;

    info!(drink_id, actor = actor(&auth), "drink updated");
    Ok(DrinksResponse::ok(vec![drink.long()]))
}

pub async fn delete_drink(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(drink_id): Path<i32>,
) -> ApiResult<Json<DeleteResponse>> {
    if !state.drinks.delete(drink_id).await? {
        return Err(ApiError::NotFound);
    }

    info!(drink_id, actor = actor(&auth), "drink deleted");
    Ok(Json(DeleteResponse {
        success: true,
        delete: drink_id,
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
