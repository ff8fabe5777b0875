use actix_web::http::header;
use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;

use super::RecipeShort;
use crate::auth::AuthUser;
use crate::config::Config;
use crate::db::{with_conn, DbPool};
use crate::error::{ApiError, StoreError};
use crate::query::{self, Collection};
use crate::shopping_list::{self, ShoppingListFormat};

fn already_added(collection: Collection) -> ApiError {
    ApiError::Duplicate(
        match collection {
            Collection::Favorites => "Рецепт уже есть в избранном",
            Collection::ShoppingCart => "Рецепт уже есть в списке покупок",
        }
        .to_string(),
    )
}

fn not_added(collection: Collection) -> ApiError {
    ApiError::BadRequest(
        match collection {
            Collection::Favorites => "Рецепта нет в избранном",
            Collection::ShoppingCart => "Рецепта нет в списке покупок",
        }
        .to_string(),
    )
}

async fn add(
    collection: Collection,
    recipe_id: i32,
    auth: AuthUser,
    pool: &DbPool,
    config: &Config,
) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user.id;
    let recipe = with_conn(pool, move |conn| {
        let recipe = query::recipe_by_id(conn, recipe_id)?;
        query::add_to_collection(conn, collection, user_id, recipe.id).map_err(|err| match err {
            StoreError::Duplicate => already_added(collection),
            other => other.into(),
        })?;
        Ok(recipe)
    })
    .await?;
    Ok(HttpResponse::Created().json(RecipeShort::new(&recipe, config)))
}

async fn remove(
    collection: Collection,
    recipe_id: i32,
    auth: AuthUser,
    pool: &DbPool,
) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user.id;
    with_conn(pool, move |conn| {
        let recipe = query::recipe_by_id(conn, recipe_id)?;
        query::remove_from_collection(conn, collection, user_id, recipe.id).map_err(|err| {
            match err {
                StoreError::NotFound => not_added(collection),
                other => other.into(),
            }
        })
    })
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/api/recipes/{id:\\d+}/favorite/")]
pub async fn add_favorite(
    path: web::Path<i32>,
    auth: AuthUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    add(Collection::Favorites, path.into_inner(), auth, &pool, &config).await
}

#[delete("/api/recipes/{id:\\d+}/favorite/")]
pub async fn remove_favorite(
    path: web::Path<i32>,
    auth: AuthUser,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    remove(Collection::Favorites, path.into_inner(), auth, &pool).await
}

#[post("/api/recipes/{id:\\d+}/shopping_cart/")]
pub async fn add_to_cart(
    path: web::Path<i32>,
    auth: AuthUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    add(Collection::ShoppingCart, path.into_inner(), auth, &pool, &config).await
}

#[delete("/api/recipes/{id:\\d+}/shopping_cart/")]
pub async fn remove_from_cart(
    path: web::Path<i32>,
    auth: AuthUser,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    remove(Collection::ShoppingCart, path.into_inner(), auth, &pool).await
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    pub format: Option<String>,
}

/// Aggregated ingredients of every recipe in the cart as a txt, csv or pdf
/// attachment. An empty cart wins over an unknown format.
#[get("/api/recipes/download_shopping_cart/")]
pub async fn download_shopping_cart(
    auth: AuthUser,
    pool: web::Data<DbPool>,
    params: web::Query<DownloadParams>,
) -> Result<HttpResponse, ApiError> {
    let user_id = auth.user.id;
    let items = with_conn(&pool, move |conn| shopping_list::build_for_user(conn, user_id)).await?;

    let format = match params.format.as_deref() {
        Some(raw) => raw
            .parse::<ShoppingListFormat>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => ShoppingListFormat::default(),
    };
    let body = format.render(&items);
    log::info!(
        "user {user_id} downloaded a {} shopping list with {} items",
        format.extension(),
        items.len()
    );

    Ok(HttpResponse::Ok()
        .content_type(format.content_type())
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", format.filename()),
        ))
        .body(body))
}
