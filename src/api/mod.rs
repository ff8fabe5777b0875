pub mod auth;
pub mod collections;
pub mod ingredients;
pub mod recipes;
pub mod subscriptions;
pub mod users;

use std::collections::HashSet;

use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::{web, HttpRequest};
use serde::Serialize;

use crate::config::Config;
use crate::db::DbConn;
use crate::error::{ApiError, FieldErrors, StoreError};
use crate::media::MediaError;
use crate::models::{Recipe, User};
use crate::query;

/// Registers every endpoint plus the extractor error handlers.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .service(auth::login)
        .service(auth::logout)
        .service(users::register)
        .service(users::list_users)
        .service(users::me)
        .service(users::set_password)
        .service(users::put_avatar)
        .service(users::delete_avatar)
        .service(users::get_user)
        .service(subscriptions::list_subscriptions)
        .service(subscriptions::subscribe)
        .service(subscriptions::unsubscribe)
        .service(ingredients::list_ingredients)
        .service(ingredients::get_ingredient)
        .service(collections::download_shopping_cart)
        .service(collections::add_favorite)
        .service(collections::remove_favorite)
        .service(collections::add_to_cart)
        .service(collections::remove_from_cart)
        .service(recipes::list_recipes)
        .service(recipes::create_recipe)
        .service(recipes::get_recipe)
        .service(recipes::update_recipe)
        .service(recipes::delete_recipe)
        .service(recipes::short_link);
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Некорректный JSON: {err}")).into()
}

fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Некорректные параметры запроса: {err}")).into()
}

/// Turns a media failure into a validation error on `field`.
pub(crate) fn media_field_error(field: &str, err: MediaError) -> ApiError {
    match err {
        MediaError::Io(io) => ApiError::Internal(format!("media write failed: {io}")),
        _ => ApiError::Validation(FieldErrors::single(field, "Неправильный формат изображения")),
    }
}

#[derive(Debug, Serialize)]
pub struct UserRead {
    pub email: String,
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

impl UserRead {
    pub fn new(user: &User, is_subscribed: bool, config: &Config) -> Self {
        Self {
            email: user.email.clone(),
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed,
            avatar: user.avatar.as_deref().map(|path| config.media_url(path)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeShort {
    pub id: i32,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl RecipeShort {
    pub fn new(recipe: &Recipe, config: &Config) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name.clone(),
            image: config.media_url(&recipe.image),
            cooking_time: recipe.cooking_time,
        }
    }
}

/// Authors among `author_ids` the viewer follows; empty for anonymous viewers.
pub(crate) fn followed_by_viewer(
    conn: &mut DbConn,
    viewer: Option<i32>,
    author_ids: &[i32],
) -> Result<HashSet<i32>, StoreError> {
    match viewer {
        Some(viewer) => query::followed_among(conn, viewer, author_ids),
        None => Ok(HashSet::new()),
    }
}
