use std::collections::HashMap;

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use super::{RecipeShort, UserRead};
use crate::auth::AuthUser;
use crate::config::Config;
use crate::db::{with_conn, DbConn, DbPool};
use crate::error::{ApiError, StoreError};
use crate::models::{Recipe, User};
use crate::pagination::{PageParams, Pagination};
use crate::query;

#[derive(Debug, Default, Deserialize)]
pub struct RecipesLimit {
    pub recipes_limit: Option<String>,
}

impl RecipesLimit {
    /// Values that do not parse as a non-negative integer are ignored.
    fn value(&self) -> Option<usize> {
        self.recipes_limit.as_deref()?.trim().parse().ok()
    }
}

/// A followed author together with (a prefix of) their recipes.
#[derive(Debug, Serialize)]
pub struct AuthorWithRecipes {
    #[serde(flatten)]
    pub user: UserRead,
    pub recipes: Vec<RecipeShort>,
    pub recipes_count: i64,
}

struct AuthorRows {
    authors: Vec<User>,
    recipes: HashMap<i32, Vec<Recipe>>,
    counts: HashMap<i32, i64>,
}

fn load_author_rows(conn: &mut DbConn, authors: Vec<User>) -> Result<AuthorRows, StoreError> {
    let ids: Vec<i32> = authors.iter().map(|author| author.id).collect();
    Ok(AuthorRows {
        recipes: query::recipes_by_authors(conn, &ids)?,
        counts: query::recipe_counts(conn, &ids)?,
        authors,
    })
}

impl AuthorRows {
    fn into_read(mut self, limit: Option<usize>, config: &Config) -> Vec<AuthorWithRecipes> {
        self.authors
            .iter()
            .map(|author| {
                let recipes = self.recipes.remove(&author.id).unwrap_or_default();
                let shown = limit.unwrap_or(recipes.len()).min(recipes.len());
                AuthorWithRecipes {
                    user: UserRead::new(author, true, config),
                    recipes: recipes[..shown]
                        .iter()
                        .map(|recipe| RecipeShort::new(recipe, config))
                        .collect(),
                    recipes_count: self.counts.get(&author.id).copied().unwrap_or(0),
                }
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub recipes_limit: Option<String>,
}

#[get("/api/users/subscriptions/")]
pub async fn list_subscriptions(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    params: web::Query<SubscriptionParams>,
) -> Result<HttpResponse, ApiError> {
    let SubscriptionParams {
        page,
        limit,
        recipes_limit,
    } = params.into_inner();
    let pagination = Pagination::from_params(&PageParams { page, limit })?;
    let recipes_limit = RecipesLimit { recipes_limit }.value();
    let follower = auth.user.id;

    let (count, rows) = with_conn(&pool, move |conn| {
        let (count, authors) =
            query::followed_authors(conn, follower, pagination.offset(), pagination.limit())?;
        pagination.check(count)?;
        Ok((count, load_author_rows(conn, authors)?))
    })
    .await?;

    let results = rows.into_read(recipes_limit, &config);
    Ok(HttpResponse::Ok().json(pagination.into_page(&req, count, results)))
}

#[post("/api/users/{id:\\d+}/subscribe/")]
pub async fn subscribe(
    path: web::Path<i32>,
    auth: AuthUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    params: web::Query<RecipesLimit>,
) -> Result<HttpResponse, ApiError> {
    let author_id = path.into_inner();
    let follower = auth.user.id;
    if follower == author_id {
        return Err(StoreError::SelfFollow.into());
    }

    let rows = with_conn(&pool, move |conn| {
        let author = query::user_by_id(conn, author_id)?;
        query::follow(conn, follower, author.id).map_err(|err| match err {
            StoreError::Duplicate => {
                ApiError::BadRequest("Вы уже подписаны на этого пользователя".to_string())
            }
            other => other.into(),
        })?;
        Ok(load_author_rows(conn, vec![author])?)
    })
    .await?;

    log::info!("user {follower} subscribed to {author_id}");
    let mut created = rows.into_read(params.value(), &config);
    match created.pop() {
        Some(author) => Ok(HttpResponse::Created().json(author)),
        None => Err(ApiError::not_found()),
    }
}

#[delete("/api/users/{id:\\d+}/subscribe/")]
pub async fn unsubscribe(
    path: web::Path<i32>,
    auth: AuthUser,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let author_id = path.into_inner();
    let follower = auth.user.id;

    with_conn(&pool, move |conn| {
        let author = query::user_by_id(conn, author_id)?;
        query::unfollow(conn, follower, author.id).map_err(|err| match err {
            StoreError::NotFound => {
                ApiError::BadRequest("Вы не подписаны на этого пользователя".to_string())
            }
            other => other.into(),
        })
    })
    .await?;

    Ok(HttpResponse::NoContent().finish())
}
