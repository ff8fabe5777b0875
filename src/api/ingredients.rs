use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

use crate::db::{with_conn, DbPool};
use crate::error::ApiError;
use crate::query;

#[derive(Debug, Default, Deserialize)]
pub struct IngredientSearch {
    pub name: Option<String>,
}

/// Unpaginated list, optionally narrowed to names starting with `?name=`.
#[get("/api/ingredients/")]
pub async fn list_ingredients(
    pool: web::Data<DbPool>,
    params: web::Query<IngredientSearch>,
) -> Result<HttpResponse, ApiError> {
    let prefix = params.into_inner().name;
    let found = with_conn(&pool, move |conn| {
        Ok(query::search_ingredients(conn, prefix.as_deref())?)
    })
    .await?;
    Ok(HttpResponse::Ok().json(found))
}

#[get("/api/ingredients/{id:\\d+}/")]
pub async fn get_ingredient(
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, ApiError> {
    let ingredient_id = path.into_inner();
    let ingredient = with_conn(&pool, move |conn| {
        Ok(query::ingredient_by_id(conn, ingredient_id)?)
    })
    .await?;
    Ok(HttpResponse::Ok().json(ingredient))
}
