use std::collections::{BTreeSet, HashMap, HashSet};

use actix_web::{delete, get, patch, post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use super::{followed_by_viewer, media_field_error, UserRead};
use crate::auth::{AuthUser, MaybeUser};
use crate::config::Config;
use crate::db::{with_conn, DbConn, DbPool};
use crate::error::{ApiError, FieldErrors, StoreError};
use crate::media::{self, DataImage};
use crate::models::{IngredientLine, NewRecipe, Recipe, RecipeChanges, User};
use crate::pagination::{PageParams, Pagination};
use crate::query::{self, Collection, RecipeFilter};

const MIN_VALUE: i64 = 1;
const MAX_VALUE: i64 = 32000;
const NAME_MAX_LEN: usize = 200;

const REQUIRED: &str = "Обязательное поле.";
const NOT_AUTHOR: &str = "Вы не являетесь автором этого рецепта";

// ---------------------------------------------------------------- read side

#[derive(Debug, Serialize)]
pub struct IngredientAmountRead {
    pub id: i32,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<IngredientLine> for IngredientAmountRead {
    fn from(line: IngredientLine) -> Self {
        Self {
            id: line.ingredient_id,
            name: line.name,
            measurement_unit: line.measurement_unit,
            amount: line.amount,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipeRead {
    pub id: i32,
    pub author: UserRead,
    pub ingredients: Vec<IngredientAmountRead>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// Everything needed to render a batch of recipes, fetched with one query
/// per relation regardless of the batch size.
struct RecipeRows {
    recipes: Vec<Recipe>,
    authors: HashMap<i32, User>,
    lines: HashMap<i32, Vec<IngredientLine>>,
    favorited: HashSet<i32>,
    in_cart: HashSet<i32>,
    followed: HashSet<i32>,
}

fn load_recipe_rows(
    conn: &mut DbConn,
    viewer: Option<i32>,
    recipes: Vec<Recipe>,
) -> Result<RecipeRows, StoreError> {
    let ids: Vec<i32> = recipes.iter().map(|recipe| recipe.id).collect();
    let author_ids: Vec<i32> = recipes
        .iter()
        .map(|recipe| recipe.author_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut lines: HashMap<i32, Vec<IngredientLine>> = HashMap::new();
    for line in query::ingredient_lines_for(conn, &ids)? {
        lines.entry(line.recipe_id).or_default().push(line);
    }

    let (favorited, in_cart) = match viewer {
        Some(user) => (
            query::collection_members(conn, Collection::Favorites, user, &ids)?,
            query::collection_members(conn, Collection::ShoppingCart, user, &ids)?,
        ),
        None => (HashSet::new(), HashSet::new()),
    };

    Ok(RecipeRows {
        authors: query::users_by_ids(conn, &author_ids)?,
        followed: followed_by_viewer(conn, viewer, &author_ids)?,
        recipes,
        lines,
        favorited,
        in_cart,
    })
}

impl RecipeRows {
    fn into_read(mut self, config: &Config) -> Result<Vec<RecipeRead>, ApiError> {
        let mut out = Vec::with_capacity(self.recipes.len());
        for recipe in self.recipes {
            let author = self.authors.get(&recipe.author_id).ok_or_else(|| {
                ApiError::Internal(format!("author of recipe {} is missing", recipe.id))
            })?;
            let ingredients = self
                .lines
                .remove(&recipe.id)
                .unwrap_or_default()
                .into_iter()
                .map(IngredientAmountRead::from)
                .collect();
            out.push(RecipeRead {
                id: recipe.id,
                author: UserRead::new(author, self.followed.contains(&author.id), config),
                ingredients,
                is_favorited: self.favorited.contains(&recipe.id),
                is_in_shopping_cart: self.in_cart.contains(&recipe.id),
                image: config.media_url(&recipe.image),
                name: recipe.name,
                text: recipe.text,
                cooking_time: recipe.cooking_time,
            });
        }
        Ok(out)
    }

    fn into_single(self, config: &Config) -> Result<RecipeRead, ApiError> {
        self.into_read(config)?
            .pop()
            .ok_or_else(|| ApiError::Internal("recipe vanished while rendering".to_string()))
    }
}

// ---------------------------------------------------------------- write side

#[derive(Debug, Deserialize)]
pub struct IngredientAmount {
    pub id: i64,
    pub amount: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RecipeWrite {
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub image: Option<String>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i64>,
}

/// A write request whose fields passed validation. Absent fields were not
/// sent (only possible for partial updates).
#[derive(Debug, Default)]
struct CheckedRecipe {
    name: Option<String>,
    text: Option<String>,
    cooking_time: Option<i32>,
    image: Option<DataImage>,
    items: Option<Vec<(i32, i32)>>,
}

fn range_error(value: i64) -> Option<String> {
    if value < MIN_VALUE {
        Some(format!("Убедитесь, что это значение больше либо равно {MIN_VALUE}."))
    } else if value > MAX_VALUE {
        Some(format!("Убедитесь, что это значение меньше либо равно {MAX_VALUE}."))
    } else {
        None
    }
}

fn check_items(items: &[IngredientAmount], errors: &mut FieldErrors) -> Option<Vec<(i32, i32)>> {
    if items.is_empty() {
        errors.add("ingredients", "Должен быть указан хотя бы один ингредиент");
        return None;
    }
    let mut seen = HashSet::new();
    if !items.iter().all(|item| seen.insert(item.id)) {
        errors.add("ingredients", "Ингредиенты не должны повторяться");
        return None;
    }

    let mut checked = Vec::with_capacity(items.len());
    for item in items {
        if let Some(problem) = range_error(item.amount) {
            errors.add("ingredients", format!("Количество ингредиента {}: {problem}", item.id));
            continue;
        }
        match i32::try_from(item.id) {
            Ok(id) => checked.push((id, item.amount as i32)),
            Err(_) => errors.add("ingredients", unknown_ingredient(item.id)),
        }
    }
    Some(checked)
}

fn unknown_ingredient(id: impl std::fmt::Display) -> String {
    format!("Недопустимый первичный ключ \"{id}\" - объект не существует.")
}

/// Validates everything that can be checked without the database. With
/// `partial` set, absent fields are left untouched instead of required.
fn check_write(write: RecipeWrite, partial: bool) -> Result<CheckedRecipe, ApiError> {
    let mut errors = FieldErrors::new();
    let mut checked = CheckedRecipe::default();

    match write.name.map(|name| name.trim().to_string()) {
        Some(name) if name.is_empty() => errors.add("name", REQUIRED),
        Some(name) if name.chars().count() > NAME_MAX_LEN => errors.add(
            "name",
            format!("Убедитесь, что это значение содержит не более {NAME_MAX_LEN} символов."),
        ),
        Some(name) => checked.name = Some(name),
        None if !partial => errors.add("name", REQUIRED),
        None => {}
    }

    match write.text {
        Some(text) if text.trim().is_empty() => errors.add("text", REQUIRED),
        Some(text) => checked.text = Some(text),
        None if !partial => errors.add("text", REQUIRED),
        None => {}
    }

    match write.cooking_time {
        Some(minutes) => match range_error(minutes) {
            Some(problem) => errors.add("cooking_time", problem),
            None => checked.cooking_time = Some(minutes as i32),
        },
        None if !partial => errors.add("cooking_time", REQUIRED),
        None => {}
    }

    match write.image.filter(|data| !data.trim().is_empty()) {
        Some(data) => match DataImage::parse(&data) {
            Ok(image) => checked.image = Some(image),
            Err(_) => errors.add("image", "Неправильный формат изображения"),
        },
        None if !partial => errors.add("image", REQUIRED),
        None => {}
    }

    match write.ingredients {
        Some(items) => checked.items = check_items(&items, &mut errors),
        None if !partial => {
            errors.add("ingredients", "Должен быть указан хотя бы один ингредиент")
        }
        None => {}
    }

    errors.into_result()?;
    Ok(checked)
}

fn ensure_ingredients_exist(conn: &mut DbConn, items: &[(i32, i32)]) -> Result<(), ApiError> {
    let ids: Vec<i32> = items.iter().map(|&(id, _)| id).collect();
    let known = query::existing_ingredient_ids(conn, &ids)?;
    let mut errors = FieldErrors::new();
    for id in ids.iter().filter(|id| !known.contains(id)) {
        errors.add("ingredients", unknown_ingredient(id));
    }
    errors.into_result()
}

// ---------------------------------------------------------------- handlers

#[derive(Debug, Default, Deserialize)]
pub struct RecipeListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub author: Option<String>,
    pub is_favorited: Option<String>,
    pub is_in_shopping_cart: Option<String>,
}

impl RecipeListParams {
    /// Collection filters apply only to authenticated viewers.
    fn filter(&self, viewer: Option<i32>) -> Result<RecipeFilter, ApiError> {
        let author = match self.author.as_deref().map(str::trim) {
            Some(raw) => Some(raw.parse::<i32>().map_err(|_| {
                ApiError::BadRequest(format!("Некорректный идентификатор автора: {raw}"))
            })?),
            None => None,
        };
        let flag = |value: &Option<String>| value.as_deref() == Some("1");
        Ok(RecipeFilter {
            author,
            favorited_by: viewer.filter(|_| flag(&self.is_favorited)),
            in_cart_of: viewer.filter(|_| flag(&self.is_in_shopping_cart)),
        })
    }
}

#[get("/api/recipes/")]
pub async fn list_recipes(
    req: HttpRequest,
    viewer: MaybeUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    params: web::Query<RecipeListParams>,
) -> Result<HttpResponse, ApiError> {
    let params = params.into_inner();
    let pagination = Pagination::from_params(&PageParams {
        page: params.page.clone(),
        limit: params.limit.clone(),
    })?;
    let viewer = viewer.id();
    let filter = params.filter(viewer)?;

    let (count, rows) = with_conn(&pool, move |conn| {
        let (count, recipes) =
            query::list_recipes(conn, &filter, pagination.offset(), pagination.limit())?;
        pagination.check(count)?;
        Ok((count, load_recipe_rows(conn, viewer, recipes)?))
    })
    .await?;

    let results = rows.into_read(&config)?;
    Ok(HttpResponse::Ok().json(pagination.into_page(&req, count, results)))
}

#[post("/api/recipes/")]
pub async fn create_recipe(
    auth: AuthUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<RecipeWrite>,
) -> Result<HttpResponse, ApiError> {
    let checked = check_write(body.into_inner(), false)?;
    let (Some(name), Some(text), Some(cooking_time), Some(image), Some(items)) = (
        checked.name,
        checked.text,
        checked.cooking_time,
        checked.image,
        checked.items,
    ) else {
        return Err(ApiError::Internal("validated recipe is incomplete".to_string()));
    };

    let author_id = auth.user.id;
    let media_root = config.media_root.clone();
    let rows = with_conn(&pool, move |conn| {
        ensure_ingredients_exist(conn, &items)?;
        let stored = media::store(&media_root, media::RECIPE_IMAGES, &image)
            .map_err(|e| media_field_error("image", e))?;
        let new_recipe = NewRecipe {
            author_id,
            name: &name,
            image: &stored,
            text: &text,
            cooking_time,
        };
        let recipe = match query::create_recipe(conn, &new_recipe, &items) {
            Ok(recipe) => recipe,
            Err(err) => {
                media::remove(&media_root, &stored);
                return Err(err.into());
            }
        };
        log::info!("user {author_id} created recipe {}", recipe.id);
        Ok(load_recipe_rows(conn, Some(author_id), vec![recipe])?)
    })
    .await?;

    Ok(HttpResponse::Created().json(rows.into_single(&config)?))
}

#[get("/api/recipes/{id:\\d+}/")]
pub async fn get_recipe(
    path: web::Path<i32>,
    viewer: MaybeUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = path.into_inner();
    let viewer = viewer.id();
    let rows = with_conn(&pool, move |conn| {
        let recipe = query::recipe_by_id(conn, recipe_id)?;
        Ok(load_recipe_rows(conn, viewer, vec![recipe])?)
    })
    .await?;
    Ok(HttpResponse::Ok().json(rows.into_single(&config)?))
}

#[patch("/api/recipes/{id:\\d+}/")]
pub async fn update_recipe(
    path: web::Path<i32>,
    auth: AuthUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<RecipeWrite>,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = path.into_inner();
    let user_id = auth.user.id;
    let checked = check_write(body.into_inner(), true);
    let media_root = config.media_root.clone();

    let rows = with_conn(&pool, move |conn| {
        let existing = query::recipe_by_id(conn, recipe_id)?;
        if existing.author_id != user_id {
            return Err(ApiError::Forbidden(NOT_AUTHOR.to_string()));
        }
        let checked = checked?;
        if let Some(items) = checked.items.as_deref() {
            ensure_ingredients_exist(conn, items)?;
        }
        let stored = match checked.image.as_ref() {
            Some(image) => Some(
                media::store(&media_root, media::RECIPE_IMAGES, image)
                    .map_err(|e| media_field_error("image", e))?,
            ),
            None => None,
        };

        let changes = RecipeChanges {
            name: checked.name.as_deref(),
            image: stored.as_deref(),
            text: checked.text.as_deref(),
            cooking_time: checked.cooking_time,
        };
        let recipe = match query::update_recipe(conn, recipe_id, &changes, checked.items.as_deref())
        {
            Ok(recipe) => recipe,
            Err(err) => {
                if let Some(stored) = stored.as_deref() {
                    media::remove(&media_root, stored);
                }
                return Err(err.into());
            }
        };
        if stored.is_some() {
            media::remove(&media_root, &existing.image);
        }
        Ok(load_recipe_rows(conn, Some(user_id), vec![recipe])?)
    })
    .await?;

    Ok(HttpResponse::Ok().json(rows.into_single(&config)?))
}

#[delete("/api/recipes/{id:\\d+}/")]
pub async fn delete_recipe(
    path: web::Path<i32>,
    auth: AuthUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = path.into_inner();
    let user_id = auth.user.id;
    let media_root = config.media_root.clone();

    with_conn(&pool, move |conn| {
        let recipe = query::recipe_by_id(conn, recipe_id)?;
        if recipe.author_id != user_id {
            return Err(ApiError::Forbidden(NOT_AUTHOR.to_string()));
        }
        query::delete_recipe(conn, recipe.id)?;
        media::remove(&media_root, &recipe.image);
        log::info!("user {user_id} deleted recipe {recipe_id}");
        Ok(())
    })
    .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Serialize)]
pub struct ShortLink {
    #[serde(rename = "short-link")]
    pub short_link: String,
}

#[get("/api/recipes/{id:\\d+}/get-link/")]
pub async fn short_link(
    path: web::Path<i32>,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let recipe_id = path.into_inner();
    let recipe = with_conn(&pool, move |conn| {
        query::recipe_by_id(conn, recipe_id).map_err(|err| match err {
            StoreError::NotFound => ApiError::NotFound("Рецепт не найден".to_string()),
            other => other.into(),
        })
    })
    .await?;
    Ok(HttpResponse::Ok().json(ShortLink {
        short_link: config.recipe_link(recipe.id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    fn write(items: Vec<(i64, i64)>) -> RecipeWrite {
        RecipeWrite {
            ingredients: Some(
                items
                    .into_iter()
                    .map(|(id, amount)| IngredientAmount { id, amount })
                    .collect(),
            ),
            image: Some(PIXEL.to_string()),
            name: Some("  Блины ".to_string()),
            text: Some("Смешать и пожарить".to_string()),
            cooking_time: Some(20),
        }
    }

    fn field_errors(result: Result<CheckedRecipe, ApiError>) -> FieldErrors {
        match result {
            Err(ApiError::Validation(errors)) => errors,
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn accepts_complete_recipe() {
        let checked = check_write(write(vec![(1, 200), (2, 5)]), false).unwrap();
        assert_eq!(checked.name.as_deref(), Some("Блины"));
        assert_eq!(checked.items, Some(vec![(1, 200), (2, 5)]));
        assert_eq!(checked.cooking_time, Some(20));
        assert_eq!(checked.image.map(|i| i.extension), Some("png".to_string()));
    }

    #[test]
    fn create_requires_every_field() {
        let errors = field_errors(check_write(RecipeWrite::default(), false));
        for field in ["name", "text", "cooking_time", "image", "ingredients"] {
            assert!(errors.get(field).is_some(), "{field}");
        }
    }

    #[test]
    fn partial_update_accepts_missing_fields() {
        let checked = check_write(
            RecipeWrite {
                cooking_time: Some(45),
                ..Default::default()
            },
            true,
        )
        .unwrap();
        assert_eq!(checked.cooking_time, Some(45));
        assert!(checked.items.is_none() && checked.image.is_none());
    }

    #[test]
    fn rejects_bad_ingredient_lists() {
        let errors = field_errors(check_write(write(vec![]), false));
        assert_eq!(
            errors.get("ingredients"),
            Some(&["Должен быть указан хотя бы один ингредиент".to_string()][..])
        );

        let errors = field_errors(check_write(write(vec![(1, 10), (1, 20)]), false));
        assert_eq!(
            errors.get("ingredients"),
            Some(&["Ингредиенты не должны повторяться".to_string()][..])
        );

        let errors = field_errors(check_write(write(vec![(1, 0), (2, 32001)]), false));
        assert_eq!(errors.get("ingredients").map(<[String]>::len), Some(2));
    }

    #[test]
    fn cooking_time_bounds_are_inclusive() {
        for (minutes, ok) in [(0, false), (1, true), (32000, true), (32001, false)] {
            let mut req = write(vec![(1, 1)]);
            req.cooking_time = Some(minutes);
            assert_eq!(check_write(req, false).is_ok(), ok, "{minutes}");
        }
    }

    #[test]
    fn rejects_undecodable_image() {
        let mut req = write(vec![(1, 1)]);
        req.image = Some("data:image/png;base64,***".to_string());
        let errors = field_errors(check_write(req, false));
        assert!(errors.get("image").is_some());
    }

    #[test]
    fn list_filters_depend_on_viewer() {
        let params = RecipeListParams {
            author: Some("7".into()),
            is_favorited: Some("1".into()),
            is_in_shopping_cart: Some("0".into()),
            ..Default::default()
        };
        let filter = params.filter(Some(3)).unwrap();
        assert_eq!(
            filter,
            RecipeFilter {
                author: Some(7),
                favorited_by: Some(3),
                in_cart_of: None,
            }
        );
        assert_eq!(params.filter(None).unwrap().favorited_by, None);

        let bad = RecipeListParams {
            author: Some("me".into()),
            ..Default::default()
        };
        assert!(matches!(bad.filter(None), Err(ApiError::BadRequest(_))));
    }
}
