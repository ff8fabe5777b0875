use std::collections::{BTreeSet, HashMap, HashSet};

use diesel::dsl::{count_star, exists};
use diesel::prelude::*;
use diesel::sqlite::Sqlite;

use crate::db::DbConn;
use crate::error::StoreError;
use crate::models::{
    Ingredient, IngredientLine, NewAuthToken, NewCartEntry, NewFavorite, NewFollow,
    NewIngredient, NewRecipe, NewRecipeIngredient, NewUser, Recipe, RecipeChanges, User,
};
use crate::schema::{
    auth_tokens, favorites, follows, ingredients, recipe_ingredients, recipes, shopping_cart,
    users,
};

type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------- users

pub fn create_user(conn: &mut DbConn, new_user: &NewUser) -> StoreResult<User> {
    Ok(diesel::insert_into(users::table)
        .values(new_user)
        .get_result::<User>(conn)?)
}

pub fn user_by_id(conn: &mut DbConn, user_id: i32) -> StoreResult<User> {
    Ok(users::table.find(user_id).first::<User>(conn)?)
}

pub fn user_by_email(conn: &mut DbConn, email: &str) -> StoreResult<Option<User>> {
    Ok(users::table
        .filter(users::email.eq(email))
        .first::<User>(conn)
        .optional()?)
}

pub fn email_taken(conn: &mut DbConn, email: &str) -> StoreResult<bool> {
    Ok(diesel::select(exists(users::table.filter(users::email.eq(email)))).get_result(conn)?)
}

pub fn username_taken(conn: &mut DbConn, username: &str) -> StoreResult<bool> {
    Ok(
        diesel::select(exists(users::table.filter(users::username.eq(username))))
            .get_result(conn)?,
    )
}

/// Newest accounts first.
pub fn list_users(conn: &mut DbConn, offset: i64, limit: i64) -> StoreResult<(i64, Vec<User>)> {
    let count = users::table.count().get_result::<i64>(conn)?;
    let page = users::table
        .order(users::id.desc())
        .offset(offset)
        .limit(limit)
        .load::<User>(conn)?;
    Ok((count, page))
}

pub fn users_by_ids(conn: &mut DbConn, ids: &[i32]) -> StoreResult<HashMap<i32, User>> {
    let found = users::table
        .filter(users::id.eq_any(ids))
        .load::<User>(conn)?;
    Ok(found.into_iter().map(|user| (user.id, user)).collect())
}

pub fn set_password_hash(conn: &mut DbConn, user_id: i32, hash: &str) -> StoreResult<()> {
    diesel::update(users::table.find(user_id))
        .set(users::password_hash.eq(hash))
        .execute(conn)?;
    Ok(())
}

pub fn set_avatar(conn: &mut DbConn, user_id: i32, avatar: Option<&str>) -> StoreResult<()> {
    diesel::update(users::table.find(user_id))
        .set(users::avatar.eq(avatar))
        .execute(conn)?;
    Ok(())
}

// ---------------------------------------------------------------- tokens

pub fn create_token(conn: &mut DbConn, user_id: i32, key_hash: &str) -> StoreResult<()> {
    diesel::insert_into(auth_tokens::table)
        .values(&NewAuthToken { key_hash, user_id })
        .execute(conn)?;
    Ok(())
}

pub fn user_by_token(conn: &mut DbConn, key_hash: &str) -> StoreResult<Option<User>> {
    Ok(auth_tokens::table
        .inner_join(users::table)
        .filter(auth_tokens::key_hash.eq(key_hash))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

pub fn delete_token(conn: &mut DbConn, key_hash: &str) -> StoreResult<()> {
    diesel::delete(auth_tokens::table.find(key_hash)).execute(conn)?;
    Ok(())
}

// ---------------------------------------------------------------- ingredients

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Ingredients whose name starts with `prefix`, ordered by name. Stored names
/// are lower-case, so the prefix is lower-cased before matching.
pub fn search_ingredients(conn: &mut DbConn, prefix: Option<&str>) -> StoreResult<Vec<Ingredient>> {
    let mut query = ingredients::table.into_boxed::<Sqlite>();
    if let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) {
        let pattern = format!("{}%", escape_like(&prefix.to_lowercase()));
        query = query.filter(ingredients::name.like(pattern).escape('\\'));
    }
    Ok(query.order(ingredients::name.asc()).load::<Ingredient>(conn)?)
}

pub fn ingredient_by_id(conn: &mut DbConn, ingredient_id: i32) -> StoreResult<Ingredient> {
    Ok(ingredients::table.find(ingredient_id).first::<Ingredient>(conn)?)
}

pub fn existing_ingredient_ids(conn: &mut DbConn, ids: &[i32]) -> StoreResult<BTreeSet<i32>> {
    let found = ingredients::table
        .filter(ingredients::id.eq_any(ids))
        .select(ingredients::id)
        .load::<i32>(conn)?;
    Ok(found.into_iter().collect())
}

/// Inserts the given ingredients, skipping names that already exist.
/// Returns how many rows were added.
pub fn insert_ingredients(conn: &mut DbConn, batch: &[NewIngredient]) -> StoreResult<usize> {
    let mut added = 0;
    for item in batch {
        added += diesel::insert_or_ignore_into(ingredients::table)
            .values(item)
            .execute(conn)?;
    }
    Ok(added)
}

// ---------------------------------------------------------------- recipes

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<i32>,
    pub favorited_by: Option<i32>,
    pub in_cart_of: Option<i32>,
}

fn filtered_recipes(filter: &RecipeFilter) -> recipes::BoxedQuery<'static, Sqlite> {
    let mut query = recipes::table.into_boxed();
    if let Some(author) = filter.author {
        query = query.filter(recipes::author_id.eq(author));
    }
    if let Some(user) = filter.favorited_by {
        query = query.filter(
            recipes::id.eq_any(
                favorites::table
                    .filter(favorites::user_id.eq(user))
                    .select(favorites::recipe_id),
            ),
        );
    }
    if let Some(user) = filter.in_cart_of {
        query = query.filter(
            recipes::id.eq_any(
                shopping_cart::table
                    .filter(shopping_cart::user_id.eq(user))
                    .select(shopping_cart::recipe_id),
            ),
        );
    }
    query
}

/// Newest recipes first.
pub fn list_recipes(
    conn: &mut DbConn,
    filter: &RecipeFilter,
    offset: i64,
    limit: i64,
) -> StoreResult<(i64, Vec<Recipe>)> {
    let count = filtered_recipes(filter).count().get_result::<i64>(conn)?;
    let page = filtered_recipes(filter)
        .order(recipes::id.desc())
        .offset(offset)
        .limit(limit)
        .load::<Recipe>(conn)?;
    Ok((count, page))
}

pub fn recipe_by_id(conn: &mut DbConn, recipe_id: i32) -> StoreResult<Recipe> {
    Ok(recipes::table.find(recipe_id).first::<Recipe>(conn)?)
}

fn insert_recipe_ingredients(
    conn: &mut DbConn,
    recipe_id: i32,
    items: &[(i32, i32)],
) -> StoreResult<()> {
    let rows: Vec<NewRecipeIngredient> = items
        .iter()
        .map(|&(ingredient_id, amount)| NewRecipeIngredient {
            recipe_id,
            ingredient_id,
            amount,
        })
        .collect();
    diesel::insert_into(recipe_ingredients::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

/// Creates the recipe and its `(ingredient_id, amount)` associations atomically.
pub fn create_recipe(
    conn: &mut DbConn,
    new_recipe: &NewRecipe,
    items: &[(i32, i32)],
) -> StoreResult<Recipe> {
    conn.transaction::<_, StoreError, _>(|conn| {
        let recipe = diesel::insert_into(recipes::table)
            .values(new_recipe)
            .get_result::<Recipe>(conn)?;
        insert_recipe_ingredients(conn, recipe.id, items)?;
        Ok(recipe)
    })
}

/// Applies `changes` and, when `items` is given, replaces the ingredient set.
pub fn update_recipe(
    conn: &mut DbConn,
    recipe_id: i32,
    changes: &RecipeChanges,
    items: Option<&[(i32, i32)]>,
) -> StoreResult<Recipe> {
    conn.transaction::<_, StoreError, _>(|conn| {
        let has_changes = changes.name.is_some()
            || changes.image.is_some()
            || changes.text.is_some()
            || changes.cooking_time.is_some();
        if has_changes {
            diesel::update(recipes::table.find(recipe_id))
                .set(changes)
                .execute(conn)?;
        }
        if let Some(items) = items {
            diesel::delete(
                recipe_ingredients::table.filter(recipe_ingredients::recipe_id.eq(recipe_id)),
            )
            .execute(conn)?;
            insert_recipe_ingredients(conn, recipe_id, items)?;
        }
        recipe_by_id(conn, recipe_id)
    })
}

pub fn delete_recipe(conn: &mut DbConn, recipe_id: i32) -> StoreResult<()> {
    let removed = diesel::delete(recipes::table.find(recipe_id)).execute(conn)?;
    if removed == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Recipes of each author, newest first.
pub fn recipes_by_authors(
    conn: &mut DbConn,
    author_ids: &[i32],
) -> StoreResult<HashMap<i32, Vec<Recipe>>> {
    let found = recipes::table
        .filter(recipes::author_id.eq_any(author_ids))
        .order(recipes::id.desc())
        .load::<Recipe>(conn)?;
    let mut grouped: HashMap<i32, Vec<Recipe>> = HashMap::new();
    for recipe in found {
        grouped.entry(recipe.author_id).or_default().push(recipe);
    }
    Ok(grouped)
}

/// Ingredient rows of every listed recipe in one round trip, in insertion order.
pub fn ingredient_lines_for(
    conn: &mut DbConn,
    recipe_ids: &[i32],
) -> StoreResult<Vec<IngredientLine>> {
    Ok(recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq_any(recipe_ids))
        .order(recipe_ingredients::id.asc())
        .select((
            recipe_ingredients::recipe_id,
            recipe_ingredients::ingredient_id,
            ingredients::name,
            ingredients::measurement_unit,
            recipe_ingredients::amount,
        ))
        .load::<IngredientLine>(conn)?)
}

pub fn ingredients_of(conn: &mut DbConn, recipe_id: i32) -> StoreResult<Vec<IngredientLine>> {
    ingredient_lines_for(conn, &[recipe_id])
}

// ---------------------------------------------------------------- collections

/// Per-user recipe sets keyed by (user, recipe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Favorites,
    ShoppingCart,
}

/// Adds the recipe; a second add of the same (user, recipe) is `Duplicate`.
pub fn add_to_collection(
    conn: &mut DbConn,
    collection: Collection,
    user_id: i32,
    recipe_id: i32,
) -> StoreResult<()> {
    match collection {
        Collection::Favorites => diesel::insert_into(favorites::table)
            .values(&NewFavorite { user_id, recipe_id })
            .execute(conn)?,
        Collection::ShoppingCart => diesel::insert_into(shopping_cart::table)
            .values(&NewCartEntry { user_id, recipe_id })
            .execute(conn)?,
    };
    Ok(())
}

/// Removes the recipe; `NotFound` when this user never had it.
pub fn remove_from_collection(
    conn: &mut DbConn,
    collection: Collection,
    user_id: i32,
    recipe_id: i32,
) -> StoreResult<()> {
    let removed = match collection {
        Collection::Favorites => diesel::delete(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::recipe_id.eq(recipe_id)),
        )
        .execute(conn)?,
        Collection::ShoppingCart => diesel::delete(
            shopping_cart::table
                .filter(shopping_cart::user_id.eq(user_id))
                .filter(shopping_cart::recipe_id.eq(recipe_id)),
        )
        .execute(conn)?,
    };
    if removed == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Which of `recipe_ids` the user holds in the collection.
pub fn collection_members(
    conn: &mut DbConn,
    collection: Collection,
    user_id: i32,
    recipe_ids: &[i32],
) -> StoreResult<HashSet<i32>> {
    let found = match collection {
        Collection::Favorites => favorites::table
            .filter(favorites::user_id.eq(user_id))
            .filter(favorites::recipe_id.eq_any(recipe_ids))
            .select(favorites::recipe_id)
            .load::<i32>(conn)?,
        Collection::ShoppingCart => shopping_cart::table
            .filter(shopping_cart::user_id.eq(user_id))
            .filter(shopping_cart::recipe_id.eq_any(recipe_ids))
            .select(shopping_cart::recipe_id)
            .load::<i32>(conn)?,
    };
    Ok(found.into_iter().collect())
}

pub fn cart_recipes_of(conn: &mut DbConn, user_id: i32) -> StoreResult<BTreeSet<i32>> {
    let found = shopping_cart::table
        .filter(shopping_cart::user_id.eq(user_id))
        .select(shopping_cart::recipe_id)
        .load::<i32>(conn)?;
    Ok(found.into_iter().collect())
}

// ---------------------------------------------------------------- follows

pub fn follow(conn: &mut DbConn, follower_id: i32, author_id: i32) -> StoreResult<()> {
    if follower_id == author_id {
        return Err(StoreError::SelfFollow);
    }
    diesel::insert_into(follows::table)
        .values(&NewFollow {
            follower_id,
            author_id,
        })
        .execute(conn)?;
    Ok(())
}

pub fn unfollow(conn: &mut DbConn, follower_id: i32, author_id: i32) -> StoreResult<()> {
    let removed = diesel::delete(
        follows::table
            .filter(follows::follower_id.eq(follower_id))
            .filter(follows::author_id.eq(author_id)),
    )
    .execute(conn)?;
    if removed == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Which of `author_ids` the follower is subscribed to.
pub fn followed_among(
    conn: &mut DbConn,
    follower_id: i32,
    author_ids: &[i32],
) -> StoreResult<HashSet<i32>> {
    let found = follows::table
        .filter(follows::follower_id.eq(follower_id))
        .filter(follows::author_id.eq_any(author_ids))
        .select(follows::author_id)
        .load::<i32>(conn)?;
    Ok(found.into_iter().collect())
}

/// Authors the follower subscribed to, most recent subscription first.
pub fn followed_authors(
    conn: &mut DbConn,
    follower_id: i32,
    offset: i64,
    limit: i64,
) -> StoreResult<(i64, Vec<User>)> {
    let count = follows::table
        .filter(follows::follower_id.eq(follower_id))
        .count()
        .get_result::<i64>(conn)?;
    let page = users::table
        .inner_join(follows::table.on(follows::author_id.eq(users::id)))
        .filter(follows::follower_id.eq(follower_id))
        .order(follows::id.desc())
        .offset(offset)
        .limit(limit)
        .select(User::as_select())
        .load::<User>(conn)?;
    Ok((count, page))
}

pub fn recipe_counts(conn: &mut DbConn, author_ids: &[i32]) -> StoreResult<HashMap<i32, i64>> {
    let rows = recipes::table
        .filter(recipes::author_id.eq_any(author_ids))
        .group_by(recipes::author_id)
        .select((recipes::author_id, count_star()))
        .load::<(i32, i64)>(conn)?;
    Ok(rows.into_iter().collect())
}
