table! {
    users (id) {
        id -> Integer,
        email -> Text,
        username -> Text,
        first_name -> Text,
        last_name -> Text,
        password_hash -> Text,
        avatar -> Nullable<Text>,
        date_joined -> Timestamp,
    }
}

table! {
    auth_tokens (key_hash) {
        key_hash -> Text,
        user_id -> Integer,
        created_at -> Timestamp,
    }
}

table! {
    ingredients (id) {
        id -> Integer,
        name -> Text,
        measurement_unit -> Text,
    }
}

table! {
    recipes (id) {
        id -> Integer,
        author_id -> Integer,
        name -> Text,
        image -> Text,
        text -> Text,
        cooking_time -> Integer,
        pub_date -> Timestamp,
    }
}

table! {
    recipe_ingredients (id) {
        id -> Integer,
        recipe_id -> Integer,
        ingredient_id -> Integer,
        amount -> Integer,
    }
}

table! {
    favorites (id) {
        id -> Integer,
        user_id -> Integer,
        recipe_id -> Integer,
        added_at -> Timestamp,
    }
}

table! {
    shopping_cart (id) {
        id -> Integer,
        user_id -> Integer,
        recipe_id -> Integer,
        added_at -> Timestamp,
    }
}

// follows has two foreign keys into users, so it is joined with explicit ON clauses
table! {
    follows (id) {
        id -> Integer,
        follower_id -> Integer,
        author_id -> Integer,
    }
}

joinable!(auth_tokens -> users (user_id));
joinable!(recipes -> users (author_id));
joinable!(recipe_ingredients -> recipes (recipe_id));
joinable!(recipe_ingredients -> ingredients (ingredient_id));
joinable!(favorites -> recipes (recipe_id));
joinable!(favorites -> users (user_id));
joinable!(shopping_cart -> recipes (recipe_id));
joinable!(shopping_cart -> users (user_id));

allow_tables_to_appear_in_same_query!(
    users,
    auth_tokens,
    ingredients,
    recipes,
    recipe_ingredients,
    favorites,
    shopping_cart,
    follows,
);
