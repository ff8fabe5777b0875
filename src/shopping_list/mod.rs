//! Shopping list aggregation: folds the ingredient rows of every recipe in a
//! user's cart into one list keyed by (name, unit) and renders it as a
//! downloadable document.

mod pdf;
mod render;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::db::DbConn;
use crate::error::ApiError;
use crate::models::IngredientLine;
use crate::query;

/// One consolidated line of the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Groups by (name, unit) as stored, sums amounts exactly, and orders by
/// name then unit.
pub fn aggregate<'a, I>(lines: I) -> Vec<ShoppingItem>
where
    I: IntoIterator<Item = &'a IngredientLine>,
{
    let mut totals: BTreeMap<(&'a str, &'a str), i64> = BTreeMap::new();
    for line in lines {
        *totals
            .entry((line.name.as_str(), line.measurement_unit.as_str()))
            .or_insert(0) += i64::from(line.amount);
    }
    totals
        .into_iter()
        .map(|((name, unit), amount)| ShoppingItem {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        })
        .collect()
}

/// Resolves the user's cart and aggregates it. An empty cart is
/// [`ApiError::EmptyCollection`]; nothing is joined in that case.
pub fn build_for_user(conn: &mut DbConn, user_id: i32) -> Result<Vec<ShoppingItem>, ApiError> {
    let recipe_ids: Vec<i32> = query::cart_recipes_of(conn, user_id)?.into_iter().collect();
    if recipe_ids.is_empty() {
        return Err(ApiError::EmptyCollection);
    }
    let lines = query::ingredient_lines_for(conn, &recipe_ids)?;
    Ok(aggregate(&lines))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShoppingListFormat {
    #[default]
    Txt,
    Csv,
    Pdf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFormat(pub String);

impl fmt::Display for UnknownFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Неподдерживаемый формат: {}", self.0)
    }
}

impl std::error::Error for UnknownFormat {}

impl FromStr for ShoppingListFormat {
    type Err = UnknownFormat;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "txt" => Ok(ShoppingListFormat::Txt),
            "csv" => Ok(ShoppingListFormat::Csv),
            "pdf" => Ok(ShoppingListFormat::Pdf),
            _ => Err(UnknownFormat(raw.to_string())),
        }
    }
}

impl ShoppingListFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ShoppingListFormat::Txt => "txt",
            ShoppingListFormat::Csv => "csv",
            ShoppingListFormat::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ShoppingListFormat::Txt => "text/plain; charset=utf-8",
            ShoppingListFormat::Csv => "text/csv; charset=utf-8",
            ShoppingListFormat::Pdf => "application/pdf",
        }
    }

    pub fn filename(self) -> String {
        format!("shopping_list.{}", self.extension())
    }

    pub fn render(self, items: &[ShoppingItem]) -> Vec<u8> {
        match self {
            ShoppingListFormat::Txt => render::txt(items),
            ShoppingListFormat::Csv => render::csv(items),
            ShoppingListFormat::Pdf => pdf::render(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewIngredient, NewRecipe};
    use crate::query::Collection;
    use crate::test_support::{seed_user, test_pool};

    fn line(recipe_id: i32, name: &str, unit: &str, amount: i32) -> IngredientLine {
        IngredientLine {
            recipe_id,
            ingredient_id: 0,
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    fn item(name: &str, unit: &str, amount: i64) -> ShoppingItem {
        ShoppingItem {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn sums_across_recipes_and_sorts_by_name() {
        let lines = vec![
            line(1, "Flour", "g", 200),
            line(1, "Salt", "g", 5),
            line(2, "Sugar", "g", 100),
            line(2, "Flour", "g", 300),
        ];
        assert_eq!(
            aggregate(&lines),
            vec![item("Flour", "g", 500), item("Salt", "g", 5), item("Sugar", "g", 100)]
        );
    }

    #[test]
    fn same_name_with_different_units_stays_separate() {
        let lines = vec![
            line(1, "milk", "ml", 200),
            line(2, "milk", "cup", 1),
            line(3, "milk", "ml", 50),
        ];
        assert_eq!(
            aggregate(&lines),
            vec![item("milk", "cup", 1), item("milk", "ml", 250)]
        );
    }

    #[test]
    fn names_are_compared_case_sensitively() {
        let lines = vec![line(1, "salt", "g", 1), line(2, "Salt", "g", 2)];
        assert_eq!(
            aggregate(&lines),
            vec![item("Salt", "g", 2), item("salt", "g", 1)]
        );
    }

    #[test]
    fn large_totals_do_not_overflow() {
        let lines: Vec<IngredientLine> = (0..100_000)
            .map(|recipe| line(recipe, "water", "ml", 32_000))
            .collect();
        assert_eq!(aggregate(&lines), vec![item("water", "ml", 3_200_000_000)]);
    }

    #[test]
    fn format_selector_is_case_insensitive_and_defaults_to_txt() {
        assert_eq!("".parse(), Ok(ShoppingListFormat::Txt));
        assert_eq!("CSV".parse(), Ok(ShoppingListFormat::Csv));
        assert_eq!(" pdf ".parse(), Ok(ShoppingListFormat::Pdf));
        assert!("docx".parse::<ShoppingListFormat>().is_err());
        assert_eq!(ShoppingListFormat::default().filename(), "shopping_list.txt");
        assert_eq!(ShoppingListFormat::Pdf.content_type(), "application/pdf");
    }

    #[test]
    fn build_for_user_rejects_empty_cart_and_aggregates_the_rest() {
        let (_dir, pool) = test_pool();
        let mut conn = pool.get().unwrap();
        let alice = seed_user(&mut conn, "alice");

        assert!(matches!(
            build_for_user(&mut conn, alice.id),
            Err(ApiError::EmptyCollection)
        ));

        query::insert_ingredients(
            &mut conn,
            &[
                NewIngredient {
                    name: "Flour".into(),
                    measurement_unit: "g".into(),
                },
                NewIngredient {
                    name: "Salt".into(),
                    measurement_unit: "g".into(),
                },
                NewIngredient {
                    name: "Sugar".into(),
                    measurement_unit: "g".into(),
                },
            ],
        )
        .unwrap();
        let catalog = query::search_ingredients(&mut conn, None).unwrap();
        let id = |name: &str| catalog.iter().find(|i| i.name == name).unwrap().id;

        let mut cart = Vec::new();
        for (name, items) in [
            ("A", vec![(id("Flour"), 200), (id("Salt"), 5)]),
            ("B", vec![(id("Flour"), 300), (id("Sugar"), 100)]),
        ] {
            let recipe = query::create_recipe(
                &mut conn,
                &NewRecipe {
                    author_id: alice.id,
                    name,
                    image: "recipes/x.png",
                    text: "",
                    cooking_time: 10,
                },
                &items,
            )
            .unwrap();
            query::add_to_collection(&mut conn, Collection::ShoppingCart, alice.id, recipe.id)
                .unwrap();
            cart.push(recipe.id);
        }

        let items = build_for_user(&mut conn, alice.id).unwrap();
        assert_eq!(
            items,
            vec![item("Flour", "g", 500), item("Salt", "g", 5), item("Sugar", "g", 100)]
        );
        // read-only: the cart is untouched
        assert_eq!(
            query::cart_recipes_of(&mut conn, alice.id).unwrap().len(),
            cart.len()
        );
    }
}
