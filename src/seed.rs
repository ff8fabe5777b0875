//! Bulk loading of the ingredient catalog from a JSON fixture of
//! `[{"name": ..., "measurement_unit": ...}]` records.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::db::DbConn;
use crate::error::StoreError;
use crate::models::NewIngredient;
use crate::query;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read fixture: {0}")]
    Io(#[from] io::Error),

    #[error("fixture is not a list of ingredients: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub processed: usize,
    pub added: usize,
}

/// Stored names and units are trimmed and lower-case so prefix search can
/// match them case-insensitively.
fn normalize(raw: Vec<NewIngredient>) -> Vec<NewIngredient> {
    raw.into_iter()
        .map(|item| NewIngredient {
            name: item.name.trim().to_lowercase(),
            measurement_unit: item.measurement_unit.trim().to_lowercase(),
        })
        .filter(|item| !item.name.is_empty())
        .collect()
}

/// Inserts every ingredient of the fixture whose name is not yet known.
pub fn load_ingredients(conn: &mut DbConn, path: &Path) -> Result<SeedReport, SeedError> {
    let raw: Vec<NewIngredient> = serde_json::from_str(&fs::read_to_string(path)?)?;
    let batch = normalize(raw);
    let added = query::insert_ingredients(conn, &batch)?;
    let report = SeedReport {
        processed: batch.len(),
        added,
    };
    log::info!(
        "loaded {} ingredients from {} ({} new)",
        report.processed,
        path.display(),
        report.added
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_pool;

    #[test]
    fn loads_fixture_once() {
        let (_dir, pool) = test_pool();
        let mut conn = pool.get().unwrap();
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/ingredients.json");

        let first = load_ingredients(&mut conn, &fixture).unwrap();
        assert!(first.processed > 0);
        assert_eq!(first.added, first.processed);

        let second = load_ingredients(&mut conn, &fixture).unwrap();
        assert_eq!(second.added, 0);

        let found = query::search_ingredients(&mut conn, Some("МУКА")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "мука пшеничная");
    }

    #[test]
    fn normalizes_and_skips_blank_names() {
        let batch = normalize(vec![
            NewIngredient {
                name: "  Сахар ".into(),
                measurement_unit: " Г".into(),
            },
            NewIngredient {
                name: "   ".into(),
                measurement_unit: "г".into(),
            },
        ]);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].name, "сахар");
        assert_eq!(batch[0].measurement_unit, "г");
    }

    #[test]
    fn rejects_malformed_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"name": "not a list"}"#).unwrap();
        let (_db, pool) = test_pool();
        let mut conn = pool.get().unwrap();
        assert!(matches!(
            load_ingredients(&mut conn, &path),
            Err(SeedError::Json(_))
        ));
    }
}
