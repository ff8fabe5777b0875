#[macro_use]
extern crate diesel;

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod models;
pub mod pagination;
pub mod query;
pub mod schema;
pub mod seed;
pub mod shopping_list;

#[cfg(test)]
pub(crate) mod test_support {
    use diesel::prelude::*;
    use tempfile::TempDir;

    use crate::db::{create_pool, DbConn, DbPool};
    use crate::models::{NewUser, User};
    use crate::schema::users;

    /// A migrated pool backed by a fresh database file; keep the directory
    /// alive for as long as the pool is used.
    pub fn test_pool() -> (TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("test.sqlite3");
        let pool = create_pool(url.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    pub fn seed_user(conn: &mut DbConn, name: &str) -> User {
        let email = format!("{name}@example.com");
        diesel::insert_into(users::table)
            .values(&NewUser {
                email: &email,
                username: name,
                first_name: name,
                last_name: name,
                password_hash: "x",
            })
            .get_result(conn)
            .unwrap()
    }
}
