pub mod alerts;
pub mod config_store;
pub mod markets;
pub mod models;
pub mod prices;
pub mod writer;

pub use alerts::AlertStore;
pub use config_store::ConfigStore;
pub use prices::{PriceSnapshot, PriceStore};
pub use writer::AlertWriter;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::Result;

/// Open (creating if needed) the SQLite database at `path` and apply migrations.
pub async fn connect(path: &str) -> Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Fresh in-memory database with the schema applied. One connection, since each
/// `:memory:` connection is its own database.
#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations apply");
    pool
}
