use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::CatalogProduct;

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<CatalogProduct>, sqlx::Error> {
    let product =
        sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(product_id).fetch_optional(conn).await?;
    Ok(product)
}

/// Returns the id of the game with the given name, creating it if necessary.
pub async fn fetch_or_create_game(name: &str, enabled: bool, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query("INSERT INTO games (name, enabled) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .bind(enabled)
        .execute(&mut *conn)
        .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM games WHERE name = $1").bind(name).fetch_one(conn).await?;
    Ok(id)
}

/// Returns the product with the given name under `game_id`, creating it if necessary.
pub async fn fetch_or_create_product(
    game_id: i64,
    name: &str,
    enabled: bool,
    conn: &mut SqliteConnection,
) -> Result<CatalogProduct, sqlx::Error> {
    let inserted = sqlx::query(
        "INSERT INTO products (game_id, name, enabled) VALUES ($1, $2, $3) ON CONFLICT (game_id, name) DO NOTHING",
    )
    .bind(game_id)
    .bind(name)
    .bind(enabled)
    .execute(&mut *conn)
    .await?;
    if inserted.rows_affected() > 0 {
        debug!("🗃️ Catalog product '{name}' created for game #{game_id}");
    }
    let product = sqlx::query_as("SELECT * FROM products WHERE game_id = $1 AND name = $2")
        .bind(game_id)
        .bind(name)
        .fetch_one(conn)
        .await?;
    Ok(product)
}
