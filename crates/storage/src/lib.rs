use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use tracing::{info, warn};

use shared::domain::{Meal, MealId};

const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Retries the initial connection with a fixed delay. When the server
    /// and its database volume start together, the store can come up after
    /// the process does.
    pub async fn connect_with_retry(database_url: &str, attempts: u32) -> Result<Self> {
        let mut last_err = None;
        for attempt in 1..=attempts {
            match Self::new(database_url).await {
                Ok(storage) => {
                    info!("connected to database");
                    return Ok(storage);
                }
                Err(err) => {
                    warn!(attempt, attempts, %err, "failed to connect to database");
                    last_err = Some(err);
                }
            }
            if attempt < attempts {
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("database connection never attempted")))
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert_meal(&self, name: &str, calories: i64) -> Result<Meal> {
        let row = sqlx::query(
            "INSERT INTO meals (name, calories) VALUES (?1, ?2) \
             RETURNING id, name, calories, created_at",
        )
        .bind(name)
        .bind(calories)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert meal")?;

        meal_from_row(&row)
    }

    pub async fn list_meals(&self) -> Result<Vec<Meal>> {
        let rows = sqlx::query(
            "SELECT id, name, calories, created_at \
             FROM meals ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list meals")?;

        rows.iter().map(meal_from_row).collect()
    }
}

fn meal_from_row(row: &SqliteRow) -> Result<Meal> {
    Ok(Meal {
        id: MealId(row.try_get("id")?),
        name: row.try_get("name")?,
        calories: row.try_get("calories")?,
        created_at: row.try_get("created_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return Ok(());
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create parent directory '{}' for database url '{database_url}'",
                parent.display()
            )
        })?;
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
