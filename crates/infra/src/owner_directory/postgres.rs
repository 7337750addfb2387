//! Postgres-backed owner directory (`owners` table).

use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::instrument;

use walletd_core::OwnerId;
use walletd_wallet::OwnerProfile;

use super::{OwnerDirectory, OwnerDirectoryError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS owners (
    id    TEXT PRIMARY KEY,
    name  TEXT NOT NULL
);
"#;

#[derive(Debug, Clone)]
pub struct PostgresOwnerDirectory {
    pool: Arc<PgPool>,
}

impl PostgresOwnerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), OwnerDirectoryError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| unavailable("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl OwnerDirectory for PostgresOwnerDirectory {
    #[instrument(skip(self), fields(owner_id = %owner_id), err)]
    async fn get_owner(&self, owner_id: &OwnerId) -> Result<OwnerProfile, OwnerDirectoryError> {
        let row = sqlx::query("SELECT name FROM owners WHERE id = $1")
            .bind(owner_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| unavailable("get_owner", e))?
            .ok_or_else(|| OwnerDirectoryError::NotFound(owner_id.clone()))?;

        let name: String = row.try_get("name").map_err(|e| unavailable("get_owner", e))?;
        Ok(OwnerProfile {
            id: owner_id.clone(),
            name,
        })
    }

    #[instrument(skip(self, profile), fields(owner_id = %profile.id), err)]
    async fn register_owner(&self, profile: OwnerProfile) -> Result<OwnerProfile, OwnerDirectoryError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(
            r#"
            INSERT INTO owners (id, name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id
            RETURNING name
            "#,
        )
        .bind(profile.id.as_str())
        .bind(&profile.name)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| unavailable("register_owner", e))?;

        let name: String = row.try_get("name").map_err(|e| unavailable("register_owner", e))?;
        Ok(OwnerProfile { id: profile.id, name })
    }
}

fn unavailable(operation: &str, err: sqlx::Error) -> OwnerDirectoryError {
    OwnerDirectoryError::Unavailable(format!("sqlx error in {operation}: {err}"))
}
