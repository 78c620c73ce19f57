use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Fundraising project entity
///
/// Owned by the content side of the site; this service only reads it and
/// bumps the raised-amount accumulator.
#[derive(Debug, Clone, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub gateway_category_code: Option<String>,
    pub donation_raised: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for fundraising projects
#[derive(Clone)]
pub struct ProjectRepository {
    pool: PgPool,
}

impl ProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find project by id
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, DatabaseError> {
        sqlx::query_as::<_, Project>(
            "SELECT id, title, gateway_category_code, donation_raised,
                    created_at, updated_at
             FROM projects
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Add a completed donation's amount to the running total
    ///
    /// Single in-place increment; concurrent completions serialize on the row
    /// instead of racing a read-modify-write. Returns false when the project
    /// no longer exists.
    pub async fn increment_raised(&self, id: Uuid, amount: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE projects
             SET donation_raised = donation_raised + $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(amount)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}
