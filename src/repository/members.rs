//! Members repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Executor, Pool, Sqlite, SqliteConnection};

use crate::{
    error::{AppError, AppResult},
    models::member::{CreateMember, Member},
};

#[derive(Clone)]
pub struct MembersRepository {
    pool: Pool<Sqlite>,
}

impl MembersRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Get member by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<Member> {
        sqlx::query_as::<_, Member>("SELECT id, name, email, created_at FROM members WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Member with id {} not found", id)))
    }

    pub async fn list(&self) -> AppResult<Vec<Member>> {
        let mut conn = self.pool.acquire().await?;
        self.all(&mut conn).await
    }

    pub async fn all(&self, conn: &mut SqliteConnection) -> AppResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(
            "SELECT id, name, email, created_at FROM members ORDER BY id",
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(members)
    }

    /// Create a member. Emails are unique regardless of case.
    pub async fn create(&self, member: &CreateMember, created_at: DateTime<Utc>) -> AppResult<Member> {
        let inserted = sqlx::query("INSERT INTO members (name, email, created_at) VALUES (?, ?, ?)")
            .bind(&member.name)
            .bind(&member.email)
            .bind(created_at)
            .execute(&self.pool)
            .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(AppError::BadRequest(format!(
                    "Email {} is already registered",
                    member.email
                )));
            }
            Err(e) => return Err(e.into()),
        };

        self.get_by_id(id).await
    }

    pub async fn exists<'e, E>(&self, executor: E, id: i64) -> AppResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM members WHERE id = ?)")
            .bind(id)
            .fetch_one(executor)
            .await?;
        Ok(exists)
    }

    /// Whether the member holds an active loan or a returned loan with an unpaid fine
    pub async fn has_open_obligation<'e, E>(&self, executor: E, member_id: i64) -> AppResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let open: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM loans
                WHERE member_id = ?
                  AND (status = 'active' OR fine_status = 'unpaid')
            )
            "#,
        )
        .bind(member_id)
        .fetch_one(executor)
        .await?;
        Ok(open)
    }
}
