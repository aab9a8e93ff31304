//! Loans repository: the ledger of loans and their items

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite, SqliteConnection};

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{FineStatus, ItemCondition, Loan, LoanItem, LoanQuery, LoanStatus},
        page_offset,
    },
};

const LOAN_COLUMNS: &str =
    "id, member_id, created_at, due_date, returned_at, settled_at, status, fine_status, fine_amount";

fn parse_column<T: FromStr<Err = String>>(row: &SqliteRow, column: &str) -> AppResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: String| AppError::Internal(format!("column {}: {}", column, e)))
}

fn decimal_column(row: &SqliteRow, column: &str) -> AppResult<Decimal> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw)
        .map_err(|e| AppError::Internal(format!("column {}: {}", column, e)))
}

fn loan_from_row(row: &SqliteRow) -> AppResult<Loan> {
    Ok(Loan {
        id: row.try_get("id")?,
        member_id: row.try_get("member_id")?,
        created_at: row.try_get("created_at")?,
        due_date: row.try_get("due_date")?,
        returned_at: row.try_get("returned_at")?,
        settled_at: row.try_get("settled_at")?,
        status: parse_column(row, "status")?,
        fine_status: parse_column(row, "fine_status")?,
        fine_amount: decimal_column(row, "fine_amount")?,
        items: Vec::new(),
    })
}

fn item_from_row(row: &SqliteRow) -> AppResult<LoanItem> {
    Ok(LoanItem {
        loan_id: row.try_get("loan_id")?,
        book_id: row.try_get("book_id")?,
        position: row.try_get("position")?,
        condition: parse_column(row, "condition")?,
    })
}

/// Attach items to their loans, keeping item order by position
fn attach_items(loans: &mut [Loan], items: Vec<LoanItem>) {
    let mut by_loan: HashMap<i64, Vec<LoanItem>> = HashMap::new();
    for item in items {
        by_loan.entry(item.loan_id).or_default().push(item);
    }
    for loan in loans.iter_mut() {
        if let Some(mut items) = by_loan.remove(&loan.id) {
            items.sort_by_key(|i| i.position);
            loan.items = items;
        }
    }
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Sqlite>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Get loan by ID, with items
    pub async fn get_by_id(&self, id: i64) -> AppResult<Loan> {
        let mut conn = self.pool.acquire().await?;
        self.find(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Load a loan and its items on the given connection
    pub async fn find(&self, conn: &mut SqliteConnection, id: i64) -> AppResult<Option<Loan>> {
        let row = sqlx::query(&format!("SELECT {} FROM loans WHERE id = ?", LOAN_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut loan = loan_from_row(&row)?;
        loan.items = sqlx::query(
            "SELECT loan_id, book_id, position, condition FROM loan_items WHERE loan_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(item_from_row)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(loan))
    }

    /// List loans with optional filters, newest first
    pub async fn search(&self, query: &LoanQuery) -> AppResult<(Vec<Loan>, i64)> {
        let (page, per_page) = query.pagination();
        let status = query.status.map(|s| s.as_str());

        let filter = "(?1 IS NULL OR status = ?1) AND (?2 IS NULL OR member_id = ?2)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM loans WHERE {}", filter))
            .bind(status)
            .bind(query.member_id)
            .fetch_one(&self.pool)
            .await?;

        let mut conn = self.pool.acquire().await?;

        let mut loans = sqlx::query(&format!(
            "SELECT {} FROM loans WHERE {} ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            LOAN_COLUMNS, filter
        ))
        .bind(status)
        .bind(query.member_id)
        .bind(per_page)
        .bind(page_offset(page, per_page))
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(loan_from_row)
        .collect::<AppResult<Vec<_>>>()?;

        let ids: Vec<i64> = loans.iter().map(|l| l.id).collect();
        let items = self.items_for(&mut conn, &ids).await?;
        attach_items(&mut loans, items);

        Ok((loans, total))
    }

    async fn items_for(&self, conn: &mut SqliteConnection, loan_ids: &[i64]) -> AppResult<Vec<LoanItem>> {
        if loan_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; loan_ids.len()].join(", ");
        let sql = format!(
            "SELECT loan_id, book_id, position, condition FROM loan_items WHERE loan_id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql);
        for id in loan_ids {
            query = query.bind(id);
        }
        query
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(item_from_row)
            .collect()
    }

    /// Every loan with its items, for ledger snapshots
    pub async fn all(&self, conn: &mut SqliteConnection) -> AppResult<Vec<Loan>> {
        let mut loans = sqlx::query(&format!("SELECT {} FROM loans ORDER BY id", LOAN_COLUMNS))
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(loan_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        let items = sqlx::query("SELECT loan_id, book_id, position, condition FROM loan_items")
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(item_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        attach_items(&mut loans, items);
        Ok(loans)
    }

    /// Insert an active loan and one item per book, in request order
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        member_id: i64,
        created_at: DateTime<Utc>,
        due_date: NaiveDate,
        book_ids: &[i64],
    ) -> AppResult<i64> {
        let loan_id = sqlx::query(
            r#"
            INSERT INTO loans (member_id, created_at, due_date, status, fine_status, fine_amount)
            VALUES (?, ?, ?, ?, ?, '0')
            "#,
        )
        .bind(member_id)
        .bind(created_at)
        .bind(due_date)
        .bind(LoanStatus::Active.as_str())
        .bind(FineStatus::Unpaid.as_str())
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        for (position, book_id) in book_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO loan_items (loan_id, book_id, position, condition) VALUES (?, ?, ?, ?)",
            )
            .bind(loan_id)
            .bind(book_id)
            .bind(position as i64)
            .bind(ItemCondition::Unset.as_str())
            .execute(&mut *conn)
            .await?;
        }

        Ok(loan_id)
    }

    /// Flip an active loan to returned. Returns false when the loan is missing or not active.
    pub async fn mark_returned(
        &self,
        conn: &mut SqliteConnection,
        loan_id: i64,
        returned_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let updated = sqlx::query(
            "UPDATE loans SET status = 'returned', returned_at = ? WHERE id = ? AND status = 'active'",
        )
        .bind(returned_at)
        .bind(loan_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    pub async fn set_item_condition(
        &self,
        conn: &mut SqliteConnection,
        loan_id: i64,
        book_id: i64,
        condition: ItemCondition,
    ) -> AppResult<()> {
        sqlx::query("UPDATE loan_items SET condition = ? WHERE loan_id = ? AND book_id = ?")
            .bind(condition.as_str())
            .bind(loan_id)
            .bind(book_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Record the fine assessed at return time
    pub async fn record_fine(
        &self,
        conn: &mut SqliteConnection,
        loan_id: i64,
        amount: Decimal,
        fine_status: FineStatus,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE loans SET fine_amount = ?, fine_status = ? WHERE id = ? AND status = 'returned'",
        )
        .bind(amount.to_string())
        .bind(fine_status.as_str())
        .bind(loan_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Mark an unpaid fine on a returned loan as paid. Returns false when the loan is
    /// missing or not in that state.
    pub async fn settle(&self, loan_id: i64, settled_at: DateTime<Utc>) -> AppResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE loans SET fine_status = 'paid', settled_at = ?
            WHERE id = ? AND status = 'returned' AND fine_status = 'unpaid'
            "#,
        )
        .bind(settled_at)
        .bind(loan_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated == 1)
    }

    /// Audit and remove a returned, paid loan. Returns false when the loan is missing
    /// or not eligible.
    pub async fn delete_settled(
        &self,
        conn: &mut SqliteConnection,
        loan_id: i64,
        reason: Option<&str>,
        deleted_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let audited = sqlx::query(
            r#"
            INSERT INTO loan_deletions (loan_id, member_id, fine_amount, reason, deleted_at)
            SELECT id, member_id, fine_amount, ?, ?
            FROM loans
            WHERE id = ? AND status = 'returned' AND fine_status = 'paid'
            "#,
        )
        .bind(reason)
        .bind(deleted_at)
        .bind(loan_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if audited == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM loans WHERE id = ?")
            .bind(loan_id)
            .execute(&mut *conn)
            .await?;

        Ok(true)
    }

    pub async fn exists(&self, conn: &mut SqliteConnection, loan_id: i64) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM loans WHERE id = ?)")
            .bind(loan_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(exists)
    }

    /// Number of audit rows recorded for a deleted loan
    pub async fn deletion_count(&self, loan_id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loan_deletions WHERE loan_id = ?")
            .bind(loan_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
