//! Books repository: catalog rows and copy reservation

use sqlx::{Pool, Sqlite, SqliteConnection};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, CreateBook},
        page_offset,
    },
};

const BOOK_COLUMNS: &str = "id, title, isbn, publisher, year_published, stock, available";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Sqlite>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i64) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = ?", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Search books with pagination
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let (page, per_page) = query.pagination();
        let title = query.title.as_ref().map(|t| format!("%{}%", t.to_lowercase()));
        let available_only = query.available_only.unwrap_or(false);

        let filter = "(?1 IS NULL OR LOWER(title) LIKE ?1) AND (?2 = 0 OR available > 0)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM books WHERE {}", filter))
            .bind(&title)
            .bind(available_only)
            .fetch_one(&self.pool)
            .await?;

        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE {} ORDER BY title, id LIMIT ?3 OFFSET ?4",
            BOOK_COLUMNS, filter
        ))
        .bind(&title)
        .bind(available_only)
        .bind(per_page)
        .bind(page_offset(page, per_page))
        .fetch_all(&self.pool)
        .await?;

        Ok((books, total))
    }

    /// Create a book; every owned copy starts available
    pub async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        // Stepped to completion so the row is committed before it is read back
        let id = sqlx::query(
            r#"
            INSERT INTO books (title, isbn, publisher, year_published, stock, available)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&book.title)
        .bind(&book.isbn)
        .bind(&book.publisher)
        .bind(book.year_published)
        .bind(book.stock)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get_by_id(id).await
    }

    /// All books, for ledger snapshots
    pub async fn all(&self, conn: &mut SqliteConnection) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books ORDER BY id", BOOK_COLUMNS))
            .fetch_all(&mut *conn)
            .await?;
        Ok(books)
    }

    /// Take `qty` copies of a book out of `available`.
    ///
    /// Runs on the caller's transaction. Nothing is decremented when fewer than
    /// `qty` copies are available.
    pub async fn reserve(&self, conn: &mut SqliteConnection, book_id: i64, qty: i64) -> AppResult<()> {
        let reserved = sqlx::query(
            "UPDATE books SET available = available - ?1 WHERE id = ?2 AND available >= ?1",
        )
        .bind(qty)
        .bind(book_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if reserved == 1 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM books WHERE id = ?)")
            .bind(book_id)
            .fetch_one(&mut *conn)
            .await?;

        if exists {
            Err(AppError::OutOfStock { book_id })
        } else {
            Err(AppError::NotFound(format!("Book with id {} not found", book_id)))
        }
    }

    /// Reserve one copy of each book, in ascending id order.
    ///
    /// The first failure is returned as is; the caller rolls back its transaction
    /// so that no partial reservation survives.
    pub async fn reserve_all(&self, conn: &mut SqliteConnection, book_ids: &[i64]) -> AppResult<()> {
        let mut ordered = book_ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        for book_id in ordered {
            self.reserve(conn, book_id, 1).await?;
        }
        Ok(())
    }

    /// Give `qty` copies back to `available`, capped at `stock`
    pub async fn release(&self, conn: &mut SqliteConnection, book_id: i64, qty: i64) -> AppResult<()> {
        let overflow: Option<bool> =
            sqlx::query_scalar("SELECT available + ?1 > stock FROM books WHERE id = ?2")
                .bind(qty)
                .bind(book_id)
                .fetch_optional(&mut *conn)
                .await?;

        match overflow {
            None => {
                tracing::warn!(book_id, "release for unknown book ignored");
                return Ok(());
            }
            Some(true) => {
                tracing::warn!(book_id, qty, "release would exceed stock, capping available");
            }
            Some(false) => {}
        }

        sqlx::query("UPDATE books SET available = MIN(stock, available + ?1) WHERE id = ?2")
            .bind(qty)
            .bind(book_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
