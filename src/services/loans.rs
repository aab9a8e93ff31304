//! Loan ledger service: loan creation, administrative deletion and loan views

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use validator::Validate;

use crate::{
    clock::Clock,
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        loan::{CreateLoan, FinePreview, Loan, LoanDetails, LoanItemDetails, LoanQuery, LoanStatus},
        member::MemberShort,
    },
    repository::Repository,
    services::fines::{compute_overdue_days, FinePolicy},
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    config: LoansConfig,
    fines: FinePolicy,
    clock: Arc<dyn Clock>,
}

impl LoansService {
    pub fn new(repository: Repository, config: LoansConfig, clock: Arc<dyn Clock>) -> Self {
        let fines = FinePolicy::from(&config);
        Self {
            repository,
            config,
            fines,
            clock,
        }
    }

    /// Create a loan covering every requested book, or nothing at all.
    pub async fn create_loan(&self, request: CreateLoan) -> AppResult<Loan> {
        request.validate()?;

        let now = self.clock.now();
        let today = now.date_naive();
        let due_date = match request.due_date {
            Some(due_date) => due_date,
            None => Duration::try_days(self.config.default_duration_days)
                .and_then(|duration| today.checked_add_signed(duration))
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "Default loan duration of {} days is out of range",
                        self.config.default_duration_days
                    ))
                })?,
        };

        if due_date <= today {
            return Err(AppError::Validation(format!(
                "Due date {} must be after {}",
                due_date, today
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = request.book_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(AppError::Validation(format!("Book {} is listed twice", dup)));
        }

        if request.book_ids.len() > self.config.max_books_per_loan {
            return Err(AppError::Validation(format!(
                "A loan may cover at most {} books",
                self.config.max_books_per_loan
            )));
        }

        let pool = &self.repository.pool;
        let member_id = request.member_id;

        if !self.repository.members.exists(pool, member_id).await? {
            return Err(AppError::NotFound(format!("Member with id {} not found", member_id)));
        }

        if self.config.block_on_open_obligation
            && self.repository.members.has_open_obligation(pool, member_id).await?
        {
            tracing::warn!(member_id, "Loan refused: member has an open obligation");
            return Err(open_obligation(member_id));
        }

        let mut tx = pool.begin().await?;

        // Dropping `tx` on any error below rolls back every reservation.
        if let Err(e) = self.repository.books.reserve_all(&mut tx, &request.book_ids).await {
            tracing::warn!(member_id, books = ?request.book_ids, "Loan refused: {}", e);
            return Err(e);
        }

        // Checked again under the write lock taken by the reservations.
        if self.config.block_on_open_obligation
            && self.repository.members.has_open_obligation(&mut *tx, member_id).await?
        {
            tracing::warn!(member_id, "Loan refused: member has an open obligation");
            return Err(open_obligation(member_id));
        }

        let loan_id = self
            .repository
            .loans
            .insert(&mut tx, member_id, now, due_date, &request.book_ids)
            .await?;

        let loan = self
            .repository
            .loans
            .find(&mut tx, loan_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Loan {} vanished after insert", loan_id)))?;

        tx.commit().await?;

        tracing::info!(
            loan_id,
            member_id,
            books = ?loan.book_ids(),
            %due_date,
            "Loan created"
        );

        Ok(loan)
    }

    /// Permanently remove a returned loan whose fine is settled. The deletion is audited.
    pub async fn delete_loan(&self, loan_id: i64, reason: Option<String>) -> AppResult<()> {
        let now = self.clock.now();
        let mut tx = self.repository.pool.begin().await?;

        let deleted = self
            .repository
            .loans
            .delete_settled(&mut tx, loan_id, reason.as_deref(), now)
            .await?;

        if !deleted {
            let exists = self.repository.loans.exists(&mut tx, loan_id).await?;
            return if exists {
                tracing::warn!(loan_id, "Deletion refused: loan is not returned and settled");
                Err(AppError::InvalidState(format!(
                    "Loan {} can only be deleted once returned and settled",
                    loan_id
                )))
            } else {
                Err(AppError::NotFound(format!("Loan with id {} not found", loan_id)))
            };
        }

        tx.commit().await?;

        tracing::info!(loan_id, reason = reason.as_deref().unwrap_or(""), "Loan deleted");
        Ok(())
    }

    pub async fn get_loan(&self, loan_id: i64) -> AppResult<Loan> {
        self.repository.loans.get_by_id(loan_id).await
    }

    /// Loan with member name, book titles and overdue data
    pub async fn get_loan_details(&self, loan_id: i64) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.get_by_id(loan_id).await?;
        self.details(loan).await
    }

    pub async fn list_loans(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        let (loans, total) = self.repository.loans.search(query).await?;
        let mut details = Vec::with_capacity(loans.len());
        for loan in loans {
            details.push(self.details(loan).await?);
        }
        Ok((details, total))
    }

    /// All loans of a member, newest first
    pub async fn get_member_loans(&self, member_id: i64) -> AppResult<Vec<LoanDetails>> {
        self.repository.members.get_by_id(member_id).await?;
        let query = LoanQuery {
            member_id: Some(member_id),
            per_page: Some(200),
            ..LoanQuery::default()
        };
        Ok(self.list_loans(&query).await?.0)
    }

    /// Fine owed if the loan were returned today, or the recorded fine once returned.
    /// Never writes to the ledger.
    pub async fn fine_preview(&self, loan_id: i64) -> AppResult<FinePreview> {
        let loan = self.repository.loans.get_by_id(loan_id).await?;
        let today = self.clock.today();

        let (overdue_days, amount, as_of) = match (loan.status, loan.returned_on()) {
            (LoanStatus::Returned, Some(returned_on)) => (
                compute_overdue_days(loan.due_date, returned_on),
                loan.fine_amount,
                returned_on,
            ),
            _ => (
                compute_overdue_days(loan.due_date, today),
                self.fines.assess(loan.due_date, today),
                today,
            ),
        };

        Ok(FinePreview {
            loan_id,
            status: loan.status,
            fine_status: loan.fine_status,
            overdue_days,
            amount,
            as_of,
        })
    }

    async fn details(&self, loan: Loan) -> AppResult<LoanDetails> {
        let member = self.repository.members.get_by_id(loan.member_id).await?;

        let mut books = Vec::with_capacity(loan.items.len());
        for item in &loan.items {
            let book = self.repository.books.get_by_id(item.book_id).await?;
            books.push(LoanItemDetails {
                book_id: book.id,
                title: book.title,
                condition: item.condition,
            });
        }

        let as_of = loan.returned_on().unwrap_or_else(|| self.clock.today());
        let overdue_days = compute_overdue_days(loan.due_date, as_of);

        Ok(LoanDetails {
            id: loan.id,
            member: MemberShort::from(&member),
            created_at: loan.created_at,
            due_date: loan.due_date,
            returned_at: loan.returned_at,
            status: loan.status,
            fine_status: loan.fine_status,
            fine_amount: loan.fine_amount,
            books,
            overdue_days,
            is_overdue: loan.is_overdue(self.clock.today()),
        })
    }
}

fn open_obligation(member_id: i64) -> AppError {
    AppError::BusinessRule(format!(
        "Member {} has an active loan or an unpaid fine",
        member_id
    ))
}
