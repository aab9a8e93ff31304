//! Settlement service: returns and fine payments

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::loan::{FineStatus, ItemCondition, Loan, LoanStatus, ReturnCondition},
    repository::Repository,
    services::fines::FinePolicy,
};

#[derive(Clone)]
pub struct SettlementService {
    repository: Repository,
    fines: FinePolicy,
    clock: Arc<dyn Clock>,
}

impl SettlementService {
    pub fn new(repository: Repository, fines: FinePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            fines,
            clock,
        }
    }

    /// Return every book of an active loan.
    ///
    /// `conditions` must name exactly the loan's books. Each copy goes back to the
    /// catalog whatever its condition; `Damaged` is recorded on the item only.
    pub async fn process_return(
        &self,
        loan_id: i64,
        conditions: &BTreeMap<i64, ReturnCondition>,
    ) -> AppResult<Loan> {
        let now = self.clock.now();
        let mut tx = self.repository.pool.begin().await?;

        if !self.repository.loans.mark_returned(&mut tx, loan_id, now).await? {
            let exists = self.repository.loans.exists(&mut tx, loan_id).await?;
            return if exists {
                tracing::warn!(loan_id, "Return refused: loan is not active");
                Err(AppError::InvalidState(format!("Loan {} is not active", loan_id)))
            } else {
                Err(AppError::NotFound(format!("Loan with id {} not found", loan_id)))
            };
        }

        let loan = self
            .repository
            .loans
            .find(&mut tx, loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        check_coverage(&loan, conditions)?;

        let mut damaged = 0usize;
        for item in &loan.items {
            let condition = ItemCondition::from(conditions[&item.book_id]);
            if condition == ItemCondition::Damaged {
                damaged += 1;
            }
            self.repository
                .loans
                .set_item_condition(&mut tx, loan_id, item.book_id, condition)
                .await?;
            self.repository.books.release(&mut tx, item.book_id, 1).await?;
        }

        let fine = self.fines.assess(loan.due_date, now.date_naive());
        let fine_status = if fine > Decimal::ZERO {
            FineStatus::Unpaid
        } else {
            FineStatus::Paid
        };

        self.repository
            .loans
            .record_fine(&mut tx, loan_id, fine, fine_status)
            .await?;

        let loan = self
            .repository
            .loans
            .find(&mut tx, loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        tx.commit().await?;

        tracing::info!(
            loan_id,
            member_id = loan.member_id,
            %fine,
            fine_status = fine_status.as_str(),
            damaged,
            "Loan returned"
        );

        Ok(loan)
    }

    /// Mark the unpaid fine of a returned loan as paid. A second call fails.
    pub async fn settle_fine(&self, loan_id: i64) -> AppResult<Loan> {
        let now = self.clock.now();

        if self.repository.loans.settle(loan_id, now).await? {
            let loan = self.repository.loans.get_by_id(loan_id).await?;
            tracing::info!(
                loan_id,
                member_id = loan.member_id,
                fine = %loan.fine_amount,
                "Fine settled"
            );
            return Ok(loan);
        }

        let loan = self.repository.loans.get_by_id(loan_id).await?;
        tracing::warn!(loan_id, "Settlement refused");

        let reason = match (loan.status, loan.fine_status) {
            (LoanStatus::Active, _) => format!("Loan {} has not been returned", loan_id),
            (LoanStatus::Returned, FineStatus::Paid) => {
                format!("Fine for loan {} is already settled", loan_id)
            }
            (LoanStatus::Returned, FineStatus::Unpaid) => {
                format!("Fine for loan {} changed during settlement", loan_id)
            }
        };
        Err(AppError::InvalidState(reason))
    }
}

/// The return payload must list exactly the books of the loan
fn check_coverage(loan: &Loan, conditions: &BTreeMap<i64, ReturnCondition>) -> AppResult<()> {
    let expected: BTreeSet<i64> = loan.items.iter().map(|i| i.book_id).collect();
    let given: BTreeSet<i64> = conditions.keys().copied().collect();

    if expected == given {
        return Ok(());
    }

    let missing: Vec<i64> = expected.difference(&given).copied().collect();
    let unexpected: Vec<i64> = given.difference(&expected).copied().collect();

    Err(AppError::IncompleteInput(format!(
        "Loan {}: missing books {:?}, unexpected books {:?}",
        loan.id, missing, unexpected
    )))
}
