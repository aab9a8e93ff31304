//! Ledger behaviour on a file database shared by several pooled connections

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use pustaka_server::{
    error::AppError,
    models::loan::CreateLoan,
    models::member::CreateMember,
    models::{FineStatus, Loan, ReturnCondition},
};

use crate::{d, setup_file};

fn request(member_id: i64, book_ids: &[i64]) -> CreateLoan {
    CreateLoan {
        member_id,
        book_ids: book_ids.to_vec(),
        due_date: None,
    }
}

fn all_good(loan: &Loan) -> BTreeMap<i64, ReturnCondition> {
    loan.items
        .iter()
        .map(|i| (i.book_id, ReturnCondition::Good))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_created_rows_are_returned() {
    let app = setup_file().await;

    for n in 0..10 {
        let book = app.book(&format!("Cerpen {}", n), 2).await;
        assert_eq!(book.stock, 2);
        assert_eq!(book.available, 2);

        let member = app.member(&format!("Pembaca{}", n)).await;
        assert_eq!(member.email, format!("pembaca{}@example.org", n));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_email_unique_ignoring_case() {
    let app = setup_file().await;
    app.member("Sari").await;

    let duplicate = app
        .services
        .members
        .create_member(CreateMember {
            name: "Sari Kedua".to_string(),
            email: "SARI@Example.org".to_string(),
        })
        .await;
    assert!(matches!(duplicate, Err(AppError::BadRequest(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_copy_race_across_connections() {
    let app = setup_file().await;
    let book = app.book("Ronggeng Dukuh Paruk", 1).await;

    let mut members = Vec::new();
    for n in 0..6 {
        members.push(app.member(&format!("Peminjam{}", n)).await);
    }

    let handles: Vec<_> = members
        .iter()
        .map(|member| {
            let loans = app.services.loans.clone();
            let req = request(member.id, &[book.id]);
            tokio::spawn(async move { loans.create_loan(req).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    for outcome in outcomes.iter().filter(|r| r.is_err()) {
        assert!(
            matches!(outcome, Err(AppError::OutOfStock { book_id }) if *book_id == book.id),
            "unexpected outcome {:?}",
            outcome
        );
    }
    assert_eq!(app.available(book.id).await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_settlement_across_connections() {
    let app = setup_file().await;
    let book = app.book("Orang-Orang Bloomington", 1).await;
    let member = app.member("Tono").await;
    let loan = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();
    app.clock.set_date(d(2024, 1, 12));
    app.services
        .settlement
        .process_return(loan.id, &all_good(&loan))
        .await
        .unwrap();

    let loan_id = loan.id;
    let first = app.services.settlement.clone();
    let second = app.services.settlement.clone();
    let a = tokio::spawn(async move { first.settle_fine(loan_id).await });
    let b = tokio::spawn(async move { second.settle_fine(loan_id).await });
    let outcomes = [a.await.unwrap(), b.await.unwrap()];

    let paid: Vec<&Loan> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].fine_amount, Decimal::new(6000, 0));
    assert_eq!(paid[0].fine_status, FineStatus::Paid);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::InvalidState(_)))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_return_across_connections() {
    let app = setup_file().await;
    let book = app.book("Kubah", 1).await;
    let member = app.member("Umi").await;
    let loan = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();
    let loan_id = loan.id;
    let conditions = all_good(&loan);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let settlement = app.services.settlement.clone();
            let conditions = conditions.clone();
            tokio::spawn(async move { settlement.process_return(loan_id, &conditions).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::InvalidState(_)))));
    assert_eq!(app.available(book.id).await, 1);
}
