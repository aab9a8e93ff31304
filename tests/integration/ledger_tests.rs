//! Loan lifecycle, atomic reservation, returns, fines and deletion

use std::collections::BTreeMap;

use chrono::Duration;
use rust_decimal::Decimal;

use pustaka_server::{
    config::LoansConfig,
    error::AppError,
    models::loan::{CreateLoan, LoanQuery},
    models::{FineStatus, ItemCondition, Loan, LoanStatus, ReturnCondition},
};

use crate::{d, loans_config, setup, setup_with, TestApp};

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

async fn loan_count(app: &TestApp) -> i64 {
    app.services
        .loans
        .list_loans(&LoanQuery::default())
        .await
        .unwrap()
        .1
}

#[tokio::test]
async fn test_borrow_return_restores_availability() {
    let app = setup().await;
    let book = app.book("Laskar Pelangi", 2).await;
    let other = app.book("Bumi Manusia", 1).await;
    let member = app.member("Ani").await;

    let loan = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id, other.id]))
        .await
        .unwrap();

    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.due_date, d(2024, 1, 8));
    assert_eq!(loan.book_ids(), vec![book.id, other.id]);
    assert_eq!(app.available(book.id).await, 1);
    assert_eq!(app.available(other.id).await, 0);

    app.clock.set_date(d(2024, 1, 5));
    let returned = app
        .services
        .settlement
        .process_return(loan.id, &all_good(&loan))
        .await
        .unwrap();

    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.returned_on(), Some(d(2024, 1, 5)));
    assert_eq!(returned.fine_amount, Decimal::ZERO);
    assert_eq!(returned.fine_status, FineStatus::Paid);
    assert!(returned.items.iter().all(|i| i.condition == ItemCondition::Good));
    assert_eq!(app.available(book.id).await, 2);
    assert_eq!(app.available(other.id).await, 1);
}

#[tokio::test]
async fn test_out_of_stock_rolls_back_every_reservation() {
    let app = setup().await;
    let first = app.book("Ronggeng Dukuh Paruk", 1).await;
    let gone = app.book("Cantik Itu Luka", 0).await;
    let last = app.book("Saman", 3).await;
    let member = app.member("Budi").await;

    let err = app
        .services
        .loans
        .create_loan(request(member.id, &[first.id, gone.id, last.id]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::OutOfStock { book_id } if book_id == gone.id));
    assert_eq!(app.available(first.id).await, 1);
    assert_eq!(app.available(gone.id).await, 0);
    assert_eq!(app.available(last.id).await, 3);
    assert_eq!(loan_count(&app).await, 0);
}

#[tokio::test]
async fn test_unknown_book_rolls_back() {
    let app = setup().await;
    let book = app.book("Gadis Kretek", 1).await;
    let member = app.member("Citra").await;

    let err = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id, 999]))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(app.available(book.id).await, 1);
    assert_eq!(loan_count(&app).await, 0);
}

#[tokio::test]
async fn test_last_copy_goes_to_one_member() {
    let app = setup().await;
    let book = app.book("Negeri 5 Menara", 1).await;
    let dewi = app.member("Dewi").await;
    let eko = app.member("Eko").await;

    let (a, b) = tokio::join!(
        app.services.loans.create_loan(request(dewi.id, &[book.id])),
        app.services.loans.create_loan(request(eko.id, &[book.id])),
    );

    let (winner, loser_err, loser_id) = match (a, b) {
        (Ok(loan), Err(e)) => (loan, e, eko.id),
        (Err(e), Ok(loan)) => (loan, e, dewi.id),
        other => panic!("expected exactly one winner, got {:?}", other),
    };
    assert!(matches!(loser_err, AppError::OutOfStock { .. }));
    assert_eq!(app.available(book.id).await, 0);

    app.services
        .settlement
        .process_return(winner.id, &all_good(&winner))
        .await
        .unwrap();

    let retry = app
        .services
        .loans
        .create_loan(request(loser_id, &[book.id]))
        .await
        .unwrap();
    assert_eq!(retry.member_id, loser_id);
    assert_eq!(app.available(book.id).await, 0);
}

#[tokio::test]
async fn test_create_loan_validation() {
    let app = setup().await;
    let book = app.book("Perahu Kertas", 5).await;
    let member = app.member("Fajar").await;
    let loans = &app.services.loans;

    let empty = loans.create_loan(request(member.id, &[])).await.unwrap_err();
    assert!(matches!(empty, AppError::Validation(_)));

    let twice = loans
        .create_loan(request(member.id, &[book.id, book.id]))
        .await
        .unwrap_err();
    assert!(matches!(twice, AppError::Validation(_)));

    let past_due = CreateLoan {
        due_date: Some(app.today()),
        ..request(member.id, &[book.id])
    };
    assert!(matches!(
        loans.create_loan(past_due).await.unwrap_err(),
        AppError::Validation(_)
    ));

    let too_many = loans
        .create_loan(request(member.id, &[1, 2, 3, 4, 5, 6]))
        .await
        .unwrap_err();
    assert!(matches!(too_many, AppError::Validation(_)));

    let stranger = loans.create_loan(request(404, &[book.id])).await.unwrap_err();
    assert!(matches!(stranger, AppError::NotFound(_)));

    assert_eq!(app.available(book.id).await, 5);
}

#[tokio::test]
async fn test_late_return_fine_and_settlement() {
    let app = setup().await;
    let book = app.book("Pulang", 1).await;
    let member = app.member("Gita").await;

    let loan = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();
    assert_eq!(loan.due_date, d(2024, 1, 8));

    app.clock.set_date(d(2024, 1, 12));
    let returned = app
        .services
        .settlement
        .process_return(loan.id, &all_good(&loan))
        .await
        .unwrap();
    assert_eq!(returned.fine_amount, Decimal::new(6000, 0));
    assert_eq!(returned.fine_status, FineStatus::Unpaid);

    let settled = app.services.settlement.settle_fine(loan.id).await.unwrap();
    assert_eq!(settled.fine_status, FineStatus::Paid);
    assert_eq!(settled.fine_amount, Decimal::new(6000, 0));
    assert!(settled.settled_at.is_some());

    let again = app.services.settlement.settle_fine(loan.id).await.unwrap_err();
    assert!(matches!(again, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_settle_requires_returned_loan() {
    let app = setup().await;
    let book = app.book("Amba", 1).await;
    let member = app.member("Hadi").await;
    let loan = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();

    let active = app.services.settlement.settle_fine(loan.id).await.unwrap_err();
    assert!(matches!(active, AppError::InvalidState(_)));

    let missing = app.services.settlement.settle_fine(777).await.unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_return_errors() {
    let app = setup().await;
    let first = app.book("Arok Dedes", 1).await;
    let second = app.book("Rumah Kaca", 1).await;
    let member = app.member("Indah").await;
    let loan = app
        .services
        .loans
        .create_loan(request(member.id, &[first.id, second.id]))
        .await
        .unwrap();
    let settlement = &app.services.settlement;

    let missing = settlement
        .process_return(555, &BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));

    let partial = BTreeMap::from([(first.id, ReturnCondition::Good)]);
    let incomplete = settlement.process_return(loan.id, &partial).await.unwrap_err();
    assert!(matches!(incomplete, AppError::IncompleteInput(_)));

    // Nothing from the refused return survives
    let still = app.services.loans.get_loan(loan.id).await.unwrap();
    assert_eq!(still.status, LoanStatus::Active);
    assert!(still.returned_at.is_none());
    assert_eq!(app.available(first.id).await, 0);

    settlement.process_return(loan.id, &all_good(&loan)).await.unwrap();
    let twice = settlement
        .process_return(loan.id, &all_good(&loan))
        .await
        .unwrap_err();
    assert!(matches!(twice, AppError::InvalidState(_)));
    assert_eq!(app.available(first.id).await, 1);
    assert_eq!(app.available(second.id).await, 1);
}

#[tokio::test]
async fn test_damaged_copy_is_recorded_and_released() {
    let app = setup().await;
    let book = app.book("Supernova", 1).await;
    let member = app.member("Joko").await;
    let loan = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();

    let conditions = BTreeMap::from([(book.id, ReturnCondition::Damaged)]);
    let returned = app
        .services
        .settlement
        .process_return(loan.id, &conditions)
        .await
        .unwrap();

    assert_eq!(returned.items[0].condition, ItemCondition::Damaged);
    assert_eq!(app.available(book.id).await, 1);
}

#[tokio::test]
async fn test_open_obligation_blocks_new_loans() {
    let app = setup().await;
    let first = app.book("Sang Pemimpi", 2).await;
    let second = app.book("Edensor", 2).await;
    let member = app.member("Kartika").await;
    let loans = &app.services.loans;

    let loan = loans.create_loan(request(member.id, &[first.id])).await.unwrap();

    let blocked = loans.create_loan(request(member.id, &[second.id])).await.unwrap_err();
    assert!(matches!(blocked, AppError::BusinessRule(_)));
    assert_eq!(app.available(second.id).await, 2);

    app.clock.set_date(d(2024, 1, 10));
    app.services
        .settlement
        .process_return(loan.id, &all_good(&loan))
        .await
        .unwrap();

    let unpaid = loans.create_loan(request(member.id, &[second.id])).await.unwrap_err();
    assert!(matches!(unpaid, AppError::BusinessRule(_)));

    app.services.settlement.settle_fine(loan.id).await.unwrap();
    loans.create_loan(request(member.id, &[second.id])).await.unwrap();
}

#[tokio::test]
async fn test_obligation_check_can_be_disabled() {
    let app = setup_with(LoansConfig {
        block_on_open_obligation: false,
        ..loans_config()
    })
    .await;
    let book = app.book("Atheis", 3).await;
    let member = app.member("Lestari").await;

    app.services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();
    app.services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();

    assert_eq!(app.available(book.id).await, 1);
}

#[tokio::test]
async fn test_delete_only_settled_loans() {
    let app = setup().await;
    let book = app.book("Harimau! Harimau!", 1).await;
    let member = app.member("Made").await;
    let loans = &app.services.loans;

    let loan = loans.create_loan(request(member.id, &[book.id])).await.unwrap();

    let active = loans.delete_loan(loan.id, None).await.unwrap_err();
    assert!(matches!(active, AppError::InvalidState(_)));

    app.clock.set_date(d(2024, 1, 9));
    app.services
        .settlement
        .process_return(loan.id, &all_good(&loan))
        .await
        .unwrap();

    let unpaid = loans.delete_loan(loan.id, None).await.unwrap_err();
    assert!(matches!(unpaid, AppError::InvalidState(_)));

    app.services.settlement.settle_fine(loan.id).await.unwrap();
    loans
        .delete_loan(loan.id, Some("Duplicate entry".to_string()))
        .await
        .unwrap();

    assert!(matches!(
        loans.get_loan(loan.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert_eq!(
        app.services.repository.loans.deletion_count(loan.id).await.unwrap(),
        1
    );

    let gone = loans.delete_loan(loan.id, None).await.unwrap_err();
    assert!(matches!(gone, AppError::NotFound(_)));
    assert_eq!(app.available(book.id).await, 1);
}

#[tokio::test]
async fn test_fine_preview_does_not_write() {
    let app = setup().await;
    let book = app.book("Orang-Orang Biasa", 1).await;
    let member = app.member("Nanda").await;
    let loan = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();

    app.clock.advance(Duration::days(9));
    let preview = app.services.loans.fine_preview(loan.id).await.unwrap();
    assert_eq!(preview.as_of, d(2024, 1, 10));
    assert_eq!(preview.overdue_days, 2);
    assert_eq!(preview.amount, Decimal::new(3000, 0));

    let unchanged = app.services.loans.get_loan(loan.id).await.unwrap();
    assert_eq!(unchanged.fine_amount, Decimal::ZERO);
    assert_eq!(unchanged.status, LoanStatus::Active);

    let details = app.services.loans.get_loan_details(loan.id).await.unwrap();
    assert!(details.is_overdue);
    assert_eq!(details.overdue_days, 2);
    assert_eq!(details.member.name, "Nanda");
    assert_eq!(details.books[0].title, "Orang-Orang Biasa");
}

#[tokio::test]
async fn test_available_never_exceeds_stock() {
    let app = setup_with(LoansConfig {
        block_on_open_obligation: false,
        ..loans_config()
    })
    .await;
    let books = [app.book("Entrok", 2).await, app.book("Lelaki Harimau", 1).await];
    let member = app.member("Oka").await;
    let ids: Vec<i64> = books.iter().map(|b| b.id).collect();

    for _ in 0..3 {
        let loan = match app.services.loans.create_loan(request(member.id, &ids)).await {
            Ok(loan) => loan,
            Err(AppError::OutOfStock { .. }) => continue,
            Err(e) => panic!("unexpected error: {}", e),
        };
        app.services
            .settlement
            .process_return(loan.id, &all_good(&loan))
            .await
            .unwrap();
    }

    for book in &books {
        let current = app.services.catalog.get_book(book.id).await.unwrap();
        assert!(current.available >= 0 && current.available <= current.stock);
        assert_eq!(current.available, current.stock);
    }
}

#[tokio::test]
async fn test_member_loans_newest_first() {
    let app = setup_with(LoansConfig {
        block_on_open_obligation: false,
        ..loans_config()
    })
    .await;
    let book = app.book("Bekisar Merah", 3).await;
    let member = app.member("Putu").await;

    let older = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();
    app.clock.advance(Duration::hours(1));
    let newer = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();

    let loans = app.services.loans.get_member_loans(member.id).await.unwrap();
    let ids: Vec<i64> = loans.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);

    let missing = app.services.loans.get_member_loans(404).await.unwrap_err();
    assert!(matches!(missing, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_concurrent_settlement_succeeds_once() {
    let app = setup().await;
    let book = app.book("Burung-Burung Manyar", 1).await;
    let member = app.member("Qori").await;
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

    let settlement = &app.services.settlement;
    let (a, b) = tokio::join!(settlement.settle_fine(loan.id), settlement.settle_fine(loan.id));

    let outcomes = [a, b];
    let paid: Vec<&Loan> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].fine_amount, Decimal::new(6000, 0));
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(AppError::InvalidState(_)))));
}

#[tokio::test]
async fn test_concurrent_returns_release_once() {
    let app = setup().await;
    let book = app.book("Jalan Tak Ada Ujung", 1).await;
    let member = app.member("Rudi").await;
    let loan = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await
        .unwrap();
    let conditions = all_good(&loan);

    let settlement = &app.services.settlement;
    let (a, b) = tokio::join!(
        settlement.process_return(loan.id, &conditions),
        settlement.process_return(loan.id, &conditions),
    );

    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    assert!(matches!(a.err().or(b.err()), Some(AppError::InvalidState(_))));
    assert_eq!(app.available(book.id).await, 1);
}

#[tokio::test]
async fn test_default_duration_out_of_calendar_is_rejected() {
    let app = setup_with(LoansConfig {
        default_duration_days: i64::MAX,
        ..loans_config()
    })
    .await;
    let book = app.book("Arus Balik", 1).await;
    let member = app.member("Vina").await;

    let result = app
        .services
        .loans
        .create_loan(request(member.id, &[book.id]))
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(app.available(book.id).await, 1);

    let explicit = CreateLoan {
        due_date: Some(d(2024, 1, 15)),
        ..request(member.id, &[book.id])
    };
    let loan = app.services.loans.create_loan(explicit).await.unwrap();
    assert_eq!(loan.due_date, d(2024, 1, 15));
}
