mod common;

use chrono::{Duration, Utc};
use fund_transfer_engine::error::ErrorCode;
use fund_transfer_engine::models::EntryType;
use fund_transfer_engine::services::{
    InitiateTransferCommand, StatementQuery, StatementService, TransferService,
};

fn window(from: chrono::DateTime<Utc>, to: chrono::DateTime<Utc>) -> StatementQuery {
    StatementQuery {
        from,
        to,
        page: 1,
        per_page: 50,
    }
}

#[tokio::test]
async fn test_statement_over_full_history() {
    let pool = common::setup_test_db().await;
    let statements = StatementService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());

    let a = common::open_account(&pool, "Statement", 10_000).await;
    let b = common::open_account(&pool, "Counterparty", 0).await;

    let transfer = transfers
        .initiate(InitiateTransferCommand {
            source_account_id: a.id,
            destination_account_id: b.id,
            amount: 1_000,
            currency: "USD".to_string(),
            description: None,
            idempotency_key: Some(common::unique_key("ST")),
        })
        .await
        .unwrap();
    transfers.reverse(transfer.id).await.unwrap();

    // Window opens before the account existed: opening balance is zero and
    // every entry (bootstrap, debit, reversal credit) is a movement.
    let statement = statements
        .statement(
            a.id,
            window(a.created_at - Duration::days(1), Utc::now() + Duration::days(1)),
        )
        .await
        .unwrap();

    assert_eq!(statement.opening_balance, 0);
    assert_eq!(statement.closing_balance, 10_000);
    assert_eq!(statement.total, 3);
    assert_eq!(statement.movements.len(), 3);

    // Reverse chronological order.
    for pair in statement.movements.windows(2) {
        assert!(pair[0].occurred_at >= pair[1].occurred_at);
    }
    assert_eq!(statement.movements[0].entry_type, EntryType::Credit);
}

#[tokio::test]
async fn test_statement_window_after_seed_uses_snapshot_opening() {
    let pool = common::setup_test_db().await;
    let statements = StatementService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());

    let a = common::open_account(&pool, "Statement", 10_000).await;
    let b = common::open_account(&pool, "Counterparty", 0).await;

    let transfer = transfers
        .initiate(InitiateTransferCommand {
            source_account_id: a.id,
            destination_account_id: b.id,
            amount: 1_000,
            currency: "USD".to_string(),
            description: None,
            idempotency_key: Some(common::unique_key("ST2")),
        })
        .await
        .unwrap();
    transfers.reverse(transfer.id).await.unwrap();

    // Window starts just after the bootstrap entry: the opening balance is
    // the seed snapshot and only the two transfer legs are movements.
    let statement = statements
        .statement(
            a.id,
            window(
                a.created_at + Duration::microseconds(1),
                Utc::now() + Duration::days(1),
            ),
        )
        .await
        .unwrap();

    assert_eq!(statement.opening_balance, 10_000);
    assert_eq!(statement.closing_balance, 10_000);
    assert_eq!(statement.total, 2);
    assert_eq!(statement.movements.len(), 2);
}

#[tokio::test]
async fn test_statement_empty_window_closing_equals_opening() {
    let pool = common::setup_test_db().await;
    let statements = StatementService::new(pool.clone());

    let a = common::open_account(&pool, "Quiet", 2_500).await;

    let from = a.created_at + Duration::days(10);
    let statement = statements
        .statement(a.id, window(from, from + Duration::days(10)))
        .await
        .unwrap();

    assert_eq!(statement.total, 0);
    assert!(statement.movements.is_empty());
    assert_eq!(statement.opening_balance, 2_500);
    assert_eq!(statement.closing_balance, 2_500);
}

#[tokio::test]
async fn test_statement_pagination() {
    let pool = common::setup_test_db().await;
    let statements = StatementService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());

    let a = common::open_account(&pool, "Paged", 10_000).await;
    let b = common::open_account(&pool, "Counterparty", 0).await;

    for _ in 0..5 {
        transfers
            .initiate(InitiateTransferCommand {
                source_account_id: a.id,
                destination_account_id: b.id,
                amount: 100,
                currency: "USD".to_string(),
                description: None,
                idempotency_key: None,
            })
            .await
            .unwrap();
    }

    let mut query = window(a.created_at - Duration::days(1), Utc::now() + Duration::days(1));
    query.per_page = 2;

    let page1 = statements.statement(a.id, query.clone()).await.unwrap();
    assert_eq!(page1.total, 6); // bootstrap + 5 debits
    assert_eq!(page1.movements.len(), 2);

    query.page = 3;
    let page3 = statements.statement(a.id, query.clone()).await.unwrap();
    assert_eq!(page3.movements.len(), 2);
    assert_ne!(page1.movements[0].id, page3.movements[0].id);

    query.page = 4;
    let page4 = statements.statement(a.id, query).await.unwrap();
    assert!(page4.movements.is_empty());
    // The closing balance does not depend on the page.
    assert_eq!(page4.closing_balance, page1.closing_balance);
}

#[tokio::test]
async fn test_statement_guards() {
    let pool = common::setup_test_db().await;
    let statements = StatementService::new(pool.clone());
    let a = common::open_account(&pool, "Guarded", 0).await;

    let now = Utc::now();

    let err = statements
        .statement(a.id, window(now, now - Duration::days(1)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidDateRange));

    let err = statements
        .statement(a.id, window(now - Duration::days(400), now))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::InvalidDateRange));

    let mut query = window(now - Duration::days(30), now);
    query.per_page = 101;
    let err = statements.statement(a.id, query).await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::ValidationError));

    let err = statements
        .statement(uuid::Uuid::new_v4(), window(now - Duration::days(1), now))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::AccountNotFound));
}
