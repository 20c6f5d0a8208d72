mod common;

use fund_transfer_engine::error::{AppError, ErrorCode};
use fund_transfer_engine::models::{EntryType, TransferStatus, TransferType};
use fund_transfer_engine::repositories::{LedgerRepository, TransferRepository};
use fund_transfer_engine::services::{AccountService, InitiateTransferCommand, TransferService};
use uuid::Uuid;

fn transfer_command(
    source: Uuid,
    destination: Uuid,
    amount: i64,
    key: Option<String>,
) -> InitiateTransferCommand {
    InitiateTransferCommand {
        source_account_id: source,
        destination_account_id: destination,
        amount,
        currency: "USD".to_string(),
        description: None,
        idempotency_key: key,
    }
}

fn domain_code(err: &AppError) -> ErrorCode {
    err.code().expect("expected a domain error")
}

#[tokio::test]
async fn test_simple_transfer_moves_money_and_writes_double_entry() {
    let pool = common::setup_test_db().await;
    let accounts = AccountService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());

    let a = common::open_account(&pool, "Source", 10_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;

    let transfer = transfers
        .initiate(transfer_command(a.id, b.id, 2_500, Some(common::unique_key("K1"))))
        .await
        .unwrap();

    assert_eq!(transfer.status, TransferStatus::Completed);
    assert!(transfer.completed_at.is_some());
    assert!(transfer.reference.starts_with("TXN-"));

    assert_eq!(accounts.get(a.id).await.unwrap().balance, 7_500);
    assert_eq!(accounts.get(b.id).await.unwrap().balance, 2_500);

    let entries = ledger.find_by_transfer(transfer.id).await.unwrap();
    assert_eq!(entries.len(), 2);

    let debit = entries.iter().find(|e| e.entry_type == EntryType::Debit).unwrap();
    assert_eq!(debit.account_id, a.id);
    assert_eq!(debit.counterparty_account_id, b.id);
    assert_eq!(debit.amount, 2_500);
    assert_eq!(debit.balance_after, 7_500);
    assert_eq!(debit.transfer_type, TransferType::Transfer);

    let credit = entries.iter().find(|e| e.entry_type == EntryType::Credit).unwrap();
    assert_eq!(credit.account_id, b.id);
    assert_eq!(credit.counterparty_account_id, a.id);
    assert_eq!(credit.amount, 2_500);
    assert_eq!(credit.balance_after, 2_500);
}

#[tokio::test]
async fn test_idempotent_retry_returns_existing_transfer() {
    let pool = common::setup_test_db().await;
    let accounts = AccountService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());

    let a = common::open_account(&pool, "Source", 10_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;
    let key = common::unique_key("K1");

    let first = transfers
        .initiate(transfer_command(a.id, b.id, 2_500, Some(key.clone())))
        .await
        .unwrap();
    let second = transfers
        .initiate(transfer_command(a.id, b.id, 2_500, Some(key.clone())))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.status, TransferStatus::Completed);

    // No extra money moved and no extra ledger rows.
    assert_eq!(accounts.get(a.id).await.unwrap().balance, 7_500);
    assert_eq!(accounts.get(b.id).await.unwrap().balance, 2_500);
    assert_eq!(ledger.find_by_transfer(first.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_db_level_dedup_wins_even_with_different_amount() {
    // The HTTP layer rejects key reuse with a different body; the row-level
    // key is the second line of defence and simply returns the committed
    // transfer without moving money.
    let pool = common::setup_test_db().await;
    let transfers = TransferService::new(pool.clone());
    let accounts = AccountService::new(pool.clone());

    let a = common::open_account(&pool, "Source", 10_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;
    let key = common::unique_key("K1");

    let first = transfers
        .initiate(transfer_command(a.id, b.id, 2_500, Some(key.clone())))
        .await
        .unwrap();
    let replay = transfers
        .initiate(transfer_command(a.id, b.id, 9_000, Some(key.clone())))
        .await
        .unwrap();

    assert_eq!(replay.id, first.id);
    assert_eq!(replay.amount, 2_500);
    assert_eq!(accounts.get(a.id).await.unwrap().balance, 7_500);
}

#[tokio::test]
async fn test_insufficient_funds_records_failed_transfer() {
    let pool = common::setup_test_db().await;
    let accounts = AccountService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());
    let repository = TransferRepository::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());

    let a = common::open_account(&pool, "Source", 100).await;
    let b = common::open_account(&pool, "Destination", 0).await;
    let key = common::unique_key("K2");

    let err = transfers
        .initiate(transfer_command(a.id, b.id, 500, Some(key.clone())))
        .await
        .unwrap_err();
    assert_eq!(domain_code(&err), ErrorCode::InsufficientFunds);

    // Balances untouched.
    assert_eq!(accounts.get(a.id).await.unwrap().balance, 100);
    assert_eq!(accounts.get(b.id).await.unwrap().balance, 0);

    // A failed transfer row exists for the audit trail, with no ledger rows.
    let failed = repository
        .find_by_idempotency_key(&key)
        .await
        .unwrap()
        .expect("failed transfer row should exist");
    assert_eq!(failed.status, TransferStatus::Failed);
    assert_eq!(failed.failure_code.as_deref(), Some("INSUFFICIENT_FUNDS"));
    assert!(failed.failure_reason.is_some());
    assert!(failed.failed_at.is_some());
    assert!(ledger.find_by_transfer(failed.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transfer_from_frozen_account_fails_with_audit_row() {
    let pool = common::setup_test_db().await;
    let accounts = AccountService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());
    let repository = TransferRepository::new(pool.clone());

    let a = common::open_account(&pool, "Source", 1_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;
    accounts.freeze(a.id).await.unwrap();
    let key = common::unique_key("KF");

    let err = transfers
        .initiate(transfer_command(a.id, b.id, 100, Some(key.clone())))
        .await
        .unwrap_err();
    assert_eq!(domain_code(&err), ErrorCode::AccountFrozen);

    let failed = repository.find_by_idempotency_key(&key).await.unwrap().unwrap();
    assert_eq!(failed.failure_code.as_deref(), Some("ACCOUNT_FROZEN"));
}

#[tokio::test]
async fn test_missing_account_is_not_recorded_as_failed() {
    let pool = common::setup_test_db().await;
    let transfers = TransferService::new(pool.clone());
    let repository = TransferRepository::new(pool.clone());

    let a = common::open_account(&pool, "Source", 1_000).await;
    let ghost = Uuid::new_v4();
    let key = common::unique_key("KG");

    let err = transfers
        .initiate(transfer_command(a.id, ghost, 100, Some(key.clone())))
        .await
        .unwrap_err();
    assert_eq!(domain_code(&err), ErrorCode::AccountNotFound);

    // Invalid input, not a rule violation: no audit row.
    assert!(repository.find_by_idempotency_key(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_currency_mismatch_fails_the_transfer() {
    let pool = common::setup_test_db().await;
    let transfers = TransferService::new(pool.clone());

    let a = common::open_account(&pool, "Source", 1_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;

    let err = transfers
        .initiate(InitiateTransferCommand {
            source_account_id: a.id,
            destination_account_id: b.id,
            amount: 100,
            currency: "EUR".to_string(),
            description: None,
            idempotency_key: Some(common::unique_key("KC")),
        })
        .await
        .unwrap_err();
    assert_eq!(domain_code(&err), ErrorCode::CurrencyMismatch);
}

#[tokio::test]
async fn test_reversal_restores_balances_with_four_entries() {
    let pool = common::setup_test_db().await;
    let accounts = AccountService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());

    let a = common::open_account(&pool, "Source", 10_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;

    let transfer = transfers
        .initiate(transfer_command(a.id, b.id, 1_000, Some(common::unique_key("K3"))))
        .await
        .unwrap();

    let reversed = transfers.reverse(transfer.id).await.unwrap();
    assert_eq!(reversed.status, TransferStatus::Reversed);
    assert!(reversed.reversed_at.is_some());

    // Balances are back where they started.
    assert_eq!(accounts.get(a.id).await.unwrap().balance, 10_000);
    assert_eq!(accounts.get(b.id).await.unwrap().balance, 0);

    // Four entries for this transfer id, summing to zero per account.
    let entries = ledger.find_by_transfer(transfer.id).await.unwrap();
    assert_eq!(entries.len(), 4);
    let sum_a: i64 = entries
        .iter()
        .filter(|e| e.account_id == a.id)
        .map(|e| e.signed_amount())
        .sum();
    let sum_b: i64 = entries
        .iter()
        .filter(|e| e.account_id == b.id)
        .map(|e| e.signed_amount())
        .sum();
    assert_eq!(sum_a, 0);
    assert_eq!(sum_b, 0);

    let reversal_debit = entries
        .iter()
        .find(|e| e.transfer_type == TransferType::Reversal && e.entry_type == EntryType::Debit)
        .unwrap();
    assert_eq!(reversal_debit.account_id, b.id);
}

#[tokio::test]
async fn test_second_reverse_fails_with_invalid_state() {
    let pool = common::setup_test_db().await;
    let transfers = TransferService::new(pool.clone());

    let a = common::open_account(&pool, "Source", 10_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;

    let transfer = transfers
        .initiate(transfer_command(a.id, b.id, 1_000, Some(common::unique_key("K3"))))
        .await
        .unwrap();
    transfers.reverse(transfer.id).await.unwrap();

    let err = transfers.reverse(transfer.id).await.unwrap_err();
    assert_eq!(domain_code(&err), ErrorCode::InvalidTransferState);
}

#[tokio::test]
async fn test_reversal_of_drained_destination_fails_and_keeps_completed() {
    let pool = common::setup_test_db().await;
    let accounts = AccountService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());

    let a = common::open_account(&pool, "Source", 1_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;
    let c = common::open_account(&pool, "Drain", 0).await;

    let transfer = transfers
        .initiate(transfer_command(a.id, b.id, 1_000, Some(common::unique_key("KD"))))
        .await
        .unwrap();
    // Drain the destination so the reversal cannot be funded.
    transfers
        .initiate(transfer_command(b.id, c.id, 1_000, Some(common::unique_key("KD2"))))
        .await
        .unwrap();

    let err = transfers.reverse(transfer.id).await.unwrap_err();
    assert_eq!(domain_code(&err), ErrorCode::InsufficientFunds);

    // No partial state: the original transfer is still completed.
    let still = transfers.get(transfer.id).await.unwrap();
    assert_eq!(still.status, TransferStatus::Completed);
    assert_eq!(accounts.get(b.id).await.unwrap().balance, 0);
}

#[tokio::test]
async fn test_transfers_without_keys_do_not_collide() {
    // NULL idempotency keys must be distinct under the unique index.
    let pool = common::setup_test_db().await;
    let transfers = TransferService::new(pool.clone());

    let a = common::open_account(&pool, "Source", 10_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;

    let first = transfers
        .initiate(transfer_command(a.id, b.id, 100, None))
        .await
        .unwrap();
    let second = transfers
        .initiate(transfer_command(a.id, b.id, 100, None))
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_account_lifecycle_guards() {
    let pool = common::setup_test_db().await;
    let accounts = AccountService::new(pool.clone());

    let account = common::open_account(&pool, "Owner", 500).await;

    let err = accounts.close(account.id).await.unwrap_err();
    assert_eq!(domain_code(&err), ErrorCode::NonZeroBalanceOnClose);

    // Drain it, then the close goes through.
    let sink = common::open_account(&pool, "Sink", 0).await;
    TransferService::new(pool.clone())
        .initiate(transfer_command(account.id, sink.id, 500, None))
        .await
        .unwrap();

    let closed = accounts.close(account.id).await.unwrap();
    assert!(closed.closed_at.is_some());

    let err = accounts.freeze(account.id).await.unwrap_err();
    assert_eq!(domain_code(&err), ErrorCode::InvalidAccountState);
}

#[tokio::test]
async fn test_transfer_is_findable_by_reference_and_status() {
    let pool = common::setup_test_db().await;
    let transfers = TransferService::new(pool.clone());
    let repository = TransferRepository::new(pool.clone());

    let a = common::open_account(&pool, "Source", 1_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;

    let transfer = transfers
        .initiate(transfer_command(a.id, b.id, 250, None))
        .await
        .unwrap();

    let by_reference = repository
        .find_by_reference(&transfer.reference)
        .await
        .unwrap()
        .expect("reference lookup should find the transfer");
    assert_eq!(by_reference.id, transfer.id);

    let (completed, total) = transfers
        .list_for_account(a.id, Some(TransferStatus::Completed), 10, 0)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(completed[0].id, transfer.id);

    let (failed, total) = transfers
        .list_for_account(a.id, Some(TransferStatus::Failed), 10, 0)
        .await
        .unwrap();
    assert_eq!(total, 0);
    assert!(failed.is_empty());
}

#[tokio::test]
async fn test_account_listing_filters_by_status() {
    let pool = common::setup_test_db().await;
    let accounts = AccountService::new(pool.clone());

    let account = common::open_account(&pool, "Listed", 0).await;
    accounts.freeze(account.id).await.unwrap();

    let (frozen, _) = accounts
        .list(
            Some(fund_transfer_engine::models::AccountStatus::Frozen),
            1_000,
            0,
        )
        .await
        .unwrap();
    assert!(frozen.iter().any(|a| a.id == account.id));

    let (active, _) = accounts
        .list(
            Some(fund_transfer_engine::models::AccountStatus::Active),
            1_000,
            0,
        )
        .await
        .unwrap();
    assert!(!active.iter().any(|a| a.id == account.id));
}

#[tokio::test]
async fn test_account_balance_matches_latest_ledger_snapshot() {
    let pool = common::setup_test_db().await;
    let accounts = AccountService::new(pool.clone());
    let transfers = TransferService::new(pool.clone());
    let ledger = LedgerRepository::new(pool.clone());

    let a = common::open_account(&pool, "Source", 5_000).await;
    let b = common::open_account(&pool, "Destination", 0).await;

    for amount in [500, 700, 300] {
        transfers
            .initiate(transfer_command(a.id, b.id, amount, None))
            .await
            .unwrap();
    }

    for account_id in [a.id, b.id] {
        let balance = accounts.get(account_id).await.unwrap().balance;
        let latest = ledger
            .last_entry_at_or_before(account_id, chrono::Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(balance, latest.balance_after);
        assert!(balance >= 0);
    }
}
