use crate::error::{AppError, DomainError, ErrorCode, Result};
use crate::models::{
    Currency, LedgerEntry, Money, OutboxEvent, Transfer, TransferStatus, TransferType,
};
use crate::observability::get_metrics;
use crate::repositories::{LedgerRepository, OutboxRepository, TransferRepository, TxManager};
use crate::services::transfer_coordinator::{
    AccountTransferCoordinator, CoordinatorError, CoordinatorRequest,
};
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct InitiateTransferCommand {
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

enum InitiateOutcome {
    Completed(Transfer),
    /// An already-committed transfer with the same idempotency key was found
    /// inside the transaction; no money moved.
    Existing(Transfer),
}

/// Domain guards raised by the account aggregates during the double entry.
/// These fail the transfer deterministically; anything else propagates.
fn is_account_rule_violation(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::InsufficientFunds
            | ErrorCode::AccountFrozen
            | ErrorCode::AccountClosed
            | ErrorCode::CurrencyMismatch
            | ErrorCode::BalanceOverflow
    )
}

/// Initiate and reverse use-cases: orchestrates the aggregates, the account
/// transfer coordinator, the ledger recorder and the outbox inside a single
/// serialisable transaction.
pub struct TransferService {
    pool: PgPool,
    tx_manager: TxManager,
    transfers: TransferRepository,
    ledger: LedgerRepository,
    outbox: OutboxRepository,
    coordinator: AccountTransferCoordinator,
}

impl TransferService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tx_manager: TxManager::new(pool.clone()),
            transfers: TransferRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool.clone()),
            outbox: OutboxRepository::new(pool.clone()),
            coordinator: AccountTransferCoordinator::new(pool.clone()),
            pool,
        }
    }

    pub async fn initiate(&self, command: InitiateTransferCommand) -> Result<Transfer> {
        let currency = Currency::new(&command.currency).map_err(AppError::Domain)?;
        if command.amount <= 0 {
            return Err(AppError::domain(
                ErrorCode::InvalidTransferAmount,
                "transfer amount must be positive",
            ));
        }
        let amount = Money::new(command.amount, currency).map_err(AppError::Domain)?;
        let template = Transfer::initiate(
            command.source_account_id,
            command.destination_account_id,
            &amount,
            command.description.clone(),
            command.idempotency_key.clone(),
        )
        .map_err(AppError::Domain)?;

        let failure_template = template.clone();
        let transfers = self.transfers.clone();
        let ledger = self.ledger.clone();
        let outbox = self.outbox.clone();
        let coordinator = self.coordinator.clone();
        let outcome = self
            .tx_manager
            .transactional(move |tx| {
                let template = template.clone();
                let amount = amount.clone();
                let transfers = transfers.clone();
                let ledger = ledger.clone();
                let outbox = outbox.clone();
                let coordinator = coordinator.clone();
                Box::pin(async move {
                    // DB-layer idempotency recheck closes the window where the
                    // process died after commit but before the HTTP cache write.
                    if let Some(key) = template.idempotency_key.as_deref() {
                        if let Some(existing) =
                            transfers.find_by_idempotency_key_in_tx(tx, key).await?
                        {
                            return Ok(InitiateOutcome::Existing(existing));
                        }
                    }

                    // Rebuilt from the template on every attempt so deadlock
                    // retries start from a clean aggregate.
                    let mut transfer = template.clone();
                    transfer.mark_processing().map_err(AppError::Domain)?;

                    let execution = match coordinator
                        .execute(
                            tx,
                            CoordinatorRequest {
                                source_account_id: transfer.source_account_id,
                                destination_account_id: transfer.destination_account_id,
                                amount: amount.clone(),
                                transfer_id: transfer.id,
                                transfer_type: TransferType::Transfer,
                            },
                        )
                        .await
                    {
                        Ok(execution) => execution,
                        Err(CoordinatorError::AccountNotFound(id)) => {
                            return Err(AppError::domain(
                                ErrorCode::AccountNotFound,
                                format!("account '{}' not found for transfer", id),
                            ));
                        }
                        Err(CoordinatorError::RuleViolation(violation)) => {
                            return Err(AppError::Domain(violation));
                        }
                        Err(CoordinatorError::Infrastructure(err)) => return Err(err),
                    };

                    transfer.complete().map_err(AppError::Domain)?;
                    transfers.upsert(tx, &transfer).await?;

                    let occurred_at = transfer.completed_at.unwrap_or(transfer.updated_at);
                    let debit = LedgerEntry::debit(
                        transfer.source_account_id,
                        transfer.destination_account_id,
                        transfer.id,
                        TransferType::Transfer,
                        transfer.amount,
                        transfer.currency.clone(),
                        execution.source_balance_after,
                        occurred_at,
                    );
                    let credit = LedgerEntry::credit(
                        transfer.destination_account_id,
                        transfer.source_account_id,
                        transfer.id,
                        TransferType::Transfer,
                        transfer.amount,
                        transfer.currency.clone(),
                        execution.destination_balance_after,
                        occurred_at,
                    );
                    ledger.record_transfer_pair(tx, &debit, &credit).await?;

                    for event in transfer.peek_events() {
                        outbox
                            .append(tx, &OutboxEvent::new(transfer.id, event, occurred_at)?)
                            .await?;
                    }
                    for tagged in &execution.events {
                        outbox
                            .append(tx, &OutboxEvent::from_tagged(tagged, occurred_at)?)
                            .await?;
                    }

                    Ok(InitiateOutcome::Completed(transfer))
                })
            })
            .await;

        match outcome {
            Ok(InitiateOutcome::Existing(transfer)) => {
                info!(transfer_id = %transfer.id, "idempotent replay, returning existing transfer");
                Ok(transfer)
            }
            Ok(InitiateOutcome::Completed(mut transfer)) => {
                for event in transfer.release_events() {
                    info!(event_type = event.event_type(), transfer_id = %transfer.id, "event released");
                }
                get_metrics().record_transfer_completed(transfer.currency.as_str());
                Ok(transfer)
            }
            Err(AppError::Domain(violation)) if is_account_rule_violation(violation.code) => {
                self.record_failed_transfer(&failure_template, &violation).await;
                get_metrics().record_transfer_failed(violation.code.as_str());
                Err(AppError::Domain(violation))
            }
            Err(err) => Err(err),
        }
    }

    /// Audit trail for rule violations: the transaction that moved money has
    /// rolled back, so a second transaction persists the FAILED row and its
    /// outbox event. Audit durability outranks outbox durability, so a save
    /// failure degrades to transfer-row-only before giving up loudly.
    async fn record_failed_transfer(&self, template: &Transfer, violation: &DomainError) {
        let mut failed = template.clone();
        // Pending -> Processing -> Failed on a fresh clone cannot be refused.
        failed.release_events();
        let _ = failed.mark_processing();
        let _ = failed.fail(violation.code.as_str(), &violation.message);

        match self.save_failed(&failed, true).await {
            Ok(()) => return,
            Err(err) => {
                warn!(
                    transfer_id = %failed.id,
                    error = %err,
                    "failed-transfer save with outbox event did not commit, retrying transfer row only"
                );
            }
        }

        if let Err(err) = self.save_failed(&failed, false).await {
            error!(
                transfer_id = %failed.id,
                reference = %failed.reference,
                source_account_id = %failed.source_account_id,
                destination_account_id = %failed.destination_account_id,
                amount = failed.amount,
                currency = %failed.currency,
                idempotency_key = ?failed.idempotency_key,
                failure_code = ?failed.failure_code,
                failure_reason = ?failed.failure_reason,
                created_at = %failed.created_at,
                error = %err,
                "CRITICAL: unable to persist failed transfer; reconstruct the audit record from these fields"
            );
        }
    }

    async fn save_failed(&self, failed: &Transfer, with_outbox: bool) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        self.transfers.upsert(&mut tx, failed).await?;
        if with_outbox {
            let occurred_at = failed.failed_at.unwrap_or(failed.updated_at);
            for event in failed.peek_events() {
                self.outbox
                    .append(&mut tx, &OutboxEvent::new(failed.id, event, occurred_at)?)
                    .await?;
            }
        }
        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    /// Reverses a completed transfer by running the double entry with source
    /// and destination swapped. A drained destination surfaces
    /// INSUFFICIENT_FUNDS and the transfer stays completed.
    pub async fn reverse(&self, transfer_id: Uuid) -> Result<Transfer> {
        let transfers = self.transfers.clone();
        let ledger = self.ledger.clone();
        let outbox = self.outbox.clone();
        let coordinator = self.coordinator.clone();
        let outcome = self
            .tx_manager
            .transactional(move |tx| {
                let transfers = transfers.clone();
                let ledger = ledger.clone();
                let outbox = outbox.clone();
                let coordinator = coordinator.clone();
                Box::pin(async move {
                    let mut transfer = transfers.get_by_id_for_update(tx, transfer_id).await?;
                    transfer.reverse().map_err(AppError::Domain)?;
                    let amount = transfer.amount_money().map_err(AppError::Domain)?;

                    let execution = match coordinator
                        .execute(
                            tx,
                            CoordinatorRequest {
                                source_account_id: transfer.destination_account_id,
                                destination_account_id: transfer.source_account_id,
                                amount,
                                transfer_id: transfer.id,
                                transfer_type: TransferType::Reversal,
                            },
                        )
                        .await
                    {
                        Ok(execution) => execution,
                        Err(CoordinatorError::AccountNotFound(id)) => {
                            return Err(AppError::domain(
                                ErrorCode::AccountNotFound,
                                format!("account '{}' not found for transfer", id),
                            ));
                        }
                        Err(CoordinatorError::RuleViolation(violation)) => {
                            return Err(AppError::Domain(violation));
                        }
                        Err(CoordinatorError::Infrastructure(err)) => return Err(err),
                    };

                    transfers.upsert(tx, &transfer).await?;

                    let occurred_at = transfer.reversed_at.unwrap_or(transfer.updated_at);
                    // The reversal debits the original destination and credits
                    // the original source.
                    let debit = LedgerEntry::debit(
                        transfer.destination_account_id,
                        transfer.source_account_id,
                        transfer.id,
                        TransferType::Reversal,
                        transfer.amount,
                        transfer.currency.clone(),
                        execution.source_balance_after,
                        occurred_at,
                    );
                    let credit = LedgerEntry::credit(
                        transfer.source_account_id,
                        transfer.destination_account_id,
                        transfer.id,
                        TransferType::Reversal,
                        transfer.amount,
                        transfer.currency.clone(),
                        execution.destination_balance_after,
                        occurred_at,
                    );
                    ledger.record_transfer_pair(tx, &debit, &credit).await?;

                    for event in transfer.peek_events() {
                        outbox
                            .append(tx, &OutboxEvent::new(transfer.id, event, occurred_at)?)
                            .await?;
                    }
                    for tagged in &execution.events {
                        outbox
                            .append(tx, &OutboxEvent::from_tagged(tagged, occurred_at)?)
                            .await?;
                    }

                    Ok(transfer)
                })
            })
            .await?;

        let mut transfer = outcome;
        for event in transfer.release_events() {
            info!(event_type = event.event_type(), transfer_id = %transfer.id, "event released");
        }
        get_metrics().record_transfer_reversed(transfer.currency.as_str());
        Ok(transfer)
    }

    pub async fn get(&self, id: Uuid) -> Result<Transfer> {
        self.transfers.get_by_id(id).await
    }

    pub async fn list(
        &self,
        status: Option<TransferStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Transfer>, i64)> {
        let total = self.transfers.count(status).await?;
        let transfers = self.transfers.list(status, limit, offset).await?;
        Ok((transfers, total))
    }

    pub async fn list_for_account(
        &self,
        account_id: Uuid,
        status: Option<TransferStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Transfer>, i64)> {
        let total = self.transfers.count_for_account(account_id, status).await?;
        let transfers = self
            .transfers
            .list_for_account(account_id, status, limit, offset)
            .await?;
        Ok((transfers, total))
    }
}
