use crate::error::{AppError, Result};
use crate::models::{Account, AccountStatus, Currency, LedgerEntry, OutboxEvent};
use crate::observability::get_metrics;
use crate::repositories::{AccountRepository, LedgerRepository, OutboxRepository, TxManager};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CreateAccountCommand {
    pub owner_name: String,
    pub currency: String,
    pub initial_balance: i64,
}

/// Create / freeze / unfreeze / close use-cases for the account aggregate.
pub struct AccountService {
    tx_manager: TxManager,
    accounts: AccountRepository,
    ledger: LedgerRepository,
    outbox: OutboxRepository,
}

impl AccountService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            tx_manager: TxManager::new(pool.clone()),
            accounts: AccountRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool.clone()),
            outbox: OutboxRepository::new(pool),
        }
    }

    /// Opens an account; a positive initial balance is seeded through a
    /// single bootstrap credit on the ledger.
    pub async fn create(&self, command: CreateAccountCommand) -> Result<Account> {
        let currency = Currency::new(&command.currency).map_err(AppError::Domain)?;
        let template = Account::open(
            Uuid::new_v4(),
            &command.owner_name,
            currency,
            command.initial_balance,
        )
        .map_err(AppError::Domain)?;

        let accounts = self.accounts.clone();
        let ledger = self.ledger.clone();
        let outbox = self.outbox.clone();
        let account = self
            .tx_manager
            .transactional(move |tx| {
                let template = template.clone();
                let accounts = accounts.clone();
                let ledger = ledger.clone();
                let outbox = outbox.clone();
                Box::pin(async move {
                    let account = template.clone();
                    accounts.upsert(tx, &account).await?;

                    if account.balance > 0 {
                        let entry = LedgerEntry::bootstrap_credit(
                            account.id,
                            account.balance,
                            account.currency.clone(),
                            account.created_at,
                        );
                        ledger.record_bootstrap_credit(tx, &entry).await?;
                    }

                    for event in account.peek_events() {
                        outbox
                            .append(tx, &OutboxEvent::new(account.id, event, account.created_at)?)
                            .await?;
                    }

                    Ok(account)
                })
            })
            .await?;

        let mut account = account;
        for event in account.release_events() {
            info!(event_type = event.event_type(), account_id = %account.id, "event released");
        }
        get_metrics().record_account_created(account.currency.as_str());
        Ok(account)
    }

    pub async fn get(&self, id: Uuid) -> Result<Account> {
        self.accounts.get_by_id(id).await
    }

    pub async fn freeze(&self, id: Uuid) -> Result<Account> {
        self.apply(id, |account| account.freeze()).await
    }

    pub async fn unfreeze(&self, id: Uuid) -> Result<Account> {
        self.apply(id, |account| account.unfreeze()).await
    }

    pub async fn close(&self, id: Uuid) -> Result<Account> {
        self.apply(id, |account| account.close()).await
    }

    /// Shared status-transition path: lock the row, apply the aggregate
    /// operation, upsert, write the events to the outbox.
    async fn apply<F>(&self, id: Uuid, op: F) -> Result<Account>
    where
        F: Fn(&mut Account) -> std::result::Result<(), crate::error::DomainError>
            + Send
            + Sync
            + Clone
            + 'static,
    {
        let accounts = self.accounts.clone();
        let outbox = self.outbox.clone();
        let account = self
            .tx_manager
            .transactional(move |tx| {
                let accounts = accounts.clone();
                let outbox = outbox.clone();
                let op = op.clone();
                Box::pin(async move {
                    let mut account = accounts.get_by_id_for_update(tx, id).await?;
                    op(&mut account).map_err(AppError::Domain)?;
                    accounts.upsert(tx, &account).await?;

                    for event in account.peek_events() {
                        outbox
                            .append(tx, &OutboxEvent::new(account.id, event, account.updated_at)?)
                            .await?;
                    }

                    Ok(account)
                })
            })
            .await?;

        let mut account = account;
        for event in account.release_events() {
            info!(event_type = event.event_type(), account_id = %account.id, "event released");
        }
        Ok(account)
    }

    pub async fn list(
        &self,
        status: Option<AccountStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Account>, i64)> {
        let total = self.accounts.count(status).await?;
        let accounts = self.accounts.list(status, limit, offset).await?;
        Ok((accounts, total))
    }
}
