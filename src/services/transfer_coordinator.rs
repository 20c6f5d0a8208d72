use crate::error::{AppError, DomainError};
use crate::models::{Money, TaggedEvent, TransferType};
use crate::repositories::AccountRepository;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Outcome of the two-account double entry: the post-movement balances and
/// the account events, each tagged with the aggregate that raised it so the
/// caller can route them to the outbox without importing account internals.
#[derive(Debug)]
pub struct TransferExecution {
    pub source_balance_after: i64,
    pub destination_balance_after: i64,
    pub events: Vec<TaggedEvent>,
}

/// Failure modes of the coordinator. Missing accounts are invalid input;
/// everything an account aggregate refuses (frozen, closed, currency
/// mismatch, insufficient funds, overflow) is a rule violation the caller
/// turns into a failed transfer.
#[derive(Debug)]
pub enum CoordinatorError {
    AccountNotFound(Uuid),
    RuleViolation(DomainError),
    Infrastructure(AppError),
}

impl From<AppError> for CoordinatorError {
    fn from(err: AppError) -> Self {
        CoordinatorError::Infrastructure(err)
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorRequest {
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: Money,
    pub transfer_id: Uuid,
    pub transfer_type: TransferType,
}

/// Both row locks are always taken in lexicographic UUID order, whichever
/// side is the source. This is the deadlock-avoidance invariant for every
/// two-account operation.
pub fn lock_order(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Performs the debit and credit legs of a transfer inside the caller's
/// transaction.
#[derive(Clone)]
pub struct AccountTransferCoordinator {
    accounts: AccountRepository,
}

impl AccountTransferCoordinator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            accounts: AccountRepository::new(pool),
        }
    }

    pub async fn execute(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        request: CoordinatorRequest,
    ) -> Result<TransferExecution, CoordinatorError> {
        let (first_id, second_id) =
            lock_order(request.source_account_id, request.destination_account_id);

        let first = self.accounts.find_by_id_for_update(tx, first_id).await?;
        let second = self.accounts.find_by_id_for_update(tx, second_id).await?;

        let (source, destination) = if first_id == request.source_account_id {
            (first, second)
        } else {
            (second, first)
        };

        let mut source = source
            .ok_or(CoordinatorError::AccountNotFound(request.source_account_id))?;
        let mut destination = destination.ok_or(CoordinatorError::AccountNotFound(
            request.destination_account_id,
        ))?;

        source
            .debit(
                &request.amount,
                request.transfer_id,
                request.transfer_type,
                destination.id,
            )
            .map_err(CoordinatorError::RuleViolation)?;
        destination
            .credit(
                &request.amount,
                request.transfer_id,
                request.transfer_type,
                source.id,
            )
            .map_err(CoordinatorError::RuleViolation)?;

        self.accounts.upsert(tx, &source).await?;
        self.accounts.upsert(tx, &destination).await?;

        let mut events = Vec::new();
        let source_id = source.id;
        let destination_id = destination.id;
        events.extend(
            source
                .release_events()
                .into_iter()
                .map(|event| TaggedEvent::new(source_id, event)),
        );
        events.extend(
            destination
                .release_events()
                .into_iter()
                .map(|event| TaggedEvent::new(destination_id, event)),
        );

        Ok(TransferExecution {
            source_balance_after: source.balance,
            destination_balance_after: destination.balance,
            events,
        })
    }
}
