pub mod account_service;
pub mod reconciliation_service;
pub mod statement_service;
pub mod transfer_coordinator;
pub mod transfer_service;

pub use account_service::{AccountService, CreateAccountCommand};
pub use reconciliation_service::{ReconciliationService, ReconciliationStatus};
pub use statement_service::{Statement, StatementQuery, StatementService};
pub use transfer_coordinator::{
    AccountTransferCoordinator, CoordinatorError, CoordinatorRequest, TransferExecution,
};
pub use transfer_service::{InitiateTransferCommand, TransferService};
