pub mod account_repository;
pub mod ledger_repository;
pub mod migrator;
pub mod outbox_repository;
pub mod transfer_repository;
pub mod tx_manager;

pub use account_repository::AccountRepository;
pub use ledger_repository::LedgerRepository;
pub use migrator::run_migrations;
pub use outbox_repository::OutboxRepository;
pub use transfer_repository::TransferRepository;
pub use tx_manager::TxManager;
