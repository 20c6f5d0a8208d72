pub mod account;
pub mod currency;
pub mod events;
pub mod ledger_entry;
pub mod money;
pub mod outbox_event;
pub mod transfer;

pub use account::{Account, AccountStatus};
pub use currency::Currency;
pub use events::{DomainEvent, TaggedEvent};
pub use ledger_entry::{bootstrap, EntryType, LedgerEntry, TransferType};
pub use money::Money;
pub use outbox_event::OutboxEvent;
pub use transfer::{generate_reference, Transfer, TransferStatus};
