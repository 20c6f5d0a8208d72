pub mod layer;
pub mod store;

pub use layer::{idempotency_layer, IDEMPOTENCY_KEY_HEADER};
pub use store::{
    advisory_lock_key, request_fingerprint, AdvisoryLock, IdempotencyCleanupJob,
    IdempotencyRecord, IdempotencyStore,
};
