mod pending_queue;

pub use pending_queue::{DrainOutcome, OperationRecord, PendingQueue};
