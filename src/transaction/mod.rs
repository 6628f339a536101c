pub mod lock_manager;
pub mod transaction;
pub mod transaction_manager;

pub use lock_manager::{LockManager, LockMode, TransactionRegistry};
pub use transaction::{
    IndexWriteRecord, IsolationLevel, Transaction, TransactionError, TransactionState, WriteType,
};
pub use transaction_manager::TransactionManager;
