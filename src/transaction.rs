//! Transaction Module
//!
//! Provides the unit-of-work abstraction the tabular binder saves through:
//! - `TransactionManager` opens a transaction on a store
//! - `TransactionHandle` commits or rolls it back
//! - `IsolationLevel` for stores that honour it

use crate::active_model::ActiveModelTrait;
use crate::executor::Executor;
use std::fmt;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read uncommitted
    ReadUncommitted,
    /// Read committed (default)
    #[default]
    ReadCommitted,
    /// Repeatable read
    RepeatableRead,
    /// Serializable
    Serializable,
}

impl IsolationLevel {
    /// SQL spelling of the level
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Transaction could not be started
    BeginFailed(String),
    /// Transaction already committed or rolled back
    TransactionClosed,
    /// Nested transaction error
    NestedTransactionError(String),
    /// Other transaction errors
    Other(String),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::BeginFailed(s) => {
                write!(f, "Failed to begin transaction: {}", s)
            }
            TransactionError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            TransactionError::NestedTransactionError(s) => {
                write!(f, "Nested transaction error: {}", s)
            }
            TransactionError::Other(s) => {
                write!(f, "Transaction error: {}", s)
            }
        }
    }
}

impl std::error::Error for TransactionError {}

/// An open transaction
///
/// All operations performed through the transaction are either committed
/// together or rolled back together. Both methods consume the handle.
pub trait TransactionHandle {
    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction has already been committed or rolled back,
    /// or if the commit itself fails. A failed commit leaves none of the changes applied.
    fn commit(self) -> Result<(), TransactionError>;

    /// Rollback the transaction, discarding every change made through it
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction has already been committed or rolled back.
    fn rollback(self) -> Result<(), TransactionError>;

    /// Check if the transaction is closed
    fn is_closed(&self) -> bool;
}

/// A store that can open transactions
///
/// The transaction is itself an [`Executor`], so the binder's phases run
/// against it unchanged.
pub trait TransactionManager<P: ActiveModelTrait, C: ActiveModelTrait>: Executor<P, C> {
    type Transaction: TransactionHandle + Executor<P, C>;

    /// Start a new transaction with the default isolation level
    fn begin(&self) -> Result<Self::Transaction, TransactionError> {
        self.begin_with_isolation(IsolationLevel::default())
    }

    /// Start a new transaction with a specific isolation level
    fn begin_with_isolation(
        &self,
        isolation_level: IsolationLevel,
    ) -> Result<Self::Transaction, TransactionError>;
}
