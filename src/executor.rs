//! `Executor` Module
//!
//! Provides the `Executor` trait that abstracts the storage operations the
//! tabular binder performs on a parent model `P` and its child model `C`, and
//! the crate-wide `TabularError`.
//!
//! Stores and their transactions both implement `Executor`, so the binder runs
//! its phases against whichever one it is handed.

use crate::active_model::{ActiveModelError, ActiveModelTrait};
use crate::relation::RelationDef;
use crate::transaction::TransactionError;
use std::fmt;

/// Tabular binder error type
#[derive(Debug)]
pub enum TabularError {
    /// Parent model has no relation with this name
    UnknownRelation(String),
    /// Relation exists but cannot back a tabular form
    InvalidRelation { name: String, reason: String },
    /// Posted payload does not have the expected shape
    InvalidFormData(String),
    /// Model attribute or binding error
    ActiveModel(ActiveModelError),
    /// Transaction could not be started, committed or rolled back
    Transaction(TransactionError),
    /// Storage operation failed
    Database(String),
    /// Delete/save callback or models getter failed
    Callback(String),
}

impl fmt::Display for TabularError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabularError::UnknownRelation(name) => {
                write!(f, "Unknown relation: {name}")
            }
            TabularError::InvalidRelation { name, reason } => {
                write!(f, "Invalid relation {name}: {reason}")
            }
            TabularError::InvalidFormData(s) => {
                write!(f, "Invalid form data: {s}")
            }
            TabularError::ActiveModel(e) => {
                write!(f, "{e}")
            }
            TabularError::Transaction(e) => {
                write!(f, "{e}")
            }
            TabularError::Database(s) => {
                write!(f, "Database error: {s}")
            }
            TabularError::Callback(s) => {
                write!(f, "Callback error: {s}")
            }
        }
    }
}

impl std::error::Error for TabularError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TabularError::ActiveModel(e) => Some(e),
            TabularError::Transaction(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ActiveModelError> for TabularError {
    fn from(err: ActiveModelError) -> Self {
        TabularError::ActiveModel(err)
    }
}

impl From<TransactionError> for TabularError {
    fn from(err: TransactionError) -> Self {
        TabularError::Transaction(err)
    }
}

/// Trait for executing storage operations
///
/// This trait abstracts persistence, allowing a store handle or an open
/// transaction to be used interchangeably.
///
/// # Examples
///
/// ```no_run
/// use tabular::{ActiveModelTrait, Executor, RelationDef, TabularError};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// # struct Invoice { id: Option<i64> }
/// # impl ActiveModelTrait for Invoice { type Id = i64; }
/// # #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// # struct InvoiceLine { id: Option<i64>, invoice_id: Option<i64> }
/// # impl ActiveModelTrait for InvoiceLine { type Id = i64; }
///
/// fn line_count(
///     executor: &dyn Executor<Invoice, InvoiceLine>,
///     invoice: &Invoice,
/// ) -> Result<usize, TabularError> {
///     let relation = RelationDef::has_many("lines", "invoice_id");
///     Ok(executor.find_related(invoice, &relation)?.len())
/// }
/// ```
pub trait Executor<P: ActiveModelTrait, C: ActiveModelTrait> {
    /// Fetch a stored child by primary key
    fn find(&self, id: &C::Id) -> Result<Option<C>, TabularError>;

    /// Fetch every stored child currently linked to `parent` through `relation`
    fn find_related(&self, parent: &P, relation: &RelationDef<C>) -> Result<Vec<C>, TabularError>;

    /// Insert or update the parent, assigning its primary key on insert
    fn save_root(&self, parent: &mut P) -> Result<(), TabularError>;

    /// Delete a stored child
    fn delete(&self, child: &C) -> Result<(), TabularError>;

    /// Point the child's foreign key at `parent` and persist it (insert or update)
    fn link(&self, child: &mut C, relation: &RelationDef<C>, parent: &P) -> Result<(), TabularError>;
}
