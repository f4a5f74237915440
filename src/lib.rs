//! # Tabular
//!
//! Transactional binding of posted tabular form rows to a parent model and the
//! children of one of its has-many relations.
//!
//! A [`TabularForm`] loads one child per posted row (reusing stored children by
//! primary key), validates them, and saves inserts, updates and deletes inside a
//! single transaction, firing lifecycle events around every phase.
//!
//! Storage is pluggable through [`Executor`] and [`TransactionManager`];
//! [`store::MemoryStore`] is the in-memory reference backend.

pub mod active_model;
pub mod binder;
pub mod config;
pub mod event;
pub mod executor;
pub mod form;
pub mod json_helpers;
pub mod metrics;
pub mod relation;
pub mod store;
pub mod transaction;
pub mod validation;

pub use active_model::{ActiveModelBehavior, ActiveModelError, ActiveModelTrait};
pub use binder::{
    BoundModel, DeleteCallback, ModelOrigin, ModelsGetter, SaveCallback, TabularForm,
    TabularFormBuilder,
};
pub use config::TabularConfig;
pub use event::{EventBus, TabularEvent, TabularEventKind};
pub use executor::{Executor, TabularError};
pub use form::{FormData, FormRow};
pub use relation::{RelationDef, RelationType, Related};
pub use transaction::{IsolationLevel, TransactionError, TransactionHandle, TransactionManager};
pub use validation::ValidationErrors;
