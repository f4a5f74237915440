//! Storage backends.
//!
//! The binder is written against [`Executor`](crate::Executor) and
//! [`TransactionManager`](crate::TransactionManager); applications plug in their
//! own database layer. [`memory::MemoryStore`] is the reference backend used by
//! the test suite and for unit-testing forms without a database.

pub mod memory;
#[doc(inline)]
pub use memory::{MemoryStore, MemoryTransaction, StoreOperation};
