//! `ActiveModel` operations for form-bound models.
//!
//! This module provides the traits a model implements to take part in tabular
//! binding: primary key access, attribute binding from posted data, validation,
//! and persistence lifecycle hooks.
//!
//! # Architecture
//!
//! - **Traits**: Core `ActiveModel` traits (`ActiveModelTrait`, `ActiveModelBehavior`)
//! - **Error**: `ActiveModelError` for attribute and binding errors
//!
//! # Examples
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tabular::ActiveModelTrait;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Invoice {
//!     id: Option<i64>,
//!     customer: String,
//! }
//!
//! impl ActiveModelTrait for Invoice {
//!     type Id = i64;
//! }
//!
//! let mut invoice = Invoice::default();
//! let posted = serde_json::json!({"customer": "ACME"});
//! invoice.set_attributes(posted.as_object().unwrap())?;
//! assert_eq!(invoice.customer, "ACME");
//! # Ok::<(), tabular::ActiveModelError>(())
//! ```

// Core traits
pub mod traits;
#[doc(inline)]
pub use traits::{ActiveModelBehavior, ActiveModelTrait};

// Error types
pub mod error;
#[doc(inline)]
pub use error::ActiveModelError;
